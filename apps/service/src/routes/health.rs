use actix_web::{HttpResponse, Responder, get};
use serde_json::json;

/// Health check route used by the watchdog
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok().json(json!({ "return_code": 0 }))
}
