use actix_web::{HttpResponse, get, post, web};
use chrono::{Duration, Utc};
use panda::{Monitor, MonitorError};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

const DEFAULT_SILENCE_MINUTES: i64 = 60;

/// Latest snapshot of every host
#[get("/status")]
pub async fn status_route(monitor: web::Data<Monitor>) -> Result<HttpResponse, AppError> {
    let hosts = monitor.store().list_hosts().await.map_err(MonitorError::from)?;
    Ok(HttpResponse::Ok().json(hosts))
}

#[get("/status/{id}")]
pub async fn host_status_route(
    monitor: web::Data<Monitor>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    match monitor.host_status(&id).await? {
        Some(host) => Ok(HttpResponse::Ok().json(host)),
        None => Err(AppError::HostNotFound(id)),
    }
}

#[get("/status/{id}/{service_id}")]
pub async fn service_status_route(
    monitor: web::Data<Monitor>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (id, service_id) = path.into_inner();
    match monitor.service_status(&id, &service_id).await? {
        Some(service) => Ok(HttpResponse::Ok().json(service)),
        None => Err(AppError::ServiceNotFound(service_id)),
    }
}

/// Time of the last completed check pass
#[get("/last_check")]
pub async fn last_check_route(monitor: web::Data<Monitor>) -> Result<HttpResponse, AppError> {
    let last_check = monitor.last_pass().await?;
    Ok(HttpResponse::Ok().json(json!({ "last_check": last_check })))
}

/// Ids of the configured hosts
#[get("/hosts")]
pub async fn hosts_route(monitor: web::Data<Monitor>) -> HttpResponse {
    HttpResponse::Ok().json(monitor.get_hosts().await)
}

#[post("/hosts/{id}/check_now")]
pub async fn check_now_route(
    monitor: web::Data<Monitor>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    let response = monitor.check_now(&id).await;
    if !response.success {
        return Err(AppError::HostNotFound(id));
    }
    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Deserialize)]
pub struct SilenceQuery {
    minutes: Option<i64>,
}

#[post("/hosts/{id}/silence")]
pub async fn silence_route(
    monitor: web::Data<Monitor>,
    id: web::Path<String>,
    query: web::Query<SilenceQuery>,
) -> Result<HttpResponse, AppError> {
    let minutes = query.minutes.unwrap_or(DEFAULT_SILENCE_MINUTES);
    if minutes < 0 {
        return Err(AppError::BadRequest(format!("minutes must not be negative, got {minutes}")));
    }

    let until = Duration::try_minutes(minutes)
        .and_then(|silence| Utc::now().checked_add_signed(silence))
        .ok_or_else(|| AppError::BadRequest(format!("minutes is out of range, got {minutes}")))?;

    let id = id.into_inner();
    let response = monitor.silence_host(&id, until).await;
    if !response.success {
        return Err(AppError::HostNotFound(id));
    }
    Ok(HttpResponse::Ok().json(response))
}

/// Commands the host's driver supports
#[get("/hosts/{id}/commands")]
pub async fn commands_route(
    monitor: web::Data<Monitor>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    match monitor.device_commands(&id).await {
        Some(commands) => Ok(HttpResponse::Ok().json(commands)),
        None => Err(AppError::HostNotFound(id)),
    }
}
