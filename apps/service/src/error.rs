use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use panda::MonitorError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Monitor(#[from] MonitorError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::HostNotFound(_) | AppError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Monitor(MonitorError::HostNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Monitor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::HostNotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::ServiceNotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(MonitorError::HostNotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(MonitorError::ServiceTypeNotFound("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
