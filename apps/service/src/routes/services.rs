use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Duration, Utc};
use panda::{Monitor, MonitorError, ReturnCode};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ServicesQuery {
    /// Comma separated return codes, warning and critical when missing
    return_codes: Option<String>,
}

fn parse_return_codes(raw: &str) -> Result<Vec<ReturnCode>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<u8>()
                .map_err(|e| e.to_string())
                .and_then(ReturnCode::try_from)
                .map_err(|e| AppError::BadRequest(format!("invalid return code '{code}': {e}")))
        })
        .collect()
}

#[get("/services")]
pub async fn services_route(
    monitor: web::Data<Monitor>,
    query: web::Query<ServicesQuery>,
) -> Result<HttpResponse, AppError> {
    let codes = match &query.return_codes {
        Some(raw) => parse_return_codes(raw)?,
        None => vec![ReturnCode::Warning, ReturnCode::Critical],
    };

    let services = monitor.store().services_by_status(&codes).await.map_err(MonitorError::from)?;
    Ok(HttpResponse::Ok().json(services))
}

#[get("/tags/{tag}")]
pub async fn tag_route(
    monitor: web::Data<Monitor>,
    tag: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let services = monitor.store().services_with_tag(&tag).await.map_err(MonitorError::from)?;
    Ok(HttpResponse::Ok().json(services))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// Samples of one metric, the last day unless a range is given
#[get("/history/{metric_id}")]
pub async fn history_route(
    monitor: web::Data<Monitor>,
    metric_id: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::days(1));
    if start > end {
        return Err(AppError::BadRequest("start must be before end".to_string()));
    }

    let samples = monitor
        .store()
        .metric_history(&metric_id, start, end)
        .await
        .map_err(MonitorError::from)?;
    Ok(HttpResponse::Ok().json(samples))
}
