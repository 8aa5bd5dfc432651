use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::ApiError;
use crate::analytics::report::DEFAULT_WINDOW_DAYS;
use crate::analytics::{resolve_client_address, IngestService, IpHasher, ReportService};
use crate::config::AnalyticsConfig;
use crate::storage::{Backend, Storage};

pub struct AppState {
    pub backend: Backend,
    pub hasher: Arc<IpHasher>,
    pub analytics: AnalyticsConfig,
}

impl AppState {
    fn storage(&self) -> Result<Arc<dyn Storage>, ApiError> {
        match &self.backend {
            Backend::Ready(storage) => Ok(Arc::clone(storage)),
            Backend::Unavailable(reason) => {
                tracing::error!("Request refused, storage backend unavailable: {}", reason);
                Err(ApiError::backend_unavailable())
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub success: bool,
    pub message: String,
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub uid: Option<String>,
    pub days: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
}

/// Record one analytics event
pub async fn track_event(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let body = body?;
    let request = IngestService::parse(&body)?;

    let client_address = resolve_client_address(
        &headers,
        Some(addr.ip()),
        request.ip.as_deref(),
        &state.analytics,
    );

    let service = IngestService::new(state.storage()?, Arc::clone(&state.hasher));
    let event = service.ingest(request, &client_address).await?;

    Ok(Json(TrackResponse {
        success: true,
        message: "Analytics event tracked successfully".to_string(),
        event_id: event.id.to_string(),
    }))
}

/// Build the analytics report for a known user
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let storage = state.storage()?;

    let uid = query
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required parameter: uid"))?;

    let days = match query.days.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_WINDOW_DAYS,
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ApiError::bad_request("Parameter days must be a positive number of days")
        })?,
    };

    let report = ReportService::new(storage).generate(uid, days).await?;

    let cache_control = format!("private, max-age={}", state.analytics.report_max_age_secs);
    Ok(([(header::CACHE_CONTROL, cache_control)], Json(report)))
}

/// Empty 200 for `OPTIONS`; the CORS layer normally answers these first
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend = if state.backend.is_ready() {
        "ready"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        backend: backend.to_string(),
    })
}
