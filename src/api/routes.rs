use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analytics::IpHasher;
use crate::config::AnalyticsConfig;
use crate::storage::Backend;

use super::handlers::{
    get_report, health_check, method_not_allowed, preflight, track_event, AppState,
};

/// Largest accepted event payload
pub const MAX_EVENT_BODY_BYTES: usize = 64 * 1024;

pub fn create_api_router(
    backend: Backend,
    hasher: Arc<IpHasher>,
    analytics: AnalyticsConfig,
) -> Router {
    let state = Arc::new(AppState {
        backend,
        hasher,
        analytics,
    });

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/analytics/track",
            post(track_event)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/analytics",
            get(get_report)
                .head(method_not_allowed)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(MAX_EVENT_BODY_BYTES))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
}
