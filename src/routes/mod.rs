pub mod api;
pub mod session;

use axum::Router;
use http::{Method, header::CONTENT_TYPE};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

/// All routes with state applied. Cross-cutting layers are added by the binary.
pub fn create_app(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(session::create_session_router())
        .with_state(state)
}

/// CORS for the REST endpoints. `origins` is `*` or a comma-separated list;
/// `None` keeps same-origin only. `Content-Type` is the only allowed request header.
pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    match origins {
        Some("*") => base.allow_origin(Any).allow_credentials(false),
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins).allow_credentials(true)
        }
        None => {
            info!(
                "CORS not configured, defaulting to same-origin only. \
                 Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
            );
            base.allow_credentials(false)
        }
    }
}
