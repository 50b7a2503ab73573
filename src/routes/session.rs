//! Session WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::session::session_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the session WebSocket router
///
/// # Endpoint
///
/// `GET /session` - WebSocket upgrade for a model stream session
///
/// The server sends a `connectionStatus` event, opens the upstream stream and
/// then relays events in both directions. If the upstream stream cannot be
/// opened the server sends a fatal `BedrockInitializationError` event and
/// closes with code 1011.
pub fn create_session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(session_handler))
        .layer(TraceLayer::new_for_http())
}
