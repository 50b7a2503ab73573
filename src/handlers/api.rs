use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Tool specifications in the form the upstream tool configuration expects
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<Value>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// List the registered tools so a client can build its `toolConfiguration`.
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.tools.specs_json(),
    })
}
