//! Server Startup Tests
//!
//! Tests for application state construction, route wiring and the REST
//! endpoints. No upstream stream is opened here.

mod mock_upstream;

use std::net::TcpListener;
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;

use mock_upstream::MockConnector;
use sonic_gateway::{ServerConfig, ToolRegistry, routes, state::AppState};

/// Helper function to find an available port
fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Helper function to create a minimal test configuration
fn create_minimal_config(port: u16) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = port;
    config
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// The server boots with defaults only (no AWS credentials configured)
#[tokio::test]
async fn test_minimal_config_boot() {
    let config = create_minimal_config(find_available_port());
    assert!(!config.has_static_aws_credentials());

    let app = routes::create_app(AppState::new(config));

    let (status, body) = get_json(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_tools_endpoint_lists_builtin_tools() {
    let app = routes::create_app(AppState::new(create_minimal_config(find_available_port())));

    let (status, body) = get_json(app, "/tools").await;
    assert_eq!(status, StatusCode::OK);

    let tools = body["tools"].as_array().unwrap();
    let mut names: Vec<&str> = tools
        .iter()
        .map(|tool| tool["toolSpec"]["name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["agentSearch", "getWeather", "imageAnalyzer", "numberRace"]
    );

    // schemas travel as embedded JSON strings
    for tool in tools {
        let schema = tool["toolSpec"]["inputSchema"]["json"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(schema).unwrap();
        assert_eq!(parsed["type"], "object");
    }
}

#[tokio::test]
async fn test_tools_endpoint_reflects_registry() {
    let config = create_minimal_config(find_available_port());
    let state = AppState::with_parts(
        config,
        MockConnector::failing("unused"),
        Arc::new(ToolRegistry::new(Vec::new())),
    );

    let (status, body) = get_json(routes::create_app(state), "/tools").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"], Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_unknown_route_returns_not_found() {
    let app = routes::create_app(AppState::new(create_minimal_config(find_available_port())));

    let request = Request::builder()
        .uri("/realtime")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test that the server correctly handles WebSocket route setup
#[tokio::test]
async fn test_session_route_setup() {
    let app = routes::create_app(AppState::new(create_minimal_config(find_available_port())));

    // A plain GET without upgrade headers is rejected, but the route exists
    let request = Request::builder()
        .uri("/session")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_ne!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.status().is_client_error());
}

/// Preflight from an allowed origin lists content-type but not authorization
#[tokio::test]
async fn test_cors_preflight_does_not_allow_authorization() {
    let app = routes::create_app(AppState::new(create_minimal_config(find_available_port())))
        .layer(routes::cors_layer(Some("https://app.example.com")));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/tools")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "authorization")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
    let allowed = headers
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("content-type"));
    assert!(!allowed.contains("authorization"));
}

/// Test that the server correctly parses addresses
#[tokio::test]
async fn test_address_parsing() {
    let port = find_available_port();
    let config = create_minimal_config(port);

    let address = config.address();
    assert_eq!(address, format!("127.0.0.1:{port}"));
    assert!(address.parse::<std::net::SocketAddr>().is_ok());
    assert!(!config.is_tls_enabled());
}

/// Session settings follow the configured external data timeout
#[tokio::test]
async fn test_state_carries_session_settings() {
    let mut config = create_minimal_config(find_available_port());
    config.external_data_timeout_seconds = 7;

    let state = AppState::new(config);
    assert_eq!(
        state.settings.external_data_timeout,
        std::time::Duration::from_secs(7)
    );

    let session = state.new_session();
    assert!(!session.is_active());
    assert_eq!(
        session.external_data_timeout(),
        std::time::Duration::from_secs(7)
    );
}

/// Test that multiple AppState instances can be created concurrently
#[tokio::test]
async fn test_concurrent_app_state_creation() {
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let port = find_available_port();
            tokio::spawn(async move {
                let state = AppState::new(create_minimal_config(port));
                assert_eq!(state.tools.len(), 4);
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("Task should complete successfully");
    }
}
