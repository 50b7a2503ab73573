//! Tests for the Amazon Bedrock upstream provider.

use super::*;
use crate::config::ServerConfig;
use crate::core::upstream::base::{UpstreamConnector, UpstreamError};

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_default_config() {
    let config = BedrockStreamConfig::default();
    assert_eq!(config.region, "us-east-1");
    assert_eq!(config.model_id, "amazon.nova-sonic-v1:0");
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert!(!config.has_explicit_credentials());
}

#[test]
fn test_from_server_config() {
    let mut server = ServerConfig::default();
    server.aws_region = "eu-west-1".to_string();
    server.model_id = "amazon.nova-sonic-v2:0".to_string();
    server.aws_access_key_id = Some("AKIATEST".to_string());
    server.aws_secret_access_key = Some("secret".to_string());

    let config = BedrockStreamConfig::from_server_config(&server);

    assert_eq!(config.region, "eu-west-1");
    assert_eq!(config.model_id, "amazon.nova-sonic-v2:0");
    assert!(config.has_explicit_credentials());
    assert!(config.session_token.is_none());
}

#[test]
fn test_partial_credentials_fall_back_to_default_chain() {
    let mut config = BedrockStreamConfig::default();
    config.access_key_id = Some("AKIATEST".to_string());

    assert!(!config.has_explicit_credentials());
}

#[test]
fn test_with_model_keeps_region_and_credentials() {
    let mut config = BedrockStreamConfig::default();
    config.region = "us-west-2".to_string();
    config.access_key_id = Some("AKIATEST".to_string());
    config.secret_access_key = Some("secret".to_string());

    let vision = config.with_model("amazon.nova-lite-v1:0");

    assert_eq!(vision.model_id, "amazon.nova-lite-v1:0");
    assert_eq!(vision.region, "us-west-2");
    assert!(vision.has_explicit_credentials());
    assert_eq!(config.model_id, DEFAULT_MODEL_ID);
}

#[test]
fn test_debug_output_hides_secrets() {
    let mut config = BedrockStreamConfig::default();
    config.access_key_id = Some("AKIAVISIBLE".to_string());
    config.secret_access_key = Some("super-secret-value".to_string());

    let rendered = format!("{:?}", config);

    assert!(!rendered.contains("super-secret-value"));
    assert!(!rendered.contains("AKIAVISIBLE"));
    assert!(rendered.contains("explicit_credentials: true"));
}

// =============================================================================
// Connector Tests
// =============================================================================

#[test]
fn test_connector_provider_name() {
    let connector = BedrockConnector::new(BedrockStreamConfig::default());
    assert_eq!(connector.provider_name(), "bedrock");
    assert_eq!(connector.config().model_id, DEFAULT_MODEL_ID);
}

// =============================================================================
// Chunk Decoding Tests
// =============================================================================

#[test]
fn test_decode_chunk_accepts_utf8() {
    let chunk = r#"{"event":{"textOutput":{"content":"héllo"}}}"#;
    assert_eq!(
        super::client::decode_chunk(chunk.as_bytes()).unwrap(),
        chunk
    );
}

#[test]
fn test_decode_chunk_reports_invalid_utf8() {
    let chunk = b"{\"event\": \xff}";
    match super::client::decode_chunk(chunk) {
        Err(UpstreamError::InvalidPayload(lossy)) => {
            assert_eq!(lossy, "{\"event\": \u{FFFD}}");
        }
        other => panic!("expected an invalid payload error, got {other:?}"),
    }
}
