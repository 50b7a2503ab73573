//! Upstream model stream adapters.
//!
//! - `base`: connector trait, channel-backed stream halves and error types
//! - `bedrock`: Amazon Bedrock bidirectional streaming (Nova Sonic)

pub mod base;
pub mod bedrock;

pub use base::{
    UpstreamConnector, UpstreamError, UpstreamReceiver, UpstreamResult, UpstreamSender,
    UpstreamStream,
};
pub use bedrock::{BedrockConnector, BedrockStreamConfig};
