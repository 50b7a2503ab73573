//! Amazon Bedrock upstream provider.
//!
//! Speaks the bidirectional `InvokeModelWithBidirectionalStream` API used by
//! Nova Sonic. Events travel as UTF-8 JSON inside payload-part chunks in both
//! directions; this module only moves the bytes, the session layer interprets them.
//!
//! # Authentication
//!
//! AWS credentials can be provided via:
//! 1. Server configuration (`aws.access_key_id` / `aws.secret_access_key`)
//! 2. Environment variables: `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
//! 3. AWS credentials file or instance profile

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::BedrockConnector;
pub use config::{BedrockStreamConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MODEL_ID, DEFAULT_REGION};
