//! Configuration for the Amazon Bedrock bidirectional stream.
//!
//! Credentials are optional. When both the access key id and the secret are set
//! they are used directly; otherwise the AWS default credential chain applies
//! (environment, shared credentials file, instance profile).

use std::fmt;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::config::ServerConfig;

/// Default speech-to-speech model
pub const DEFAULT_MODEL_ID: &str = "amazon.nova-sonic-v1:0";

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// How long `open` waits for Bedrock to accept the stream
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one Bedrock stream.
#[derive(Clone)]
pub struct BedrockStreamConfig {
    pub region: String,
    pub model_id: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for BedrockStreamConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Debug for BedrockStreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockStreamConfig")
            .field("region", &self.region)
            .field("model_id", &self.model_id)
            .field("explicit_credentials", &self.has_explicit_credentials())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for BedrockStreamConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.access_key_id {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.secret_access_key {
            secret.zeroize();
        }
        if let Some(ref mut token) = self.session_token {
            token.zeroize();
        }
    }
}

impl BedrockStreamConfig {
    /// Build the stream settings from server configuration.
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            region: config.aws_region.clone(),
            model_id: config.model_id.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            session_token: config.aws_session_token.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Same credentials and region, different model.
    pub fn with_model(&self, model_id: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.model_id = model_id.into();
        config
    }

    pub fn has_explicit_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Resolve the AWS SDK configuration for these settings.
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));

        if self.has_explicit_credentials() {
            let credentials = aws_credential_types::Credentials::new(
                self.access_key_id.as_deref().unwrap_or_default(),
                self.secret_access_key.as_deref().unwrap_or_default(),
                self.session_token.clone(),
                None, // Expiration
                "sonic-gateway",
            );
            loader.credentials_provider(credentials).load().await
        } else {
            loader.load().await
        }
    }
}
