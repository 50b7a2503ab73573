use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::{SessionSettings, SessionStreamManager};
use crate::core::tools::ToolRegistry;
use crate::core::upstream::{BedrockConnector, BedrockStreamConfig, UpstreamConnector};

/// Shared application state: configuration plus everything a new session is built from.
pub struct AppState {
    pub config: ServerConfig,
    pub tools: Arc<ToolRegistry>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub settings: SessionSettings,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("address", &self.config.address())
            .field("provider", &self.connector.provider_name())
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl AppState {
    /// State backed by Amazon Bedrock and the built-in tools.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let connector = Arc::new(BedrockConnector::new(
            BedrockStreamConfig::from_server_config(&config),
        ));
        let tools = Arc::new(ToolRegistry::builtin(&config));
        Self::with_parts(config, connector, tools)
    }

    /// State with an explicit connector and tool set.
    pub fn with_parts(
        config: ServerConfig,
        connector: Arc<dyn UpstreamConnector>,
        tools: Arc<ToolRegistry>,
    ) -> Arc<Self> {
        let settings = SessionSettings::from_config(&config);
        Arc::new(Self {
            config,
            tools,
            connector,
            settings,
        })
    }

    /// A fresh, uninitialized session for one client connection.
    pub fn new_session(&self) -> Arc<SessionStreamManager> {
        SessionStreamManager::new(
            self.settings.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.tools),
        )
    }
}
