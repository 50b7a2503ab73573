//! Tool registry: a closed set of tool variants resolved by name.
//!
//! Names are matched case-insensitively. The lower-cased name is looked up in a
//! PHF map to get the [`ToolKind`], then the registry returns the registered
//! [`Tool`] of that kind, if any.

use std::sync::Arc;

use phf::phf_map;
use serde_json::Value;

use super::agent_search::{self, A2aAgentClient, AgentSearchTool};
use super::base::{ToolInvocation, ToolOutcome, ToolResult, ToolSpec};
use super::image_analyzer::{self, BedrockImageDescriber, ImageAnalyzerTool};
use super::number_race::{self, NumberRaceTool};
use super::weather::{self, WeatherTool};
use crate::config::ServerConfig;
use crate::core::session::SessionStreamManager;
use crate::core::upstream::BedrockStreamConfig;

/// Built-in tool kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ToolKind {
    GetWeather = 0,
    NumberRace = 1,
    AgentSearch = 2,
    ImageAnalyzer = 3,
}

impl ToolKind {
    /// Name as advertised to the model
    #[inline]
    pub const fn canonical_name(&self) -> &'static str {
        match self {
            Self::GetWeather => weather::NAME,
            Self::NumberRace => number_race::NAME,
            Self::AgentSearch => agent_search::NAME,
            Self::ImageAnalyzer => image_analyzer::NAME,
        }
    }

    /// Resolve a tool name in any letter case.
    pub fn from_name(name: &str) -> Option<Self> {
        TOOL_NAME_MAP.get(name.to_lowercase().as_str()).copied()
    }
}

/// Lower-cased tool name → kind
pub static TOOL_NAME_MAP: phf::Map<&'static str, ToolKind> = phf_map! {
    "getweather" => ToolKind::GetWeather,
    "numberrace" => ToolKind::NumberRace,
    "agentsearch" => ToolKind::AgentSearch,
    "imageanalyzer" => ToolKind::ImageAnalyzer,
};

/// A registered tool with its backend.
#[derive(Debug, Clone)]
pub enum Tool {
    GetWeather(WeatherTool),
    NumberRace(NumberRaceTool),
    AgentSearch(AgentSearchTool),
    ImageAnalyzer(ImageAnalyzerTool),
}

impl Tool {
    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::GetWeather(_) => ToolKind::GetWeather,
            Tool::NumberRace(_) => ToolKind::NumberRace,
            Tool::AgentSearch(_) => ToolKind::AgentSearch,
            Tool::ImageAnalyzer(_) => ToolKind::ImageAnalyzer,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Tool::GetWeather(tool) => tool.spec(),
            Tool::NumberRace(tool) => tool.spec(),
            Tool::AgentSearch(tool) => tool.spec(),
            Tool::ImageAnalyzer(tool) => tool.spec(),
        }
    }

    /// Whether the handler works through the session (background tasks, client messages).
    pub fn needs_session(&self) -> bool {
        matches!(self, Tool::AgentSearch(_) | Tool::ImageAnalyzer(_))
    }

    /// Run the handler. Session-bound tools receive the session, the rest only the invocation.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        session: &Arc<SessionStreamManager>,
    ) -> ToolResult<ToolOutcome> {
        match self {
            Tool::GetWeather(tool) => Ok(tool.handle(invocation).await),
            Tool::NumberRace(tool) => Ok(tool.handle(invocation).await),
            Tool::AgentSearch(tool) => Ok(tool.handle(invocation, session)),
            Tool::ImageAnalyzer(tool) => Ok(tool.handle(invocation, session)),
        }
    }
}

/// Tools available to sessions, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Registry with the given tools. A later tool replaces an earlier one of the same kind.
    pub fn new(tools: Vec<Tool>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// All four built-in tools wired to the configured backends.
    pub fn builtin(config: &ServerConfig) -> Self {
        let vision = BedrockStreamConfig::from_server_config(config).with_model(&config.vision_model_id);

        Self::new(vec![
            Tool::GetWeather(WeatherTool::new(
                &config.weather_geocoding_url,
                &config.weather_forecast_url,
            )),
            Tool::NumberRace(NumberRaceTool::new()),
            Tool::AgentSearch(AgentSearchTool::new(Arc::new(A2aAgentClient::new(
                &config.agent_url,
            )))),
            Tool::ImageAnalyzer(ImageAnalyzerTool::new(Arc::new(
                BedrockImageDescriber::new(vision),
            ))),
        ])
    }

    pub fn register(&mut self, tool: Tool) {
        let kind = tool.kind();
        self.tools.retain(|existing| existing.kind() != kind);
        self.tools.push(tool);
    }

    pub fn resolve(&self, name: &str) -> Option<&Tool> {
        let kind = ToolKind::from_name(name)?;
        self.tools.iter().find(|tool| tool.kind() == kind)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(Tool::spec).collect()
    }

    /// Specs in the `{"toolSpec": ...}` form used for upstream tool configuration.
    pub fn specs_json(&self) -> Vec<Value> {
        self.specs().iter().map(ToolSpec::to_json).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
