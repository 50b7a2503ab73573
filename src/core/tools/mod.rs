//! Tools the model can invoke during a session.
//!
//! - `base`: invocation, outcome and spec types
//! - `registry`: name resolution and dispatch over the closed [`Tool`] set
//! - `weather`, `number_race`: answered within the turn
//! - `agent_search`, `image_analyzer`: run as background tasks on the session

pub mod agent_search;
pub mod base;
pub mod image_analyzer;
pub mod number_race;
pub mod registry;
pub mod weather;

pub use agent_search::{A2aAgentClient, AgentSearchTool, SearchAgent};
pub use base::{ToolError, ToolInvocation, ToolOutcome, ToolResult, ToolSpec, ToolStatus};
pub use image_analyzer::{BedrockImageDescriber, ImageAnalyzerTool, ImageDescriber, Screenshot};
pub use number_race::NumberRaceTool;
pub use registry::{TOOL_NAME_MAP, Tool, ToolKind, ToolRegistry};
pub use weather::WeatherTool;
