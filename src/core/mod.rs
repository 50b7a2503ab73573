pub mod session;
pub mod tools;
pub mod upstream;

// Re-export commonly used types for convenience
pub use session::{
    AudioChunk, ExternalData, SessionError, SessionResult, SessionSettings, SessionStreamManager,
};
pub use tools::{Tool, ToolError, ToolInvocation, ToolKind, ToolOutcome, ToolRegistry, ToolResult};
pub use upstream::{
    BedrockConnector, BedrockStreamConfig, UpstreamConnector, UpstreamError, UpstreamResult,
    UpstreamStream,
};
