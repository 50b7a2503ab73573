//! `imageAnalyzer`: describes what the user currently sees.
//!
//! The page image lives in the client, so the background task asks the client
//! for a screenshot through the session's external-data rendezvous, then sends
//! the image to a vision model.

mod describer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

pub use describer::BedrockImageDescriber;

use super::base::{ToolError, ToolInvocation, ToolOutcome, ToolResult, ToolSpec};
use crate::core::session::{
    DeferredReplies, ExternalData, RendezvousError, SessionStreamManager, events,
};

pub const NAME: &str = "imageAnalyzer";

const DEFAULT_CONTEXT: &str = "the current page content";

/// A decoded screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Image subtype from the data URL (`png`, `jpeg`, ...)
    pub format: String,
    pub bytes: Vec<u8>,
}

impl Screenshot {
    /// Decode a `data:image/<format>;base64,<data>` URL.
    pub fn from_data_url(data_url: &str) -> ToolResult<Self> {
        let invalid = |reason: &str| {
            ToolError::InvalidInput(format!(
                "Invalid image data format from extension: {reason}"
            ))
        };

        if !data_url.starts_with("data:image") {
            return Err(invalid("Received data is not a valid image data URL."));
        }
        let Some((header, data)) = data_url.split_once(',') else {
            return Err(invalid("Image data URL has no payload."));
        };

        let format = header
            .trim_start_matches("data:image/")
            .split(';')
            .next()
            .filter(|f| !f.is_empty() && !f.starts_with("data:"))
            .map(|f| if f == "jpg" { "jpeg" } else { f })
            .unwrap_or("jpeg")
            .to_string();

        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self { format, bytes })
    }
}

/// Vision backend that turns an image and a prompt into a description.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, screenshot: &Screenshot, prompt: &str) -> ToolResult<String>;
}

#[derive(Clone)]
pub struct ImageAnalyzerTool {
    describer: Arc<dyn ImageDescriber>,
}

impl fmt::Debug for ImageAnalyzerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAnalyzerTool").finish_non_exhaustive()
    }
}

impl ImageAnalyzerTool {
    pub fn new(describer: Arc<dyn ImageDescriber>) -> Self {
        Self { describer }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Captures an image of the current web page and provides an AI-generated description. The user is notified when the analysis is complete.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "context": {
                        "type": "string",
                        "description": "Optional: Provide context or a specific question about the image to guide the analysis (e.g., 'focus on the colors' or 'what is the main subject?')."
                    }
                },
                "required": []
            }),
        }
    }

    pub fn handle(
        &self,
        invocation: &ToolInvocation,
        session: &Arc<SessionStreamManager>,
    ) -> ToolOutcome {
        let tool_name = invocation.tool_name.as_str();

        let Some(tool_use_id) = invocation.tool_use_id.clone() else {
            error!(tool = tool_name, "toolUseId missing");
            return ToolOutcome::error("Error: System error (missing toolUseId).");
        };

        let input = match invocation.parse_input() {
            Ok(input) => input,
            Err(e) => {
                error!(tool = tool_name, tool_use_id = %tool_use_id, "Invalid JSON in input: {}", e);
                return ToolOutcome::error(format!(
                    "Error: Invalid input format for {} tool.",
                    tool_name
                ));
            }
        };

        let context = input
            .get("context")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTEXT)
            .to_string();

        info!(tool = tool_name, tool_use_id = %tool_use_id, context = %context, "Image analysis invoked");

        let replies = DeferredReplies {
            still_working: "I am still processing a previous request to analyze an image. I will notify you when it's complete.".to_string(),
            starting: format!(
                "Okay, I'll capture and analyze the image of your current page regarding '{}'. I'll notify you when the description is ready.",
                context
            ),
        };

        let describer = Arc::clone(&self.describer);
        let session_for_task = Arc::clone(session);
        session.retrieve_or_launch(tool_name, &tool_use_id, replies, move || {
            analyze(session_for_task, describer, context)
        })
    }
}

async fn analyze(
    session: Arc<SessionStreamManager>,
    describer: Arc<dyn ImageDescriber>,
    context: String,
) -> ToolResult<Value> {
    let analysis_id = Uuid::new_v4().to_string();
    info!(analysis_id = %analysis_id, context = %context, "Image analysis started");

    let pending = session.register_external_data(analysis_id.as_str());
    session.push_outbound(events::screenshot_request(&analysis_id));
    info!(analysis_id = %analysis_id, "Requested screenshot from client");

    let data_url = match pending.wait(session.external_data_timeout()).await {
        Ok(ExternalData::Payload(data_url)) => data_url,
        Ok(ExternalData::Failed(reason)) => {
            error!(analysis_id = %analysis_id, "Client reported screenshot error: {}", reason);
            return Err(ToolError::ExternalData(format!(
                "Frontend error during screenshot: {reason}"
            )));
        }
        Err(RendezvousError::Timeout) => {
            error!(analysis_id = %analysis_id, "Timed out waiting for screenshot");
            return Err(ToolError::Timeout(
                "Timeout: Screenshot not received from the extension.".to_string(),
            ));
        }
        Err(RendezvousError::Closed) => {
            return Err(ToolError::ExternalData(
                "Screenshot data was not available or not received.".to_string(),
            ));
        }
    };

    let screenshot = Screenshot::from_data_url(&data_url)?;
    let prompt = format!("Describe this image. Focus on: {}", context);
    let description = describer
        .describe(&screenshot, &prompt)
        .await
        .map_err(|e| ToolError::Backend(format!("Error during image analysis: {e}")))?;

    info!(analysis_id = %analysis_id, "Image analysis completed");
    Ok(json!({
        "description": description,
        "originalContext": context,
        "analysisId": analysis_id,
        "status": "success",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png_data_url() {
        let screenshot = Screenshot::from_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(screenshot.format, "png");
        assert_eq!(&screenshot.bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_jpg_maps_to_jpeg() {
        let screenshot = Screenshot::from_data_url("data:image/jpg;base64,/9j/").unwrap();
        assert_eq!(screenshot.format, "jpeg");
    }

    #[test]
    fn test_rejects_non_image_urls() {
        let err = Screenshot::from_data_url("data:text/plain;base64,aGk=").unwrap_err();
        assert!(err.to_string().contains("not a valid image data URL"));

        assert!(Screenshot::from_data_url("data:image/png;base64").is_err());
        assert!(Screenshot::from_data_url("data:image/png;base64,***").is_err());
    }
}
