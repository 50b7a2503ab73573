//! Image description through the Bedrock Converse API.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ConverseOutput, ImageBlock, ImageFormat, ImageSource, Message,
};
use aws_smithy_types::Blob;
use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ImageDescriber, Screenshot};
use crate::core::tools::base::{ToolError, ToolResult};
use crate::core::upstream::BedrockStreamConfig;

const NO_DESCRIPTION: &str = "I couldn't analyze the image.";

/// Describes images with a Bedrock vision model. The SDK client is created on first use.
#[derive(Debug)]
pub struct BedrockImageDescriber {
    config: BedrockStreamConfig,
    client: OnceCell<BedrockClient>,
}

impl BedrockImageDescriber {
    pub fn new(config: BedrockStreamConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn client(&self) -> &BedrockClient {
        self.client
            .get_or_init(|| async {
                info!(model_id = %self.config.model_id, "Initializing Bedrock vision client");
                BedrockClient::new(&self.config.load_sdk_config().await)
            })
            .await
    }
}

#[async_trait]
impl ImageDescriber for BedrockImageDescriber {
    async fn describe(&self, screenshot: &Screenshot, prompt: &str) -> ToolResult<String> {
        let image = ImageBlock::builder()
            .format(ImageFormat::from(screenshot.format.as_str()))
            .source(ImageSource::Bytes(Blob::new(screenshot.bytes.clone())))
            .build()
            .map_err(|e| ToolError::Internal(format!("Invalid image block: {e}")))?;

        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Image(image))
            .content(ContentBlock::Text(prompt.to_string()))
            .build()
            .map_err(|e| ToolError::Internal(format!("Invalid message: {e}")))?;

        debug!(
            model_id = %self.config.model_id,
            bytes = screenshot.bytes.len(),
            format = %screenshot.format,
            "Sending image to vision model"
        );

        let response = self
            .client()
            .await
            .converse()
            .model_id(self.config.model_id.as_str())
            .messages(message)
            .send()
            .await
            .map_err(|e| ToolError::Backend(DisplayErrorContext(&e).to_string()))?;

        let description = match response.output() {
            Some(ConverseOutput::Message(message)) => message
                .content()
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        };

        if description.trim().is_empty() {
            return Ok(NO_DESCRIPTION.to_string());
        }
        Ok(description.trim().to_string())
    }
}
