//! Client → server message classification for the session WebSocket.
//!
//! Clients send two kinds of text frames:
//! - `{"event": {"<type>": {...}}}`: protocol events for the model stream
//! - `{"customEvent": "capturedScreenshotData", "payload": {...}}`: data a tool
//!   requested from the client
//!
//! Anything else is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::core::session::{ExternalData, events};

/// Error delivered when a screenshot reply carries neither data nor an error
pub const MISSING_IMAGE_DATA: &str = "Missing image data from frontend.";

/// Payload of a `capturedScreenshotData` message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotPayload {
    pub image_analysis_id: Option<String>,
    pub image_data_url: Option<String>,
    pub error: Option<String>,
}

impl ScreenshotPayload {
    /// The value handed to the waiting tool. A client-side error wins over data.
    pub fn to_external_data(&self) -> ExternalData {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        if let Some(error) = non_empty(&self.error) {
            return ExternalData::Failed(error);
        }
        match non_empty(&self.image_data_url) {
            Some(data_url) => ExternalData::Payload(data_url),
            None => ExternalData::Failed(MISSING_IMAGE_DATA.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Screenshot reply for the image analyzer
    ScreenshotData(ScreenshotPayload),
    /// Protocol event with its type key and the full message
    Event { event_type: String, message: Value },
    /// Well-formed JSON that is neither of the above
    Unrecognized,
}

impl ClientMessage {
    /// Classify a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let message: Value = serde_json::from_str(text)?;
        Ok(Self::classify(message))
    }

    pub fn classify(message: Value) -> Self {
        if message.get("customEvent").and_then(Value::as_str) == Some(events::SCREENSHOT_DATA_EVENT)
        {
            let payload = message
                .get("payload")
                .cloned()
                .and_then(|p| serde_json::from_value(p).ok())
                .unwrap_or_default();
            return Self::ScreenshotData(payload);
        }

        match events::event_type(&message) {
            Some(event_type) => Self::Event {
                event_type: event_type.to_string(),
                message,
            },
            None => Self::Unrecognized,
        }
    }
}

/// `promptName` of a `promptStart` event
pub fn prompt_start_name(message: &Value) -> Option<&str> {
    events::event_body(message, "promptStart")?
        .get("promptName")?
        .as_str()
}

/// `contentName` of a `contentStart` event that opens an audio block
pub fn audio_content_start_name(message: &Value) -> Option<&str> {
    let body = events::event_body(message, "contentStart")?;
    if body.get("type").and_then(Value::as_str) != Some("AUDIO") {
        return None;
    }
    body.get("contentName")?.as_str()
}
