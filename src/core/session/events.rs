//! Wire event builders and classifiers for the session protocol.
//!
//! Upstream events are `{"event": {"<type>": {...}}}` objects; client-directed
//! side messages are `{"customEvent": "<name>", "payload": {...}}` objects.

use serde_json::{Value, json};

use crate::core::tools::ToolOutcome;

/// Substrings that mark an upstream receive error as fatal for the session.
pub const FATAL_ERROR_MARKERS: &[&str] = &["Invalid voice ID", "ValidationException", "Error(s):"];

pub const TOOL_COMPLETION_EVENT: &str = "toolCompletionNotification";
pub const SCREENSHOT_REQUEST_EVENT: &str = "requestScreenshotForAnalysis";
pub const SCREENSHOT_DATA_EVENT: &str = "capturedScreenshotData";

/// The single key of an `{"event": {...}}` object.
pub fn event_type(message: &Value) -> Option<&str> {
    message
        .get("event")?
        .as_object()?
        .keys()
        .next()
        .map(String::as_str)
}

/// Body of the named event type, if `message` carries it.
pub fn event_body<'a>(message: &'a Value, event_type: &str) -> Option<&'a Value> {
    message.get("event")?.get(event_type)
}

/// `contentEnd` with `type: TOOL` closes a tool-use block.
pub fn is_tool_content_end(message: &Value) -> bool {
    event_body(message, "contentEnd")
        .and_then(|body| body.get("type"))
        .and_then(Value::as_str)
        == Some("TOOL")
}

/// Whether a `contentStart` body announces speculative generation.
///
/// `additionalModelFields` arrives as an embedded JSON string.
pub fn is_speculative_content(content_start: &Value) -> bool {
    let Some(fields) = content_start
        .get("additionalModelFields")
        .and_then(Value::as_str)
    else {
        return false;
    };

    serde_json::from_str::<Value>(fields)
        .ok()
        .and_then(|v| v.get("generationStage").cloned())
        == Some(Value::String("SPECULATIVE".to_string()))
}

pub fn is_fatal_stream_error(message: &str) -> bool {
    FATAL_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

pub fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

// =============================================================================
// Upstream Events
// =============================================================================

pub fn audio_input(prompt_name: &str, content_name: &str, content: &str) -> Value {
    json!({
        "event": {
            "audioInput": {
                "promptName": prompt_name,
                "contentName": content_name,
                "content": content,
                "role": "USER"
            }
        }
    })
}

/// The three upstream events that return a tool result, in send order.
pub fn tool_result_triad(
    prompt_name: &str,
    content_name: &str,
    tool_use_id: &str,
    outcome: &ToolOutcome,
) -> [Value; 3] {
    [
        json!({
            "event": {
                "contentStart": {
                    "interactive": true,
                    "promptName": prompt_name,
                    "contentName": content_name,
                    "type": "TOOL",
                    "role": "TOOL",
                    "toolResultInputConfiguration": {
                        "toolUseId": tool_use_id,
                        "type": "TEXT",
                        "textInputConfiguration": {
                            "mediaType": "text/plain"
                        }
                    }
                }
            }
        }),
        json!({
            "event": {
                "toolResult": {
                    "promptName": prompt_name,
                    "contentName": content_name,
                    "content": outcome.to_content_string(),
                    "status": outcome.status.as_str()
                }
            }
        }),
        json!({
            "event": {
                "contentEnd": {
                    "promptName": prompt_name,
                    "contentName": content_name
                }
            }
        }),
    ]
}

// =============================================================================
// Client-Directed Messages
// =============================================================================

pub fn decode_error(raw: &str) -> Value {
    json!({
        "raw_data": raw,
        "error": "JSONDecodeError"
    })
}

pub fn fatal_stream_error(message: &str) -> Value {
    error_event("BedrockStreamError", first_line(message))
}

pub fn initialization_error(message: &str) -> Value {
    error_event(
        "BedrockInitializationError",
        &format!(
            "Failed to initialize Bedrock connection: {}",
            first_line(message)
        ),
    )
}

fn error_event(kind: &str, message: &str) -> Value {
    json!({
        "event": {
            "error": {
                "type": kind,
                "message": message,
                "fatal": true
            }
        }
    })
}

pub fn connection_status() -> Value {
    json!({
        "event": {
            "connectionStatus": {
                "status": "authenticated",
                "message": "Connection authenticated successfully"
            }
        }
    })
}

pub fn tool_completion(tool_name: &str, tool_use_id: &str, status: &str, message: &str) -> Value {
    json!({
        "customEvent": TOOL_COMPLETION_EVENT,
        "payload": {
            "toolName": tool_name,
            "toolUseId": tool_use_id,
            "status": status,
            "message": message
        }
    })
}

pub fn screenshot_request(analysis_id: &str) -> Value {
    json!({
        "customEvent": SCREENSHOT_REQUEST_EVENT,
        "payload": {
            "imageAnalysisId": analysis_id
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let message = json!({"event": {"textOutput": {"content": "hi", "role": "ASSISTANT"}}});
        assert_eq!(event_type(&message), Some("textOutput"));
        assert_eq!(event_type(&json!({"customEvent": "x"})), None);
        assert_eq!(event_type(&json!({"event": "flat"})), None);
    }

    #[test]
    fn test_tool_content_end_detection() {
        assert!(is_tool_content_end(
            &json!({"event": {"contentEnd": {"type": "TOOL"}}})
        ));
        assert!(!is_tool_content_end(
            &json!({"event": {"contentEnd": {"type": "AUDIO"}}})
        ));
        assert!(!is_tool_content_end(&json!({"event": {"contentEnd": {}}})));
    }

    #[test]
    fn test_speculative_content() {
        let speculative = json!({
            "additionalModelFields": "{\"generationStage\":\"SPECULATIVE\"}"
        });
        let final_stage = json!({
            "additionalModelFields": "{\"generationStage\":\"FINAL\"}"
        });

        assert!(is_speculative_content(&speculative));
        assert!(!is_speculative_content(&final_stage));
        assert!(!is_speculative_content(
            &json!({"additionalModelFields": "{not json"})
        ));
    }

    #[test]
    fn test_fatal_error_classification() {
        assert!(is_fatal_stream_error(
            "ValidationException: Invalid input\nrequest id: 123"
        ));
        assert!(is_fatal_stream_error("Invalid voice ID: robot"));
        assert!(is_fatal_stream_error("Error(s): [bad parameter]"));
        assert!(!is_fatal_stream_error("connection reset by peer"));
    }

    #[test]
    fn test_fatal_error_carries_first_line_only() {
        let event = fatal_stream_error("ValidationException: bad\nsecond line");
        assert_eq!(event["event"]["error"]["type"], "BedrockStreamError");
        assert_eq!(event["event"]["error"]["message"], "ValidationException: bad");
        assert_eq!(event["event"]["error"]["fatal"], true);
    }

    #[test]
    fn test_tool_result_triad_shape() {
        let outcome = ToolOutcome::success("done");
        let [start, result, end] = tool_result_triad("prompt-1", "content-1", "tool-1", &outcome);

        let start = &start["event"]["contentStart"];
        assert_eq!(start["type"], "TOOL");
        assert_eq!(start["role"], "TOOL");
        assert_eq!(start["toolResultInputConfiguration"]["toolUseId"], "tool-1");

        let result = &result["event"]["toolResult"];
        assert_eq!(result["contentName"], "content-1");
        assert_eq!(result["status"], "success");
        let content: Value = serde_json::from_str(result["content"].as_str().unwrap()).unwrap();
        assert_eq!(content["result"], "done");

        assert_eq!(end["event"]["contentEnd"]["contentName"], "content-1");
        assert!(end["event"]["contentEnd"].get("type").is_none());
    }
}
