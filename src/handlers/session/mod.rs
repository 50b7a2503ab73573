//! Session WebSocket handlers
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - `{"event": {...}}`: model stream events (`sessionStart`, `promptStart`,
//!   `contentStart`, `audioInput`, `contentEnd`, ...). `audioInput` is queued
//!   for the audio loop, everything else is forwarded upstream as-is.
//! - `{"customEvent": "capturedScreenshotData", "payload": {...}}`: screenshot
//!   requested by the image analyzer tool
//!
//! ## Server → Client
//!
//! - `connectionStatus` event right after the upgrade
//! - every upstream event, in arrival order
//! - `toolCompletionNotification` when a background tool finishes
//! - `requestScreenshotForAnalysis` when a tool needs a screenshot
//! - fatal `error` events, after which the connection is closed

mod handler;
pub mod messages;

pub use handler::{route_client_text, session_handler};
