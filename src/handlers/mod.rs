//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and tool listing
//! - `session` - Model stream session over WebSocket

pub mod api;
pub mod session;

pub use session::session_handler;
