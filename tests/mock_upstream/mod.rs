//! Channel-backed upstream for session tests
//!
//! [`MockConnector`] hands out pre-built [`UpstreamStream`]s; the paired
//! [`MockUpstream`] lets a test read what the session sent upstream and inject
//! model events (or receive errors) as if the backend produced them.

// Shared by several test binaries, each uses a subset
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use sonic_gateway::core::session::{OutboundMessage, SessionSettings, SessionStreamManager};
use sonic_gateway::core::tools::ToolRegistry;
use sonic_gateway::core::upstream::{
    UpstreamConnector, UpstreamError, UpstreamResult, UpstreamStream,
};

/// How long a test waits for an expected message before failing
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockConnector {
    streams: Mutex<VecDeque<UpstreamStream>>,
    failure: Option<String>,
    opens: AtomicUsize,
}

impl MockConnector {
    /// Connector with one stream ready to open.
    pub fn new() -> (Arc<Self>, MockUpstream) {
        let (stream, sent, inject) = UpstreamStream::channel_pair();
        let connector = Arc::new(Self {
            streams: Mutex::new(VecDeque::from([stream])),
            failure: None,
            opens: AtomicUsize::new(0),
        });
        (connector, MockUpstream { sent, inject })
    }

    /// Connector whose open always fails with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(VecDeque::new()),
            failure: Some(message.to_string()),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn open(&self) -> UpstreamResult<UpstreamStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(UpstreamError::ConnectionFailed(message.clone()));
        }
        self.streams
            .lock()
            .pop_front()
            .ok_or(UpstreamError::NotConnected)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Test side of a mock stream.
pub struct MockUpstream {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub inject: mpsc::UnboundedSender<UpstreamResult<String>>,
}

impl MockUpstream {
    /// Inject a model event.
    pub fn emit(&self, event: Value) {
        self.emit_raw(&event.to_string());
    }

    pub fn emit_raw(&self, raw: &str) {
        self.inject
            .send(Ok(raw.to_string()))
            .expect("session stopped receiving");
    }

    /// Inject a chunk that failed to decode.
    pub fn emit_invalid(&self, lossy: &str) {
        self.inject
            .send(Err(UpstreamError::InvalidPayload(lossy.to_string())))
            .expect("session stopped receiving");
    }

    /// Inject a receive error.
    pub fn fail(&self, message: &str) {
        self.inject
            .send(Err(UpstreamError::StreamError(message.to_string())))
            .expect("session stopped receiving");
    }

    /// Next event the session sent upstream.
    pub async fn next_sent(&mut self) -> Value {
        let raw = tokio::time::timeout(RECV_TIMEOUT, self.sent.recv())
            .await
            .expect("timed out waiting for an upstream event")
            .expect("upstream input closed");
        serde_json::from_str(&raw).expect("session sent invalid JSON upstream")
    }

    /// The three events of one tool result, as a `(contentStart, toolResult, contentEnd)` triple.
    pub async fn next_tool_result(&mut self) -> (Value, Value, Value) {
        let start = self.next_sent().await;
        let result = self.next_sent().await;
        let end = self.next_sent().await;
        (start, result, end)
    }

    /// Whether nothing more has been sent upstream so far.
    pub fn nothing_sent(&mut self) -> bool {
        self.sent.try_recv().is_err()
    }

    /// Announce a tool call and close its content block.
    pub fn call_tool(&self, tool_name: &str, tool_use_id: &str, input: Value) {
        self.emit(tool_use(tool_name, tool_use_id, &input.to_string()));
        self.emit(tool_content_end());
    }
}

pub fn tool_use(tool_name: &str, tool_use_id: &str, content: &str) -> Value {
    json!({
        "event": {
            "toolUse": {
                "toolName": tool_name,
                "toolUseId": tool_use_id,
                "content": content
            }
        }
    })
}

pub fn tool_content_end() -> Value {
    json!({
        "event": {
            "contentEnd": {
                "type": "TOOL",
                "stopReason": "TOOL_USE"
            }
        }
    })
}

/// `(status, result text)` from a `toolResult` event.
pub fn tool_result_content(event: &Value) -> (String, String) {
    let body = &event["event"]["toolResult"];
    let content: Value = serde_json::from_str(
        body["content"]
            .as_str()
            .expect("toolResult content is a string"),
    )
    .expect("toolResult content is JSON");
    (
        body["status"].as_str().unwrap_or_default().to_string(),
        content["result"].as_str().unwrap_or_default().to_string(),
    )
}

/// A started session wired to a fresh mock stream.
pub struct TestSession {
    pub session: Arc<SessionStreamManager>,
    pub upstream: MockUpstream,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl TestSession {
    pub async fn start(tools: ToolRegistry) -> Self {
        Self::start_with(tools, SessionSettings::default()).await
    }

    pub async fn start_with(tools: ToolRegistry, settings: SessionSettings) -> Self {
        let (connector, upstream) = MockConnector::new();
        let session = SessionStreamManager::new(settings, connector, Arc::new(tools));
        session
            .initialize_stream()
            .await
            .expect("mock stream opens");
        session.set_prompt_name("prompt-1");
        let outbound = session.take_outbound().expect("outbound queue available");
        Self {
            session,
            upstream,
            outbound,
        }
    }

    /// Next client-directed message; `None` is the end-of-stream marker.
    pub async fn next_outbound(&mut self) -> OutboundMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("outbound queue closed")
    }

    /// Skip forwarded model events until a custom (tool-side) message arrives.
    pub async fn next_custom_event(&mut self) -> Value {
        loop {
            match self.next_outbound().await {
                Some(message) if message.get("customEvent").is_some() => return message,
                Some(_) => continue,
                None => panic!("stream ended before a custom event"),
            }
        }
    }
}
