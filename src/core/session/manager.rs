//! Session stream manager.
//!
//! Bridges one client connection to one upstream model stream:
//!
//! ```text
//!  client ──► add_audio_chunk ──► audio queue ──► audio loop ──┐
//!  client ──► send_event ─────────────────────────────────────┼──► upstream
//!                                                              │
//!  client ◄── forwarder ◄── outbound queue ◄── response loop ◄─┘
//!                                  ▲                │ toolUse / contentEnd(TOOL)
//!                                  │                ▼
//!                         background units ◄── dispatch ──► tool result triad ──► upstream
//! ```
//!
//! Tool calls that take longer than a turn run as background units. They write
//! their result into a name-keyed cache and push a completion notification onto
//! the outbound queue; the model collects the result by invoking the tool again.
//!
//! Cancellation is a token tree. `shutdown()` cancels the root, which stops both
//! loops and every background unit. When the upstream stream ends on its own only
//! the loop token is cancelled, so background units can still finish.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::background::{DeferredReplies, ResultCache, TaskReservation, TaskTable, panic_message};
use super::events;
use super::invocation::InvocationRegister;
use super::rendezvous::{ExternalData, PendingExternalData, Rendezvous};
use crate::config::ServerConfig;
use crate::core::tools::{ToolInvocation, ToolOutcome, ToolRegistry, ToolResult, ToolStatus};
use crate::core::upstream::{UpstreamConnector, UpstreamError, UpstreamReceiver, UpstreamSender};

/// Default bound on waiting for client-supplied data
pub const DEFAULT_EXTERNAL_DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `shutdown` waits for loops and background units to exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Outbound queue item. `None` tells the forwarder no further messages follow.
pub type OutboundMessage = Option<Value>;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to initialize stream: {0}")]
    Connection(#[from] UpstreamError),

    #[error("Session is not active")]
    NotActive,

    #[error("Stream already initialized")]
    AlreadyInitialized,
}

pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Settings and Inputs
// =============================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub external_data_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            external_data_timeout: DEFAULT_EXTERNAL_DATA_TIMEOUT,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            external_data_timeout: Duration::from_secs(config.external_data_timeout_seconds),
        }
    }
}

/// One audio chunk as received from the client. Fields are validated by the audio loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChunk {
    pub prompt_name: Option<String>,
    pub content_name: Option<String>,
    pub content: Option<String>,
}

impl AudioChunk {
    pub fn new(
        prompt_name: impl Into<String>,
        content_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            prompt_name: Some(prompt_name.into()),
            content_name: Some(content_name.into()),
            content: Some(content.into()),
        }
    }

    /// Build from an `audioInput` event body.
    pub fn from_audio_input(body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            prompt_name: field("promptName"),
            content_name: field("contentName"),
            content: field("content"),
        }
    }

    fn complete(&self) -> Option<(&str, &str, &str)> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        Some((
            present(&self.prompt_name)?,
            present(&self.content_name)?,
            present(&self.content)?,
        ))
    }
}

#[derive(Debug, Default)]
struct PromptNames {
    prompt_name: Option<String>,
    audio_content_name: Option<String>,
}

// =============================================================================
// Manager
// =============================================================================

pub struct SessionStreamManager {
    settings: SessionSettings,
    connector: Arc<dyn UpstreamConnector>,
    tools: Arc<ToolRegistry>,

    active: AtomicBool,
    upstream: Mutex<Option<UpstreamSender>>,
    upstream_task: Mutex<Option<JoinHandle<()>>>,

    audio_tx: mpsc::UnboundedSender<AudioChunk>,
    audio_rx: Mutex<Option<mpsc::UnboundedReceiver<AudioChunk>>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,

    prompt: Mutex<PromptNames>,
    invocation: InvocationRegister,
    tasks: TaskTable,
    results: ResultCache,
    rendezvous: Rendezvous,

    /// Root token: loops and background units
    shutdown: CancellationToken,
    /// Child of `shutdown`: response and audio loops only
    stream_token: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
    background: TaskTracker,
}

impl std::fmt::Debug for SessionStreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStreamManager")
            .field("provider", &self.connector.provider_name())
            .field("active", &self.is_active())
            .field("background_tasks", &self.tasks.len())
            .field("cached_results", &self.results.len())
            .field("pending_external_data", &self.rendezvous.len())
            .finish()
    }
}

impl SessionStreamManager {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn UpstreamConnector>,
        tools: Arc<ToolRegistry>,
    ) -> Arc<Self> {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let stream_token = shutdown.child_token();

        Arc::new(Self {
            settings,
            connector,
            tools,
            active: AtomicBool::new(false),
            upstream: Mutex::new(None),
            upstream_task: Mutex::new(None),
            audio_tx,
            audio_rx: Mutex::new(Some(audio_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            prompt: Mutex::new(PromptNames::default()),
            invocation: InvocationRegister::new(),
            tasks: TaskTable::new(),
            results: ResultCache::new(),
            rendezvous: Rendezvous::new(),
            shutdown,
            stream_token,
            loops: Mutex::new(Vec::new()),
            background: TaskTracker::new(),
        })
    }

    // -------------------------------------------------------------------------
    // Stream lifecycle
    // -------------------------------------------------------------------------

    /// Open the upstream stream and start the response and audio loops.
    ///
    /// Not retried. On failure the session stays inactive and must not be used
    /// for sending.
    pub async fn initialize_stream(self: &Arc<Self>) -> SessionResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::NotActive);
        }
        let Some(audio_rx) = self.audio_rx.lock().take() else {
            return Err(SessionError::AlreadyInitialized);
        };

        let stream = match self.connector.open().await {
            Ok(stream) => stream,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                error!(
                    provider = self.connector.provider_name(),
                    "Failed to open upstream stream: {}", e
                );
                return Err(SessionError::Connection(e));
            }
        };

        *self.upstream.lock() = Some(stream.sender);
        *self.upstream_task.lock() = stream.task;
        self.active.store(true, Ordering::SeqCst);

        let response_loop = tokio::spawn(Arc::clone(self).process_responses(stream.receiver));
        let audio_loop = tokio::spawn(Arc::clone(self).process_audio_input(audio_rx));
        self.loops.lock().extend([response_loop, audio_loop]);

        info!(
            provider = self.connector.provider_name(),
            "Upstream stream initialized"
        );
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop both loops, cancel every background unit and close the upstream stream.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down session stream");

        self.active.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let cancelled = self.tasks.cancel_all();
        if cancelled > 0 {
            info!(count = cancelled, "Cancelled background tasks");
        }

        // dropping the sender ends the upstream input stream
        self.upstream.lock().take();
        if let Some(task) = self.upstream_task.lock().take() {
            task.abort();
        }

        let loops: Vec<JoinHandle<()>> = self.loops.lock().drain(..).collect();
        for handle in loops {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Session loop did not stop in time, aborting");
                abort.abort();
            }
        }

        self.background.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.background.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tasks.len(),
                "Background tasks did not stop in time"
            );
        }

        debug!("Session stream shut down");
    }

    // -------------------------------------------------------------------------
    // Queues
    // -------------------------------------------------------------------------

    /// Hand the outbound queue to the forwarder. Only the first call returns it.
    pub fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<OutboundMessage>> {
        self.outbound_rx.lock().take()
    }

    /// Queue a client-directed message.
    pub fn push_outbound(&self, message: Value) {
        if self.outbound_tx.send(Some(message)).is_err() {
            debug!("Outbound queue closed, dropping message");
        }
    }

    /// Queue an audio chunk for the audio loop. Never blocks.
    pub fn add_audio_chunk(&self, chunk: AudioChunk) {
        if self.audio_tx.send(chunk).is_err() {
            debug!("Audio queue closed, dropping chunk");
        }
    }

    // -------------------------------------------------------------------------
    // Upstream sends
    // -------------------------------------------------------------------------

    /// Send one event upstream. A no-op with a warning while inactive.
    pub fn send_event(&self, event: &Value) {
        self.send_events(std::slice::from_ref(event));
    }

    /// Send events as one uninterrupted run on the upstream channel.
    fn send_events(&self, batch: &[Value]) {
        if !self.is_active() {
            warn!("Upstream stream not active, cannot send event");
            return;
        }

        let guard = self.upstream.lock();
        let Some(sender) = guard.as_ref() else {
            warn!("Upstream stream closed, cannot send event");
            return;
        };

        for event in batch {
            let payload = match serde_json::to_string(event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode upstream event: {}", e);
                    continue;
                }
            };

            let event_type = events::event_type(event).unwrap_or("unknown");
            if let Err(e) = sender.send(payload) {
                error!(event_type, "Error sending event upstream: {}", e);
                continue;
            }
            if event_type != "audioInput" {
                info!(event_type, "Sent event upstream");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Prompt identifiers
    // -------------------------------------------------------------------------

    pub fn set_prompt_name(&self, prompt_name: impl Into<String>) {
        self.prompt.lock().prompt_name = Some(prompt_name.into());
    }

    pub fn prompt_name(&self) -> Option<String> {
        self.prompt.lock().prompt_name.clone()
    }

    pub fn set_audio_content_name(&self, content_name: impl Into<String>) {
        self.prompt.lock().audio_content_name = Some(content_name.into());
    }

    pub fn audio_content_name(&self) -> Option<String> {
        self.prompt.lock().audio_content_name.clone()
    }

    // -------------------------------------------------------------------------
    // Loops
    // -------------------------------------------------------------------------

    async fn process_audio_input(
        self: Arc<Self>,
        mut audio_rx: mpsc::UnboundedReceiver<AudioChunk>,
    ) {
        debug!("Audio loop started");
        let token = self.stream_token.clone();

        loop {
            let chunk = select! {
                biased;
                _ = token.cancelled() => break,
                chunk = audio_rx.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            if !self.is_active() {
                break;
            }

            match chunk.complete() {
                Some((prompt_name, content_name, content)) => {
                    self.send_event(&events::audio_input(prompt_name, content_name, content));
                }
                None => info!("Missing required audio data properties, dropping chunk"),
            }
        }

        debug!("Audio loop finished");
    }

    async fn process_responses(self: Arc<Self>, mut receiver: UpstreamReceiver) {
        info!(prompt_name = ?self.prompt_name(), "Response processing started");
        let token = self.stream_token.clone();

        loop {
            let received = select! {
                biased;
                _ = token.cancelled() => {
                    info!("Response processing cancelled");
                    break;
                }
                received = receiver.receive() => received,
            };

            match received {
                Ok(Some(raw)) => {
                    select! {
                        biased;
                        _ = token.cancelled() => {
                            info!("Response processing cancelled during event handling");
                            break;
                        }
                        _ = self.handle_upstream_message(&raw) => {}
                    }
                }
                Ok(None) => {
                    info!("Upstream stream ended");
                    break;
                }
                Err(UpstreamError::InvalidPayload(raw)) => {
                    error!("Failed to decode upstream event");
                    self.push_outbound(events::decode_error(&raw));
                }
                Err(e) => {
                    let message = match &e {
                        UpstreamError::StreamError(message) => message.clone(),
                        other => other.to_string(),
                    };
                    error!("Error receiving from upstream: {}", message);
                    if events::is_fatal_stream_error(&message) {
                        self.push_outbound(events::fatal_stream_error(&message));
                        info!("Sent fatal stream error to client");
                    }
                    break;
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        self.stream_token.cancel();
        if self.outbound_tx.send(None).is_err() {
            debug!("Outbound queue closed before end-of-stream marker");
        }
        info!("Response processing finished");
    }

    async fn handle_upstream_message(self: &Arc<Self>, raw: &str) {
        let message: Value = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to parse upstream event: {}", e);
                self.push_outbound(events::decode_error(raw));
                return;
            }
        };

        match events::event_type(&message) {
            Some("contentStart") => {
                debug!("Content start detected");
                if events::event_body(&message, "contentStart")
                    .is_some_and(events::is_speculative_content)
                {
                    debug!("Speculative content detected");
                }
            }
            Some("textOutput") => {
                let role = events::event_body(&message, "textOutput")
                    .and_then(|body| body.get("role"))
                    .and_then(Value::as_str);
                match role {
                    Some("ASSISTANT") => info!("Assistant message redacted"),
                    Some("USER") => info!("User message redacted"),
                    _ => debug!("Text output with unknown role"),
                }
            }
            Some("toolUse") => {
                match events::event_body(&message, "toolUse").and_then(ToolInvocation::from_tool_use)
                {
                    Some(invocation) => {
                        info!(
                            tool = %invocation.tool_name,
                            tool_use_id = ?invocation.tool_use_id,
                            "Tool use detected"
                        );
                        self.invocation.capture(invocation);
                    }
                    None => warn!("Tool use event without a tool name"),
                }
            }
            Some("contentEnd") if events::is_tool_content_end(&message) => {
                self.complete_tool_use().await;
            }
            Some(other) => debug!(event_type = other, "Upstream event"),
            None => debug!("Upstream message without an event envelope"),
        }

        self.push_outbound(message);
    }

    /// Run the captured invocation and send its result triad upstream.
    async fn complete_tool_use(self: &Arc<Self>) {
        let Some(invocation) = self.invocation.take() else {
            warn!("Tool content end without a captured tool use");
            return;
        };

        info!(tool = %invocation.tool_name, "Processing tool use and sending result");
        let outcome = self.dispatch(&invocation).await;

        let content_name = Uuid::new_v4().to_string();
        let prompt_name = self.prompt_name().unwrap_or_default();
        let tool_use_id = invocation.tool_use_id.clone().unwrap_or_default();

        self.send_events(&events::tool_result_triad(
            &prompt_name,
            &content_name,
            &tool_use_id,
            &outcome,
        ));
        info!(
            tool = %invocation.tool_name,
            tool_use_id = %tool_use_id,
            status = %outcome.status,
            "Tool result sent"
        );
    }

    // -------------------------------------------------------------------------
    // Tool dispatch
    // -------------------------------------------------------------------------

    /// Resolve and run a tool. Never fails: unknown tools, handler errors and
    /// handler panics all become error outcomes.
    pub async fn dispatch(self: &Arc<Self>, invocation: &ToolInvocation) -> ToolOutcome {
        let Some(tool) = self.tools.resolve(&invocation.tool_name) else {
            warn!(tool = %invocation.tool_name, "No handler registered for tool");
            return ToolOutcome::error(format!(
                "Tool {} is not implemented or recognized by the backend.",
                invocation.tool_name
            ));
        };

        debug!(tool = %invocation.tool_name, content = %invocation.content, "Dispatching tool");
        guard_handler(&invocation.tool_name, tool.execute(invocation, self)).await
    }

    // -------------------------------------------------------------------------
    // Background tasks
    // -------------------------------------------------------------------------

    /// Serve a slow tool call without blocking the model's turn.
    ///
    /// Pops a cached result for `tool_name` if one exists; otherwise reports the
    /// running task for `invocation_id`, or launches `work` in the background.
    pub fn retrieve_or_launch<F, Fut>(
        self: &Arc<Self>,
        tool_name: &str,
        invocation_id: &str,
        replies: DeferredReplies,
        work: F,
    ) -> ToolOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        if let Some(payload) = self.results.take(tool_name) {
            info!(tool = tool_name, invocation_id, "Cache hit, returning deferred result");
            let text = match payload {
                Value::String(text) => text,
                other => other.to_string(),
            };
            return ToolOutcome::success(text);
        }

        if self.tasks.is_active(invocation_id) {
            info!(tool = tool_name, invocation_id, "Background task already active");
            return ToolOutcome::success(replies.still_working);
        }

        if self.launch_background_task(invocation_id, tool_name, work) {
            ToolOutcome::success(replies.starting)
        } else {
            ToolOutcome::success(replies.still_working)
        }
    }

    /// Start `work` as a background unit for `invocation_id`.
    ///
    /// Returns `false` without starting anything if a unit for the id is already
    /// active or the session is shutting down.
    pub fn launch_background_task<F, Fut>(
        self: &Arc<Self>,
        invocation_id: &str,
        tool_name: &str,
        work: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            warn!(tool = tool_name, invocation_id, "Session shutting down, not launching background task");
            return false;
        }

        let Some(reservation) =
            self.tasks
                .reserve(invocation_id, tool_name, self.shutdown.child_token())
        else {
            warn!(
                tool = tool_name,
                invocation_id, "Background task already running, ignoring new request"
            );
            return false;
        };

        let work = work();
        let session = Arc::clone(self);
        let tool_name = tool_name.to_string();
        self.background
            .spawn(async move { session.supervise(reservation, tool_name, work).await });

        info!(invocation_id, "Scheduled background task");
        true
    }

    async fn supervise<Fut>(self: Arc<Self>, reservation: TaskReservation, tool_name: String, work: Fut)
    where
        Fut: Future<Output = ToolResult<Value>> + Send,
    {
        let invocation_id = reservation.invocation_id.clone();
        info!(tool = %tool_name, invocation_id = %invocation_id, "Background task started");

        let result = select! {
            biased;
            _ = reservation.token.cancelled() => None,
            result = AssertUnwindSafe(work).catch_unwind() => Some(result),
        };

        let completed = match result {
            Some(result) if !reservation.token.is_cancelled() => result,
            _ => {
                self.tasks.release(&reservation);
                info!(tool = %tool_name, invocation_id = %invocation_id, "Background task cancelled");
                return;
            }
        };

        let (status, message) = match completed {
            Ok(Ok(payload)) => {
                self.results.store(&tool_name, payload);
                info!(
                    tool = %tool_name,
                    invocation_id = %invocation_id,
                    cache_key = %tool_name.to_lowercase(),
                    "Background task completed, result cached"
                );
                (
                    ToolStatus::Success,
                    format!(
                        "The {} operation (ID: {}) has completed. You can now ask for the results.",
                        tool_name, invocation_id
                    ),
                )
            }
            Ok(Err(e)) => {
                error!(tool = %tool_name, invocation_id = %invocation_id, "Background task failed: {}", e);
                (ToolStatus::Error, background_error(&tool_name, &invocation_id, &e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(tool = %tool_name, invocation_id = %invocation_id, "Background task panicked: {}", reason);
                (ToolStatus::Error, background_error(&tool_name, &invocation_id, &reason))
            }
        };

        if let Some(elapsed) = self.tasks.release(&reservation) {
            debug!(invocation_id = %invocation_id, elapsed_ms = elapsed.as_millis() as u64, "Background task released");
        }

        self.push_outbound(events::tool_completion(
            &tool_name,
            &invocation_id,
            status.as_str(),
            &message,
        ));
        info!(tool = %tool_name, invocation_id = %invocation_id, "Queued tool completion notification");
    }

    pub fn is_background_task_active(&self, invocation_id: &str) -> bool {
        self.tasks.is_active(invocation_id)
    }

    pub fn background_task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn cancel_background_task(&self, invocation_id: &str) -> bool {
        self.tasks.cancel(invocation_id)
    }

    pub fn has_cached_result(&self, tool_name: &str) -> bool {
        self.results.contains(tool_name)
    }

    // -------------------------------------------------------------------------
    // External data
    // -------------------------------------------------------------------------

    pub fn external_data_timeout(&self) -> Duration {
        self.settings.external_data_timeout
    }

    /// Register a wait for client-supplied data under `operation_id`.
    pub fn register_external_data(&self, operation_id: impl Into<String>) -> PendingExternalData {
        self.rendezvous.register(operation_id)
    }

    /// Deliver client-supplied data. Returns `false` if nothing was waiting for it.
    pub fn deliver_external_data(&self, operation_id: &str, data: ExternalData) -> bool {
        self.rendezvous.deliver(operation_id, data)
    }

    pub fn pending_external_data(&self) -> usize {
        self.rendezvous.len()
    }
}

fn background_error(tool_name: &str, invocation_id: &str, reason: &dyn std::fmt::Display) -> String {
    format!(
        "An error occurred in the background while processing {} (ID: {}): {}",
        tool_name, invocation_id, reason
    )
}

/// Await a tool handler, turning errors and panics into the uniform error outcome.
pub(crate) async fn guard_handler<Fut>(tool_name: &str, handler: Fut) -> ToolOutcome
where
    Fut: Future<Output = ToolResult<ToolOutcome>>,
{
    let failure = || {
        ToolOutcome::error(format!(
            "An unexpected error occurred while executing tool {}.",
            tool_name
        ))
    };

    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(tool = tool_name, "Error executing tool: {}", e);
            failure()
        }
        Err(panic) => {
            error!(tool = tool_name, "Tool handler panicked: {}", panic_message(panic.as_ref()));
            failure()
        }
    }
}
