//! Session WebSocket handler
//!
//! One WebSocket connection drives one [`SessionStreamManager`]. Inbound text
//! frames are routed to the manager; a forwarder task drains the manager's
//! outbound queue back to the client until the end-of-stream marker.

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::select;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::session::{AudioChunk, SessionError, SessionStreamManager, events};
use crate::core::upstream::UpstreamError;
use crate::state::AppState;

use super::messages::{ClientMessage, audio_content_start_name, prompt_start_name};

/// Maximum WebSocket frame size (10 MB). Screenshots arrive as data URLs.
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long the forwarder may keep draining after teardown
const FORWARDER_GRACE: Duration = Duration::from_secs(2);

/// Session WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and bridges it to a new model
/// stream session.
pub async fn session_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Session WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_session_socket(socket, state))
}

async fn handle_session_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Session WebSocket connection established");

    let session = app_state.new_session();
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = send_json(&mut sender, &events::connection_status()).await {
        warn!("Client went away before connection status: {}", e);
        session.shutdown().await;
        return;
    }

    if let Err(e) = session.initialize_stream().await {
        error!("Upstream stream initialization failed: {}", e);
        let reason = initialization_failure_reason(&e);
        if let Err(send_err) =
            send_json(&mut sender, &events::initialization_error(&reason)).await
        {
            info!("Client connection closed before init error could be sent: {}", send_err);
        }
        let frame = CloseFrame {
            code: close_code::ERROR,
            reason: "Bedrock initialization failed".into(),
        };
        send_close(&mut sender, Some(frame)).await;
        session.shutdown().await;
        return;
    }

    let Some(mut outbound) = session.take_outbound() else {
        error!("Outbound queue already taken");
        session.shutdown().await;
        return;
    };

    let mut forwarder = tokio::spawn(async move {
        debug!("Forwarder started");
        while let Some(Some(message)) = outbound.recv().await {
            debug!(message_type = %describe_outbound(&message), "Forwarding message to client");
            if let Err(e) = send_json(&mut sender, &message).await {
                warn!("Client connection closed while forwarding: {}", e);
                return;
            }
        }
        debug!("End of outbound stream, closing client connection");
        send_close(&mut sender, None).await;
    });
    let mut forwarder_done = false;

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_client_frame(msg, &session) {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Session WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("Session WebSocket connection closed by client");
                        break;
                    }
                }
            }
            _ = &mut forwarder, if !forwarder_done => {
                forwarder_done = true;
                debug!("Forwarder finished, ending session");
                break;
            }
        }
    }

    // Cleanup
    session.shutdown().await;
    if !forwarder_done && tokio::time::timeout(FORWARDER_GRACE, &mut forwarder).await.is_err() {
        warn!("Forwarder did not finish in time, aborting");
        forwarder.abort();
    }

    info!("Session WebSocket connection terminated");
}

/// Process one inbound frame. Returns false when the connection should end.
fn process_client_frame(msg: Message, session: &SessionStreamManager) -> bool {
    match msg {
        Message::Text(text) => {
            route_client_text(session, text.as_str());
            true
        }
        Message::Binary(data) => {
            debug!("Ignoring binary frame: {} bytes", data.len());
            true
        }
        Message::Ping(_) => {
            debug!("Received ping");
            true
        }
        Message::Pong(_) => {
            debug!("Received pong");
            true
        }
        Message::Close(_) => {
            info!("Session WebSocket close received");
            false
        }
    }
}

/// Route one client text frame to the session.
///
/// Screenshot replies are delivered to the waiting tool, `audioInput` goes to
/// the audio queue and every other event is forwarded upstream unchanged.
/// `promptStart` and audio `contentStart` also record the names later used to
/// address tool results and audio chunks.
pub fn route_client_text(session: &SessionStreamManager, text: &str) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            error!("Invalid JSON received from WebSocket: {}", e);
            return;
        }
    };

    match message {
        ClientMessage::ScreenshotData(payload) => {
            let Some(analysis_id) = payload.image_analysis_id.clone() else {
                error!("Missing imageAnalysisId in capturedScreenshotData");
                return;
            };
            info!(analysis_id = %analysis_id, "Screenshot data received from client");
            if !session.deliver_external_data(&analysis_id, payload.to_external_data()) {
                warn!(analysis_id = %analysis_id, "No tool is waiting for this screenshot");
            }
        }
        ClientMessage::Event {
            event_type,
            message,
        } => match event_type.as_str() {
            "audioInput" => {
                let body = events::event_body(&message, "audioInput").unwrap_or(&Value::Null);
                session.add_audio_chunk(AudioChunk::from_audio_input(body));
            }
            _ => {
                if let Some(prompt_name) = prompt_start_name(&message) {
                    session.set_prompt_name(prompt_name);
                } else if let Some(content_name) = audio_content_start_name(&message) {
                    session.set_audio_content_name(content_name);
                }
                session.send_event(&message);
            }
        },
        ClientMessage::Unrecognized => debug!("Ignoring unrecognized client message"),
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &Value,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(message.to_string().into())).await
}

/// Send a close frame. Returns false when the client is already gone.
async fn send_close<S>(sender: &mut S, frame: Option<CloseFrame>) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match sender.send(Message::Close(frame)).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Failed to send close frame: {}", e);
            false
        }
    }
}

fn initialization_failure_reason(error: &SessionError) -> String {
    match error {
        SessionError::Connection(UpstreamError::ConnectionFailed(message))
        | SessionError::Connection(UpstreamError::Timeout(message)) => message.clone(),
        other => other.to_string(),
    }
}

/// Short label for forwarder logs. Never includes audio or transcript content.
fn describe_outbound(message: &Value) -> String {
    if let Some(custom) = message.get("customEvent").and_then(Value::as_str) {
        return format!("custom:{custom}");
    }
    match events::event_type(message) {
        Some(event_type) => format!("event:{event_type}"),
        None => "unknown".to_string(),
    }
}
