//! Amazon Bedrock bidirectional stream connector.
//!
//! Each [`BedrockConnector::open`] call spawns a connection task that owns the
//! SDK client for the lifetime of the stream:
//!
//! ```text
//! UpstreamSender ──mpsc──► async_stream ──► InvokeModelWithBidirectionalStream
//!                                                    │
//! UpstreamReceiver ◄──mpsc── output chunk loop ◄─────┘
//! ```
//!
//! Dropping every sender ends the input stream, which lets Bedrock close the
//! session cleanly. Aborting the task tears the connection down immediately.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::types::{
    BidirectionalInputPayloadPart, InvokeModelWithBidirectionalStreamInput,
    InvokeModelWithBidirectionalStreamOutput,
};
use aws_smithy_types::Blob;
use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::config::BedrockStreamConfig;
use crate::core::upstream::base::{
    UpstreamConnector, UpstreamError, UpstreamReceiver, UpstreamResult, UpstreamSender,
    UpstreamStream,
};

/// Opens Nova Sonic style bidirectional streams on Amazon Bedrock.
#[derive(Debug, Clone)]
pub struct BedrockConnector {
    config: BedrockStreamConfig,
}

impl BedrockConnector {
    pub fn new(config: BedrockStreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BedrockStreamConfig {
        &self.config
    }
}

/// Decode one output chunk. Invalid UTF-8 is reported with its lossy text.
pub(super) fn decode_chunk(bytes: &[u8]) -> UpstreamResult<String> {
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!("Bedrock chunk is not valid UTF-8: {}", e);
            Err(UpstreamError::InvalidPayload(
                String::from_utf8_lossy(e.as_bytes()).into_owned(),
            ))
        }
    }
}

#[async_trait]
impl UpstreamConnector for BedrockConnector {
    async fn open(&self) -> UpstreamResult<UpstreamStream> {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        let (output_tx, output_rx) = mpsc::unbounded_channel::<UpstreamResult<String>>();
        let (connected_tx, connected_rx) = oneshot::channel::<UpstreamResult<()>>();

        let config = self.config.clone();
        info!(model_id = %config.model_id, region = %config.region, "Opening Bedrock stream");

        let connection_handle = tokio::spawn(async move {
            let sdk_config = config.load_sdk_config().await;
            let client = BedrockClient::new(&sdk_config);

            let input_stream = async_stream::stream! {
                while let Some(payload) = input_rx.recv().await {
                    let part = BidirectionalInputPayloadPart::builder()
                        .bytes(Blob::new(payload.into_bytes()))
                        .build();
                    yield Ok(InvokeModelWithBidirectionalStreamInput::Chunk(part));
                }
                debug!("Upstream input channel closed, ending Bedrock input stream");
            };

            let request = client
                .invoke_model_with_bidirectional_stream()
                .model_id(config.model_id.as_str())
                .body(input_stream.into());

            match request.send().await {
                Ok(mut output) => {
                    let _ = connected_tx.send(Ok(()));

                    loop {
                        match output.body.recv().await {
                            Ok(Some(InvokeModelWithBidirectionalStreamOutput::Chunk(part))) => {
                                let Some(bytes) = part.bytes() else {
                                    continue;
                                };
                                if output_tx.send(decode_chunk(bytes.as_ref())).is_err() {
                                    debug!("Upstream receiver dropped, stopping Bedrock output loop");
                                    break;
                                }
                            }
                            Ok(Some(other)) => {
                                debug!("Ignoring non-chunk Bedrock output: {:?}", other);
                            }
                            Ok(None) => {
                                info!("Bedrock stream ended");
                                break;
                            }
                            Err(e) => {
                                let message = DisplayErrorContext(&e).to_string();
                                error!("Bedrock stream error: {}", message);
                                let _ = output_tx.send(Err(UpstreamError::StreamError(message)));
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    let err = UpstreamError::ConnectionFailed(format!(
                        "Failed to start Bedrock stream: {}",
                        DisplayErrorContext(&e)
                    ));
                    error!("{}", err);
                    let _ = connected_tx.send(Err(err));
                }
            }

            info!("Bedrock connection closed");
        });

        match tokio::time::timeout(self.config.connect_timeout, connected_rx).await {
            Ok(Ok(Ok(()))) => {
                info!("Bedrock stream established");
                Ok(UpstreamStream::new(
                    UpstreamSender::new(input_tx),
                    UpstreamReceiver::new(output_rx),
                )
                .with_task(connection_handle))
            }
            Ok(Ok(Err(e))) => {
                connection_handle.abort();
                Err(e)
            }
            Ok(Err(_)) => {
                connection_handle.abort();
                Err(UpstreamError::ConnectionFailed(
                    "Connection channel closed unexpectedly".to_string(),
                ))
            }
            Err(_) => {
                connection_handle.abort();
                Err(UpstreamError::Timeout(format!(
                    "Bedrock stream not established within {}s",
                    self.config.connect_timeout.as_secs()
                )))
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "bedrock"
    }
}
