//! WebSocket Transport
//!
//! Serves one compose connection over a WebSocket at [`COMPOSE_PATH`]. Each
//! text frame carries one JSON [`ClientMessage`]; each outbound
//! [`ServerMessage`] becomes one text frame.
//!
//! # Tasks per connection
//!
//! ```text
//!   socket ──▶ reader loop ──inbound──▶ Conductor::run ──▶ sink
//!                                                          │
//!   socket ◀──────────────── writer task ◀──outbound───────┘
//! ```
//!
//! The reader answers unreadable frames itself and never forwards them. When
//! the socket closes (or the server shuts down) the inbound channel is
//! dropped, the conductor cancels and joins its execution, and the writer
//! drains whatever is left before closing.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{EventSink, TransportError};
use crate::backend::BackendRegistry;
use crate::conductor::{Conductor, ConductorConfig};
use crate::messages::{ClientMessage, ServerMessage};

/// Path the compose endpoint is served on
pub const COMPOSE_PATH: &str = "/ws/compose";

/// Reply text for a frame that is not a valid message
pub const INVALID_MESSAGE: &str = "Invalid message.";

/// Reply text for a frame over the size limit
pub const MESSAGE_TOO_LARGE: &str = "Message too large.";

/// Shared, read-only state handed to every connection
#[derive(Clone)]
pub struct ConnectionContext {
    /// Settings for the connection's conductor
    pub conductor: ConductorConfig,
    /// Providers available to compose requests
    pub backends: Arc<BackendRegistry>,
    /// Largest accepted inbound frame, in bytes
    pub max_message_size: usize,
    /// Capacity of the inbound and outbound channels
    pub channel_capacity: usize,
}

impl ConnectionContext {
    /// Context with default channel capacity
    #[must_use]
    pub fn new(conductor: ConductorConfig, backends: Arc<BackendRegistry>, max_message_size: usize) -> Self {
        Self {
            conductor,
            backends,
            max_message_size,
            channel_capacity: 256,
        }
    }
}

/// Why an inbound frame was not forwarded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Larger than the configured limit
    TooLarge,
    /// Not a JSON client message
    Invalid,
}

impl FrameError {
    /// Message sent back to the client
    #[must_use]
    pub fn reply(self) -> ServerMessage {
        let message = match self {
            Self::TooLarge => MESSAGE_TOO_LARGE,
            Self::Invalid => INVALID_MESSAGE,
        };
        ServerMessage::Error {
            id: None,
            message: message.to_string(),
        }
    }
}

/// Decode one text frame
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] before attempting to parse an oversized
/// frame, and [`FrameError::Invalid`] for anything that is not a client message.
pub fn decode_frame(text: &str, max_message_size: usize) -> Result<ClientMessage, FrameError> {
    if text.len() > max_message_size {
        return Err(FrameError::TooLarge);
    }
    serde_json::from_str(text).map_err(|_| FrameError::Invalid)
}

/// Handshake callback: only the compose path is upgraded
#[allow(clippy::result_large_err)]
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == COMPOSE_PATH {
        return Ok(response);
    }
    tracing::debug!(path = %request.uri().path(), "Rejecting upgrade for unknown path");
    let mut error = ErrorResponse::new(Some("Not Found".to_string()));
    *error.status_mut() = StatusCode::NOT_FOUND;
    Err(error)
}

/// Serve one accepted TCP stream until the peer leaves or `shutdown` fires
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] if the WebSocket handshake fails.
/// Failures after the handshake end the connection and are only logged.
pub async fn serve_connection(
    stream: TcpStream,
    ctx: ConnectionContext,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .map_err(|e| TransportError::Protocol(e.to_string()))?;
    tracing::info!("WebSocket session opened");

    let (mut write, mut read) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(ctx.channel_capacity);
    let (in_tx, in_rx) = mpsc::channel::<ClientMessage>(ctx.channel_capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode message");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(text)).await {
                tracing::debug!(error = %e, "Write failed");
                break;
            }
        }
        let _ = write.close().await;
    });

    let sink: Arc<dyn EventSink> = Arc::new(out_tx.clone());
    let conductor = Conductor::new(ctx.conductor, ctx.backends, sink);
    let conductor_task = tokio::spawn(conductor.run(in_rx));

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => {
                tracing::debug!("Server shutting down, closing session");
                break;
            }
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match decode_frame(&text, ctx.max_message_size) {
                Ok(message) => {
                    if in_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(reason = ?err, len = text.len(), "Rejected frame");
                    if out_tx.send(err.reply()).await.is_err() {
                        break;
                    }
                }
            },
            Some(Ok(Message::Binary(data))) => {
                let err = if data.len() > ctx.max_message_size {
                    FrameError::TooLarge
                } else {
                    FrameError::Invalid
                };
                if out_tx.send(err.reply()).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Control frames are answered by the protocol layer
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Read failed");
                break;
            }
        }
    }

    // Closing inbound stops the conductor, which cancels and joins first
    drop(in_tx);
    match conductor_task.await {
        Ok(session) => tracing::debug!(notes = session.notes().len(), "Conductor stopped"),
        Err(e) => tracing::error!(error = %e, "Conductor task failed"),
    }

    drop(out_tx);
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "Writer task failed");
    }

    tracing::info!("WebSocket session closed");
    Ok(())
}
