//! Transport Layer
//!
//! The conductor and its executions push [`ServerMessage`]s into an
//! [`EventSink`] and never learn what carries them. The WebSocket server
//! (feature `websocket`) is the production carrier; tests use a plain
//! channel.
//!
//! A write to a peer that has gone away fails with
//! [`TransportError::PeerGone`]. Callers treat that as "client gone" and keep
//! going; it never tears down the control loop by itself.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::ServerMessage;

#[cfg(feature = "websocket")]
pub mod websocket;

/// Errors that can occur while delivering messages
#[derive(Debug, Error)]
pub enum TransportError {
    /// The receiving side is closed
    #[error("peer is gone")]
    PeerGone,

    /// Message could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The carrier protocol failed
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Destination for outbound messages of one connection
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one message, in order with every earlier one
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl EventSink for mpsc::Sender<ServerMessage> {
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| TransportError::PeerGone)
    }
}
