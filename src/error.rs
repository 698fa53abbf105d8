//! # error
//!
//! Typed failures of the broker link. These never reach handlers: the run
//! loop logs them and falls back to reconnection with backoff.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket connect/read/write failure.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound writer task is gone.
    #[error("outbound channel closed")]
    ChannelClosed,
}
