//! Transport Traits
//!
//! The contract every session transport implements, plus its error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Errors raised by a session transport
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The underlying channel could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// `send`/`recv` called before `connect` or after close
    #[error("transport not connected")]
    NotConnected,

    /// The remote side closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing to the channel failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Outbound message could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Inbound message could not be decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Inbound message exceeds the configured limit
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Received size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Operation not valid in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// One bidirectional message connection to the synthesis service
///
/// Inbound messages are yielded exactly once, in arrival order. A close is
/// terminal: `recv` reports [`TransportError::ConnectionClosed`] and the
/// transport stays disconnected. There is no retry or reconnect here.
#[async_trait]
pub trait SynthesisTransport: Send + Sync {
    /// Establish the underlying channel
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the channel
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Send one message
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    /// Wait for the next inbound message
    ///
    /// Cancel-safe: dropping the future never loses a message.
    async fn recv(&mut self) -> Result<ServerMessage, TransportError>;

    /// Take the next inbound message if one is ready
    ///
    /// Returns `Ok(None)` when nothing is pending.
    fn try_recv(&mut self) -> Result<Option<ServerMessage>, TransportError>;

    /// Whether the channel is currently open
    fn is_connected(&self) -> bool;
}
