//! Session Errors

use thiserror::Error;

use crate::audio::{DecodeError, PlaybackError};
use crate::transport::TransportError;

/// Errors reported by a [`Session`](crate::Session)
///
/// Connection and transport failures end the session. Chunk decode,
/// playback and remote errors are reported and absorbed; the stream goes on.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Could not establish the session
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection dropped; the session is closed
    #[error("connection closed: {0}")]
    TransportClosed(String),

    /// Operation needs an open session
    #[error("session is not connected")]
    NotConnected,

    /// `connect` called while a session is open or opening
    #[error("session is already connected")]
    AlreadyConnected,

    /// One chunk could not be decoded; it was skipped
    #[error("chunk {sequence} skipped: {source}")]
    ChunkDecode {
        /// Position of the chunk in arrival order
        sequence: u64,
        /// Underlying failure
        #[source]
        source: DecodeError,
    },

    /// The audio output refused a unit; it was skipped
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// The remote side reported an error
    #[error("remote error: {0}")]
    Remote(String),

    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Whether this error ended the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::TransportClosed(_))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
