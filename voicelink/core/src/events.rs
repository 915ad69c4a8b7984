//! Session Events
//!
//! What the session reports to its host through the event callback, and the
//! per-request outcome it tracks.
//!
//! # Design Philosophy
//!
//! The host is a renderer. It shows text as it arrives and reacts to the
//! end of a response; it never sees audio bookkeeping.

use std::time::Duration;

use crate::messages::ChunkMetrics;

/// Events delivered to the host
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Text for a chunk whose audio is about to play
    ///
    /// Delivered as soon as the chunk arrives, before its audio is decoded.
    PartialText {
        /// Source text of the chunk
        text: String,
        /// Delivery metrics, if the remote side sent any
        metrics: Option<ChunkMetrics>,
    },

    /// Synthesis unavailable; present the text without audio
    TextOnly {
        /// Response text
        text: String,
        /// Why synthesis was unavailable
        error: Option<String>,
    },

    /// The response finished and every chunk has played
    Complete {
        /// Concatenated response text
        full_text: String,
        /// Generation time reported by the remote side
        duration: Duration,
    },

    /// A message kind this client does not interpret
    Passthrough {
        /// The `type` discriminant as received
        kind: String,
        /// The whole message
        payload: serde_json::Value,
    },
}

/// How the current request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// All chunks delivered and played
    Completed,
    /// Superseded or explicitly stopped
    Interrupted,
    /// The remote side or the connection failed
    Failed(String),
    /// Synthesis unavailable; text was presented instead
    TextOnly,
}

impl StreamOutcome {
    /// Whether the request failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
