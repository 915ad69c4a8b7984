//! Chunk Payload Decoding
//!
//! Turns a base64 chunk payload into a typed, tracked [`AudioResource`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use super::resource::{AudioResource, ResourceTracker};

/// Per-chunk decode failures
///
/// These are never fatal to a stream: the chunk is skipped and the rest of
/// the response keeps playing.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload is not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload decoded to zero bytes
    #[error("empty audio payload")]
    Empty,

    /// Media type is not audio
    #[error("unsupported media type: {0}")]
    UnsupportedMime(String),

    /// The decode task died before producing a result
    #[error("decode task failed: {0}")]
    Task(String),
}

/// Converts transported payloads into playable resources
///
/// Implementations run on the blocking pool, so they may do CPU-heavy work
/// (container parsing, resampling) without stalling message handling.
pub trait MediaDecoder: Send + Sync {
    /// Decode one base64 payload of type `mime_type`
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the payload cannot become playable audio.
    fn decode(&self, payload: &str, mime_type: &str) -> Result<AudioResource, DecodeError>;
}

/// Encode raw audio bytes for transport
#[must_use]
pub fn encode_audio(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a transported payload to raw bytes
///
/// # Errors
///
/// Returns `DecodeError::Base64` for invalid input.
pub fn decode_audio(payload: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(payload.trim())?)
}

/// Default decoder: base64 → bytes, tagged with the chunk's media type
#[derive(Clone, Debug, Default)]
pub struct Base64Decoder {
    tracker: ResourceTracker,
}

impl Base64Decoder {
    /// Create a decoder registering resources with `tracker`
    #[must_use]
    pub fn new(tracker: ResourceTracker) -> Self {
        Self { tracker }
    }

    /// The tracker resources are registered with
    #[must_use]
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }
}

impl MediaDecoder for Base64Decoder {
    fn decode(&self, payload: &str, mime_type: &str) -> Result<AudioResource, DecodeError> {
        if !mime_type.starts_with("audio/") {
            return Err(DecodeError::UnsupportedMime(mime_type.to_string()));
        }

        let bytes = decode_audio(payload)?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(AudioResource::new(bytes, mime_type, &self.tracker))
    }
}
