//! Wire Messages
//!
//! JSON messages exchanged with the remote synthesis service. Every message
//! carries a `type` discriminant; field names on the wire are camelCase.
//!
//! # Client → Server
//!
//! - `chat`: request a synthesized response
//! - `interrupt`: cancel the current response
//! - `config`: update server-side synthesis parameters
//!
//! # Server → Client
//!
//! - `connected`: session ready, carries the assigned client id
//! - `audio_chunk`: one playable unit (base64 audio + aligned text)
//! - `text_fallback`: synthesis unavailable, text only
//! - `stream_complete`: full text and elapsed duration
//! - `interrupt_confirmed`: advisory acknowledgement
//! - `error`: remote failure detail
//!
//! Discriminants this client does not know decode to
//! [`ServerMessage::Unknown`] so newer servers degrade gracefully.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to this client by the remote side on connect
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One conversational turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    /// Request text
    pub text: String,
    /// Target persona
    pub persona_id: String,
    /// Optional voice selector
    pub voice_id: Option<String>,
}

impl StreamRequest {
    /// Create a new request
    pub fn new(text: impl Into<String>, persona_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            persona_id: persona_id.into(),
            voice_id: None,
        }
    }

    /// Select a specific voice
    #[must_use]
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Build the `chat` wire message for this request
    #[must_use]
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::Chat {
            message: self.text.clone(),
            persona_id: self.persona_id.clone(),
            voice_id: self.voice_id.clone(),
        }
    }
}

/// Server-side synthesis parameters sent with a `config` message
///
/// Known keys are typed; anything else is passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisConfig {
    /// Default voice for subsequent requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Speaking rate multiplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Additional backend-specific parameters
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Messages from this client to the synthesis service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a synthesized response
    Chat {
        /// Request text
        message: String,
        /// Target persona
        #[serde(rename = "personaId")]
        persona_id: String,
        /// Optional voice selector (sent as `null` when absent)
        #[serde(rename = "voiceId")]
        voice_id: Option<String>,
    },

    /// Cancel the current response
    Interrupt,

    /// Update synthesis parameters for the session
    Config {
        /// New parameters
        config: SynthesisConfig,
    },
}

impl ClientMessage {
    /// Wire discriminant of this message
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Interrupt => "interrupt",
            Self::Config { .. } => "config",
        }
    }
}

/// Delivery metrics attached to a chunk
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetrics {
    /// Time to first audio in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfa: Option<f64>,
}

/// Messages from the synthesis service to this client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session ready
    Connected {
        /// Identity assigned by the remote side
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },

    /// One playable unit of synthesized audio
    AudioChunk {
        /// Base64-encoded audio payload
        audio: String,
        /// Source text aligned with this audio
        #[serde(default)]
        text: String,
        /// Media type of the payload (client default when absent)
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Optional delivery metrics
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<ChunkMetrics>,
    },

    /// Synthesis failed upstream; present the text only
    TextFallback {
        /// Response text
        text: String,
        /// Why synthesis was unavailable
        #[serde(default)]
        error: Option<String>,
    },

    /// All chunks for the current request have been sent
    StreamComplete {
        /// Concatenated response text
        #[serde(rename = "fullText", default)]
        full_text: String,
        /// Elapsed generation time in milliseconds
        #[serde(default)]
        duration: u64,
    },

    /// Acknowledgement of an `interrupt`
    InterruptConfirmed,

    /// Remote failure
    Error {
        /// Error detail
        error: String,
    },

    /// A message kind this client does not understand
    #[serde(skip)]
    Unknown {
        /// The `type` discriminant as received
        kind: String,
        /// The whole message
        payload: serde_json::Value,
    },
}

impl ServerMessage {
    /// Discriminants this client understands
    pub const KNOWN_KINDS: [&'static str; 6] = [
        "connected",
        "audio_chunk",
        "text_fallback",
        "stream_complete",
        "interrupt_confirmed",
        "error",
    ];

    /// Whether `kind` is a discriminant this client understands
    #[must_use]
    pub fn is_known_kind(kind: &str) -> bool {
        Self::KNOWN_KINDS.contains(&kind)
    }

    /// Wire discriminant of this message
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::TextFallback { .. } => "text_fallback",
            Self::StreamComplete { .. } => "stream_complete",
            Self::InterruptConfirmed => "interrupt_confirmed",
            Self::Error { .. } => "error",
            Self::Unknown { kind, .. } => kind,
        }
    }
}
