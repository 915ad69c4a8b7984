//! voicelink Core - Interruptible Audio-Response Streaming Client
//!
//! This crate receives a synthesized-speech response as a sequence of audio
//! chunks over a persistent connection, plays them back in strict arrival
//! order, and can abort playback and in-flight delivery the moment a new
//! request supersedes the current one (barge-in).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Host                                │
//! │        (CLI, desktop shell, embedded assistant, tests)           │
//! └───────────────┬───────────────────────────────▲──────────────────┘
//!                 │ send_request / interrupt      │ SessionEvent
//!                 │ step / poll                   │ SessionError
//! ┌───────────────▼───────────────────────────────┴──────────────────┐
//! │                           Session                                │
//! │  ┌─────────────┐   ┌───────────────┐   ┌──────────────────────┐  │
//! │  │  Interrupt  │──►│ PlaybackQueue │◄──│    StreamHandler     │  │
//! │  │ Coordinator │   │ (AudioOutput) │   │  (DecodePipeline)    │  │
//! │  └──────┬──────┘   └───────────────┘   └──────────▲───────────┘  │
//! │         │ {"type":"interrupt"}                    │ ServerMessage│
//! │  ┌──────▼─────────────────────────────────────────┴───────────┐  │
//! │  │                    SynthesisTransport                       │  │
//! │  │              (WebSocket / in-process channels)              │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Session`]: the façade a host holds
//! - [`SessionEvent`]: text, completion and passthrough events for the host
//! - [`PlaybackQueue`]: ordered, strictly sequential renderer
//! - [`AudioOutput`]: platform audio primitive (implemented by the host)
//! - [`MediaDecoder`]: chunk payload → playable [`AudioResource`]
//! - [`SynthesisTransport`]: the connection to the synthesis service
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voicelink_core::{Base64Decoder, ClientConfig, ClockedOutput, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), voicelink_core::SessionError> {
//!     let config = ClientConfig::from_env();
//!     let output = ClockedOutput::new(config.playback_bitrate_bps);
//!     let mut session = Session::new(config, Box::new(output), Arc::new(Base64Decoder::default()));
//!
//!     session.on_event(|event| println!("{event:?}"));
//!     session.connect("ws://localhost:3001").await?;
//!     session.send_request("Tell me a story", "yuki", None).await?;
//!
//!     while session.is_busy() && session.step().await {}
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: connection trait, wire codec, WebSocket and in-process
//! - [`messages`]: wire messages
//! - [`audio`]: decoded resources, decoders, outputs
//! - [`playback`]: the playback queue
//! - [`protocol`]: inbound message handling and ordered decoding
//! - [`interrupt`]: barge-in coordination
//! - [`session`]: the façade
//! - [`config`]: layered client configuration
//!
//! # No Device Dependencies
//!
//! This crate has **zero** dependencies on audio device or UI libraries.
//! Playback goes through the [`AudioOutput`] trait.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod interrupt;
pub mod messages;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use audio::{
    AudioOutput, AudioResource, Base64Decoder, ClockedOutput, DecodeError, FinishedSignal,
    MediaDecoder, NullOutput, OutputEvent, PlaybackError, RecordingOutput, ResourceHandle,
    ResourceTracker,
};
pub use error::{SessionError, SessionResult};
pub use events::{SessionEvent, StreamOutcome};
pub use interrupt::{InterruptCoordinator, InterruptReport, InterruptSignal};
pub use messages::{
    ChunkMetrics, ClientId, ClientMessage, ServerMessage, StreamRequest, SynthesisConfig,
};
pub use playback::{PlaybackQueue, PlaybackUnit, QueueState, QueueStats, UnitId};
pub use protocol::{Dispatch, HandlerStats, StreamHandler};
pub use session::{Session, SessionState};
pub use transport::{
    create_transport, InProcessTransport, SynthesisTransport, TransportConfig, TransportError,
};

#[cfg(feature = "websocket")]
pub use transport::WebSocketTransport;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
