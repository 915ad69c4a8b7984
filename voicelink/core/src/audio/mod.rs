//! Audio Resources and Output
//!
//! - [`resource`]: tracked decoded-audio handles, released on drop
//! - [`decoder`]: base64 chunk payload → playable resource
//! - [`output`]: the platform audio primitive and stock implementations

pub mod decoder;
pub mod output;
pub mod resource;

pub use decoder::{decode_audio, encode_audio, Base64Decoder, DecodeError, MediaDecoder};
pub use output::{
    AudioOutput, ClockedOutput, FinishedSignal, NullOutput, OutputEvent, PlaybackError,
    RecordingOutput,
};
pub use resource::{AudioResource, ResourceHandle, ResourceTracker};
