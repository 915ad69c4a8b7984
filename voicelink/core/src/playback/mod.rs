//! Playback
//!
//! Ordered, strictly sequential rendering of decoded chunks.

pub mod queue;
pub mod unit;

pub use queue::{PlaybackQueue, QueueState, QueueStats};
pub use unit::{PlaybackUnit, UnitId};
