//! Decoded Audio Resources
//!
//! Every decoded chunk becomes an [`AudioResource`]: the playable bytes plus
//! a guard registered with a [`ResourceTracker`]. Dropping the resource
//! releases it, so natural completion, hard stop, rejected playback and
//! discarded decodes all release through the same path.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle identifying one decoded resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u64);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res_{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerCounts {
    live: AtomicUsize,
    allocated: AtomicU64,
    released: AtomicU64,
}

/// Counts decoded resources created and released
///
/// Cloning shares the counters. A long-running session should show `live()`
/// returning to zero whenever the queue is idle.
#[derive(Clone, Debug, Default)]
pub struct ResourceTracker {
    counts: Arc<TrackerCounts>,
}

impl ResourceTracker {
    /// Create a tracker with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources currently held
    #[must_use]
    pub fn live(&self) -> usize {
        self.counts.live.load(Ordering::SeqCst)
    }

    /// Resources created over the tracker's lifetime
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.counts.allocated.load(Ordering::SeqCst)
    }

    /// Resources released over the tracker's lifetime
    #[must_use]
    pub fn released(&self) -> u64 {
        self.counts.released.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> ResourceGuard {
        let id = self.counts.allocated.fetch_add(1, Ordering::SeqCst);
        self.counts.live.fetch_add(1, Ordering::SeqCst);
        ResourceGuard {
            handle: ResourceHandle(id),
            counts: Arc::clone(&self.counts),
        }
    }
}

struct ResourceGuard {
    handle: ResourceHandle,
    counts: Arc<TrackerCounts>,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.counts.live.fetch_sub(1, Ordering::SeqCst);
        self.counts.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(handle = %self.handle, "Audio resource released");
    }
}

/// A decoded, playable audio payload
pub struct AudioResource {
    data: Vec<u8>,
    mime_type: String,
    guard: ResourceGuard,
}

impl AudioResource {
    /// Register decoded bytes with `tracker`
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, tracker: &ResourceTracker) -> Self {
        let guard = tracker.acquire();
        tracing::trace!(handle = %guard.handle, len = data.len(), "Audio resource acquired");
        Self {
            data,
            mime_type: mime_type.into(),
            guard,
        }
    }

    /// Handle of this resource
    #[must_use]
    pub fn handle(&self) -> ResourceHandle {
        self.guard.handle
    }

    /// Media type
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Decoded bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback time estimated from size at a constant bitrate
    #[must_use]
    pub fn estimated_duration(&self, bitrate_bps: u32) -> Duration {
        if bitrate_bps == 0 {
            return Duration::ZERO;
        }
        let bits = self.data.len() as u64 * 8;
        Duration::from_micros(bits * 1_000_000 / u64::from(bitrate_bps))
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("handle", &self.guard.handle)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}
