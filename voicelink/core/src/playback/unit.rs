//! Playback Units

use std::fmt;

use crate::audio::AudioResource;

/// Arrival-ordered identifier of a playback unit
///
/// Assigned by the queue on enqueue; strictly increasing within a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit_{}", self.0)
    }
}

/// A renderable chunk: decoded audio plus its source text
#[derive(Debug)]
pub struct PlaybackUnit {
    id: UnitId,
    resource: AudioResource,
    text: String,
}

impl PlaybackUnit {
    pub(crate) fn new(id: UnitId, resource: AudioResource, text: String) -> Self {
        Self { id, resource, text }
    }

    /// Unit identifier
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Decoded audio
    #[must_use]
    pub fn resource(&self) -> &AudioResource {
        &self.resource
    }

    /// Source text aligned with this audio
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}
