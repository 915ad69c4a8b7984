//! Audio Output
//!
//! The platform audio primitive the playback queue drives: start a unit,
//! stop a unit, and report natural completion through a [`FinishedSignal`].
//!
//! Completion is always delivered through the signal's channel, never by
//! calling back into the queue, so an output that finishes synchronously
//! inside `play` cannot re-enter the scheduler.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::playback::{PlaybackUnit, UnitId};

/// Audio output failures
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The output refused to start this unit
    #[error("audio output rejected {unit}: {reason}")]
    Rejected {
        /// Unit that was refused
        unit: UnitId,
        /// Why
        reason: String,
    },

    /// No usable output device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// One-shot notification that a unit finished playing naturally
#[derive(Debug)]
pub struct FinishedSignal {
    unit: UnitId,
    tx: mpsc::UnboundedSender<UnitId>,
}

impl FinishedSignal {
    pub(crate) fn new(unit: UnitId, tx: mpsc::UnboundedSender<UnitId>) -> Self {
        Self { unit, tx }
    }

    /// Unit this signal belongs to
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Report natural completion
    ///
    /// Reports for a unit that has since been stopped are ignored by the
    /// queue.
    pub fn notify(self) {
        if self.tx.send(self.unit).is_err() {
            tracing::trace!(unit = %self.unit, "Playback queue gone; completion dropped");
        }
    }
}

/// Platform audio-output primitive
pub trait AudioOutput: Send {
    /// Start rendering `unit`
    ///
    /// The output must call [`FinishedSignal::notify`] once the unit
    /// completes naturally, and must not call it after [`AudioOutput::stop`]
    /// for the same unit (late reports are tolerated but wasted).
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the unit cannot be started. The queue
    /// drops that unit and offers the next one on a later wake.
    fn play(&mut self, unit: &PlaybackUnit, finished: FinishedSignal) -> Result<(), PlaybackError>;

    /// Halt `unit` immediately without waiting for completion
    fn stop(&mut self, unit: UnitId);
}

/// Output that finishes every unit immediately
///
/// Useful for text-only hosts that still want chunk bookkeeping.
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn play(&mut self, unit: &PlaybackUnit, finished: FinishedSignal) -> Result<(), PlaybackError> {
        tracing::trace!(unit = %unit.id(), "Null output: finishing immediately");
        finished.notify();
        Ok(())
    }

    fn stop(&mut self, _unit: UnitId) {}
}

/// Output that holds each unit for its estimated play time
///
/// The duration is estimated from payload size at a constant bitrate. Used
/// by headless hosts to pace a response realistically without a device.
/// Requires a tokio runtime.
#[derive(Debug)]
pub struct ClockedOutput {
    bitrate_bps: u32,
    min_duration: Duration,
    current: Option<(UnitId, JoinHandle<()>)>,
}

impl ClockedOutput {
    /// Create an output pacing at `bitrate_bps`
    #[must_use]
    pub fn new(bitrate_bps: u32) -> Self {
        Self {
            bitrate_bps,
            min_duration: Duration::from_millis(20),
            current: None,
        }
    }

    /// Lower bound for any unit's play time
    #[must_use]
    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }
}

impl AudioOutput for ClockedOutput {
    fn play(&mut self, unit: &PlaybackUnit, finished: FinishedSignal) -> Result<(), PlaybackError> {
        // The queue only starts a unit once the previous one reported
        // completion or was stopped; its timer task may still be unwinding.
        if let Some((previous, task)) = self.current.take() {
            if !task.is_finished() {
                tracing::trace!(%previous, "Clocked output: replacing unfinished timer");
            }
            task.abort();
        }

        let duration = unit
            .resource()
            .estimated_duration(self.bitrate_bps)
            .max(self.min_duration);
        tracing::debug!(unit = %unit.id(), ?duration, "Clocked output: playing");

        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            finished.notify();
        });
        self.current = Some((unit.id(), task));
        Ok(())
    }

    fn stop(&mut self, unit: UnitId) {
        if let Some((current, task)) = self.current.take() {
            if current == unit {
                task.abort();
                tracing::debug!(%unit, "Clocked output: stopped");
            } else {
                self.current = Some((current, task));
            }
        }
    }
}

/// What a [`RecordingOutput`] observed
#[derive(Debug)]
pub enum OutputEvent {
    /// A unit started
    Started {
        /// Unit identifier
        unit: UnitId,
        /// Source text of the unit
        text: String,
        /// Decoded payload size
        len: usize,
        /// Completion signal, handed over when the output does not
        /// auto-finish
        finished: Option<FinishedSignal>,
    },
    /// A unit was stopped
    Stopped {
        /// Unit identifier
        unit: UnitId,
    },
}

/// Output that reports its lifecycle on a channel
///
/// With auto-finish every unit completes immediately; otherwise the
/// observer receives each unit's [`FinishedSignal`] and decides when it
/// completes.
#[derive(Debug)]
pub struct RecordingOutput {
    auto_finish: bool,
    events: mpsc::UnboundedSender<OutputEvent>,
}

impl RecordingOutput {
    /// Create an output and the receiver observing it
    #[must_use]
    pub fn new(auto_finish: bool) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { auto_finish, events }, rx)
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&mut self, unit: &PlaybackUnit, finished: FinishedSignal) -> Result<(), PlaybackError> {
        let finished = if self.auto_finish {
            finished.notify();
            None
        } else {
            Some(finished)
        };

        let _ = self.events.send(OutputEvent::Started {
            unit: unit.id(),
            text: unit.text().to_string(),
            len: unit.resource().len(),
            finished,
        });
        Ok(())
    }

    fn stop(&mut self, unit: UnitId) {
        let _ = self.events.send(OutputEvent::Stopped { unit });
    }
}
