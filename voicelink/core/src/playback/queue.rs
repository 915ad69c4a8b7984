//! Playback Queue Implementation
//!
//! Strictly sequential renderer: one active unit at most, the rest waiting in
//! arrival order.
//!
//! # State Machine
//!
//! ```text
//!            enqueue (idle)
//!   ┌──────┐ ───────────────► ┌─────────┐
//!   │ Idle │                  │ Playing │ ◄─┐ finished (backlog non-empty)
//!   └──────┘ ◄─────────────── └─────────┘ ──┘
//!        finished (backlog empty) / hard_stop
//! ```
//!
//! A unit the output refuses is dropped on its own. The next unit is not
//! offered in the same call: the queue posts a resume report to itself so
//! the offer happens on a later wake, after the output had a chance to
//! settle.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::audio::{AudioOutput, AudioResource, FinishedSignal, PlaybackError};

use super::unit::{PlaybackUnit, UnitId};

/// Queue state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing active, backlog empty
    Idle,
    /// One unit rendering, or the backlog waiting to resume after a
    /// rejection
    Playing,
}

/// Lifetime counters for a queue
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Units accepted by `enqueue`
    pub enqueued: u64,
    /// Units that finished naturally
    pub played: u64,
    /// Units the output refused to start
    pub rejected: u64,
    /// Units discarded by `hard_stop` (active included)
    pub discarded: u64,
    /// Completion reports for units no longer active
    pub stale_finishes: u64,
}

/// Ordered, strictly sequential audio renderer
///
/// Owns every queued [`PlaybackUnit`] and therefore every decoded resource
/// from enqueue until natural completion, rejection or `hard_stop`.
pub struct PlaybackQueue {
    /// Platform output
    output: Box<dyn AudioOutput>,
    /// Unit currently sounding
    active: Option<PlaybackUnit>,
    /// Units waiting, arrival order
    backlog: VecDeque<PlaybackUnit>,
    /// Handed to the output with each unit
    finished_tx: mpsc::UnboundedSender<UnitId>,
    /// Completion reports from the output
    finished_rx: mpsc::UnboundedReceiver<UnitId>,
    /// Next identifier to assign
    next_id: u64,
    /// Rejections not yet collected by the owner
    rejections: Vec<PlaybackError>,
    /// Rejected unit whose report resumes the backlog
    resume_after: Option<UnitId>,
    /// Counters
    stats: QueueStats,
}

impl PlaybackQueue {
    /// Create an idle queue rendering through `output`
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            output,
            active: None,
            backlog: VecDeque::new(),
            finished_tx,
            finished_rx,
            next_id: 0,
            rejections: Vec::new(),
            resume_after: None,
            stats: QueueStats::default(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> QueueState {
        if self.is_idle() {
            QueueState::Idle
        } else {
            QueueState::Playing
        }
    }

    /// Whether nothing is active and the backlog is empty
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.backlog.is_empty()
    }

    /// Unit currently sounding
    #[must_use]
    pub fn active(&self) -> Option<&PlaybackUnit> {
        self.active.as_ref()
    }

    /// Number of units waiting behind the active one
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Lifetime counters
    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Append a decoded chunk; starts it at once when idle
    ///
    /// Returns the identifier assigned to the unit.
    pub fn enqueue(&mut self, resource: AudioResource, text: String) -> UnitId {
        let id = UnitId(self.next_id);
        self.next_id += 1;
        self.stats.enqueued += 1;

        tracing::trace!(unit = %id, handle = %resource.handle(), "Enqueued");
        self.backlog.push_back(PlaybackUnit::new(id, resource, text));

        if self.active.is_none() && self.resume_after.is_none() {
            self.start_next();
        }
        id
    }

    /// Handle a completion report from the output
    ///
    /// Reports for anything other than the active unit (e.g. a unit that was
    /// hard-stopped while its report was in flight) are ignored. Returns
    /// whether the report advanced the queue.
    pub fn on_active_finished(&mut self, unit: UnitId) -> bool {
        if self.active.is_none() && self.resume_after == Some(unit) {
            self.resume_after = None;
            tracing::debug!(rejected = %unit, backlog = self.backlog.len(), "Resuming after rejection");
            self.start_next();
            return true;
        }

        match self.active.as_ref() {
            Some(active) if active.id() == unit => {}
            _ => {
                self.stats.stale_finishes += 1;
                tracing::trace!(%unit, "Ignoring stale completion");
                return false;
            }
        }

        // Releases the resource
        self.active = None;
        self.stats.played += 1;
        tracing::debug!(%unit, backlog = self.backlog.len(), "Unit finished");

        self.start_next();
        true
    }

    /// Halt the active unit and discard the backlog
    ///
    /// Does not wait for natural completion. Every discarded unit's resource
    /// is released before this returns, and the queue is left `Idle`.
    /// Returns the number of units discarded.
    pub fn hard_stop(&mut self) -> usize {
        let mut discarded = 0;

        if let Some(active) = self.active.take() {
            self.output.stop(active.id());
            tracing::debug!(unit = %active.id(), "Active unit stopped");
            discarded += 1;
        }

        discarded += self.backlog.len();
        self.backlog.clear();
        self.resume_after = None;

        self.stats.discarded += discarded as u64;
        discarded
    }

    /// Take the playback rejections recorded since the last call
    pub fn take_rejections(&mut self) -> Vec<PlaybackError> {
        std::mem::take(&mut self.rejections)
    }

    /// Wait for the next completion report
    ///
    /// Cancel-safe. Never resolves to `None` while the queue exists.
    pub async fn next_finished(&mut self) -> Option<UnitId> {
        self.finished_rx.recv().await
    }

    /// Take a pending completion report without waiting
    pub fn try_next_finished(&mut self) -> Option<UnitId> {
        self.finished_rx.try_recv().ok()
    }

    /// Offer the backlog head to the output
    fn start_next(&mut self) {
        let Some(unit) = self.backlog.pop_front() else {
            return;
        };

        let id = unit.id();
        let signal = FinishedSignal::new(id, self.finished_tx.clone());
        match self.output.play(&unit, signal) {
            Ok(()) => {
                tracing::debug!(unit = %id, len = unit.resource().len(), "Playing");
                self.active = Some(unit);
            }
            Err(e) => {
                // Dropping the unit releases its resource
                tracing::warn!(unit = %id, error = %e, "Playback rejected; skipping unit");
                self.stats.rejected += 1;
                self.rejections.push(e);

                if !self.backlog.is_empty() {
                    self.resume_after = Some(id);
                    let _ = self.finished_tx.send(id);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
