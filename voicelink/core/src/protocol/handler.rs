//! Stream Protocol Handler
//!
//! Classifies inbound messages, feeds chunk payloads through the decode
//! pipeline into the playback queue, and detects the end of a response.
//!
//! # Message Flow
//!
//! ```text
//! audio_chunk ──► PartialText event
//!      │
//!      └──► DecodePipeline ──► on_decoded ──► PlaybackQueue::enqueue
//!
//! stream_complete ──► pending ──► take_completion (pipeline empty, queue idle)
//!                                        │
//!                                        └──► Complete event
//! ```
//!
//! The handler never touches the transport and never decides outcomes; it
//! returns a [`Dispatch`] and the session acts on it.
//!
//! # Stale Gate
//!
//! Messages the service sent for a response before learning it was
//! cancelled may still arrive afterwards. When a response is cut off while
//! its stream is open, the handler closes a gate and drops everything
//! belonging to that stream: audio chunks and its `stream_complete`,
//! `text_fallback` or `error`. The gate opens again on the first of:
//!
//! - `interrupt_confirmed`
//! - the old stream's terminal message (dropped itself)
//! - the acknowledgement timeout, checked as messages arrive

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::audio::MediaDecoder;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::messages::{ClientId, ServerMessage};
use crate::playback::{PlaybackQueue, UnitId};

use super::decode::{DecodePipeline, DecodedChunk};

/// What the session should do with a handled message
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    /// The remote side confirmed the session
    Connected(ClientId),
    /// Deliver this event to the host
    Event(SessionEvent),
    /// Synthesis unavailable: outcome is text-only, deliver the event
    TextOnly(SessionEvent),
    /// The remote side reported a failure
    RemoteError(String),
    /// Nothing further to do
    Handled,
}

/// Handler counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// `audio_chunk` messages accepted for decoding
    pub chunks_received: u64,
    /// Chunks that reached the playback queue
    pub chunks_decoded: u64,
    /// Chunks skipped because they could not be decoded
    pub decode_failures: u64,
    /// Messages dropped because they belong to a cancelled response
    pub dropped_stale: u64,
    /// `text_fallback` messages
    pub fallbacks: u64,
}

/// Default bound on the stale gate
pub const DEFAULT_ACK_TIMEOUT: Duration =
    Duration::from_millis(crate::config::DEFAULT_INTERRUPT_ACK_TIMEOUT_MS);

/// A `stream_complete` waiting for playback to drain
#[derive(Debug)]
struct PendingCompletion {
    full_text: String,
    duration: Duration,
}

/// Stream protocol handler
#[derive(Debug)]
pub struct StreamHandler {
    pipeline: DecodePipeline,
    default_mime: String,
    pending: Option<PendingCompletion>,
    /// Gate messages of a cancelled response
    discard_until_ack: bool,
    /// Upper bound on how long the gate stays closed
    ack_timeout: Option<Duration>,
    /// A request was sent and its terminal message has not arrived
    stream_open: bool,
    /// When the gate closed
    gated_since: Option<Instant>,
    stats: HandlerStats,
}

impl StreamHandler {
    /// Create a handler decoding with `decoder`
    ///
    /// `default_mime` applies to chunks that carry no media type.
    pub fn new(decoder: Arc<dyn MediaDecoder>, default_mime: impl Into<String>) -> Self {
        Self {
            pipeline: DecodePipeline::new(decoder),
            default_mime: default_mime.into(),
            pending: None,
            discard_until_ack: true,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
            stream_open: false,
            gated_since: None,
            stats: HandlerStats::default(),
        }
    }

    /// Enable or disable the stale gate (on by default)
    #[must_use]
    pub fn with_discard_until_ack(mut self, enabled: bool) -> Self {
        self.discard_until_ack = enabled;
        self
    }

    /// Open the gate after `timeout` even without an acknowledgement
    ///
    /// `None` waits for `interrupt_confirmed` or the old stream's terminal
    /// message.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Classify one inbound message
    ///
    /// Must be called from within a tokio runtime (chunk decodes are spawned
    /// on the blocking pool).
    pub fn handle(&mut self, message: ServerMessage) -> Dispatch {
        match message {
            ServerMessage::Connected { client_id } => Dispatch::Connected(client_id),

            ServerMessage::AudioChunk {
                audio,
                text,
                mime_type,
                metrics,
            } => {
                if self.is_stale() {
                    self.stats.dropped_stale += 1;
                    tracing::debug!(len = audio.len(), "Dropping chunk from interrupted response");
                    return Dispatch::Handled;
                }

                self.stats.chunks_received += 1;
                let mime_type = mime_type.unwrap_or_else(|| self.default_mime.clone());
                let sequence = self.pipeline.submit(audio, mime_type, text.clone());
                tracing::debug!(sequence, "Audio chunk received");

                Dispatch::Event(SessionEvent::PartialText { text, metrics })
            }

            ServerMessage::TextFallback { text, error } => {
                if self.drop_stale_terminal("text_fallback") {
                    return Dispatch::Handled;
                }
                self.stream_open = false;
                self.stats.fallbacks += 1;
                tracing::info!(error = ?error, "Synthesis unavailable; text only");
                Dispatch::TextOnly(SessionEvent::TextOnly { text, error })
            }

            ServerMessage::StreamComplete {
                full_text,
                duration,
            } => {
                if self.drop_stale_terminal("stream_complete") {
                    return Dispatch::Handled;
                }
                self.stream_open = false;
                tracing::debug!(
                    duration_ms = duration,
                    pending_decodes = self.pipeline.len(),
                    "Stream complete received"
                );
                self.pending = Some(PendingCompletion {
                    full_text,
                    duration: Duration::from_millis(duration),
                });
                Dispatch::Handled
            }

            ServerMessage::InterruptConfirmed => {
                if self.gated_since.take().is_some() {
                    tracing::debug!(dropped = self.stats.dropped_stale, "Interrupt acknowledged");
                } else {
                    tracing::debug!("Interrupt acknowledged");
                }
                Dispatch::Handled
            }

            ServerMessage::Error { error } => {
                if self.drop_stale_terminal("error") {
                    tracing::debug!(error = %error, "Error belonged to interrupted response");
                    return Dispatch::Handled;
                }
                self.stream_open = false;
                tracing::warn!(error = %error, "Remote error");
                Dispatch::RemoteError(error)
            }

            ServerMessage::Unknown { kind, payload } => {
                tracing::debug!(kind = %kind, "Passing through unknown message");
                Dispatch::Event(SessionEvent::Passthrough { kind, payload })
            }
        }
    }

    /// Hand a finished decode to the queue
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ChunkDecode` if the chunk could not be decoded.
    /// The chunk is skipped; nothing was enqueued.
    pub fn on_decoded(
        &mut self,
        chunk: DecodedChunk,
        queue: &mut PlaybackQueue,
    ) -> Result<UnitId, SessionError> {
        match chunk.result {
            Ok(resource) => {
                self.stats.chunks_decoded += 1;
                Ok(queue.enqueue(resource, chunk.text))
            }
            Err(source) => {
                self.stats.decode_failures += 1;
                tracing::warn!(sequence = chunk.sequence, error = %source, "Chunk decode failed; skipping");
                Err(SessionError::ChunkDecode {
                    sequence: chunk.sequence,
                    source,
                })
            }
        }
    }

    /// Take the completion event once every chunk has played
    ///
    /// Returns `None` while no `stream_complete` is pending, decodes are in
    /// flight, or the queue is still playing.
    pub fn take_completion(&mut self, queue: &PlaybackQueue) -> Option<SessionEvent> {
        if self.pending.is_none() || !self.pipeline.is_empty() || !queue.is_idle() {
            return None;
        }
        self.pending.take().map(|pending| SessionEvent::Complete {
            full_text: pending.full_text,
            duration: pending.duration,
        })
    }

    /// Note that a request was sent; its stream is now open
    pub fn begin_stream(&mut self) {
        self.stream_open = true;
    }

    /// Forget the current response
    ///
    /// Abandons in-flight decodes and any pending completion. If the
    /// response was still streaming, closes the stale gate. Returns the
    /// number of abandoned decodes.
    pub fn reset(&mut self) -> usize {
        let abandoned = self.pipeline.clear();
        self.pending = None;

        if std::mem::take(&mut self.stream_open) && self.discard_until_ack {
            tracing::debug!("Gating messages of the cancelled response");
            self.gated_since = Some(Instant::now());
        }
        abandoned
    }

    /// Forget any gate and open stream; for a fresh connection
    pub fn clear_gate(&mut self) {
        self.stream_open = false;
        self.gated_since = None;
    }

    /// Whether the gate is closed, opening it once the timeout has passed
    fn is_stale(&mut self) -> bool {
        let Some(since) = self.gated_since else {
            return false;
        };
        match self.ack_timeout {
            Some(limit) if since.elapsed() >= limit => {
                tracing::warn!(
                    waited = ?since.elapsed(),
                    "No interrupt acknowledgement; accepting messages again"
                );
                self.gated_since = None;
                false
            }
            _ => true,
        }
    }

    /// Drop a terminal message of the cancelled response, opening the gate
    fn drop_stale_terminal(&mut self, kind: &str) -> bool {
        if !self.is_stale() {
            return false;
        }
        self.stats.dropped_stale += 1;
        self.gated_since = None;
        tracing::debug!(kind, "Interrupted response ended; gate open");
        true
    }

    /// Whether a `stream_complete` is waiting for playback to drain
    #[must_use]
    pub fn has_pending_completion(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether messages of a cancelled response are being dropped
    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool {
        self.gated_since.is_some()
    }

    /// Decodes in flight
    #[must_use]
    pub fn pending_decodes(&self) -> usize {
        self.pipeline.len()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    /// Wait for the next decode in arrival order
    ///
    /// Cancel-safe. Returns `None` when nothing is in flight.
    pub async fn next_decoded(&mut self) -> Option<DecodedChunk> {
        self.pipeline.next().await
    }

    /// Take the next decode if it has already finished
    pub fn try_next_decoded(&mut self) -> Option<DecodedChunk> {
        self.pipeline.try_next()
    }
}
