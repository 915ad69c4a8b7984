//! Interrupt Coordinator
//!
//! The single authority for "stop everything now". Local state is cleared
//! first and synchronously; the remote side is told afterwards, best effort.
//!
//! # Ordering
//!
//! 1. Playback queue hard stop (active unit halted, backlog drained)
//! 2. Decode pipeline and pending completion abandoned; messages still in
//!    flight for a cut-off stream are gated by the handler
//! 3. `{"type":"interrupt"}` sent if the transport is connected
//!
//! The acknowledgement (`interrupt_confirmed`) is never awaited.

use crate::messages::ClientMessage;
use crate::playback::PlaybackQueue;
use crate::protocol::StreamHandler;
use crate::transport::SynthesisTransport;

/// What happened to the remote cancel signal
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterruptSignal {
    /// Sent to the remote side
    Sent,
    /// No open transport; nothing sent
    Skipped,
    /// Send failed; local state was cleared anyway
    Failed(String),
}

/// Result of one interrupt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterruptReport {
    /// Playback units discarded (active unit included)
    pub discarded_units: usize,
    /// Decodes abandoned before reaching the queue
    pub discarded_decodes: usize,
    /// Remote cancel signal
    pub signal: InterruptSignal,
}

impl InterruptReport {
    /// Whether anything local was discarded
    #[must_use]
    pub fn discarded_anything(&self) -> bool {
        self.discarded_units > 0 || self.discarded_decodes > 0
    }
}

/// Coordinates queue, handler and transport on interrupt
#[derive(Debug, Default)]
pub struct InterruptCoordinator {
    interrupts: u64,
    signals_sent: u64,
}

impl InterruptCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear local playback state without telling the remote side
    ///
    /// Used directly when the connection is already gone.
    pub fn halt(&mut self, queue: &mut PlaybackQueue, handler: &mut StreamHandler) -> InterruptReport {
        self.interrupts += 1;
        let discarded_units = queue.hard_stop();
        let discarded_decodes = handler.reset();

        InterruptReport {
            discarded_units,
            discarded_decodes,
            signal: InterruptSignal::Skipped,
        }
    }

    /// Stop everything now
    ///
    /// Idempotent: a second call with nothing playing discards nothing and
    /// just repeats the (harmless) remote signal. When this returns the queue
    /// is idle with an empty backlog and every discarded resource has been
    /// released.
    pub async fn interrupt(
        &mut self,
        queue: &mut PlaybackQueue,
        handler: &mut StreamHandler,
        transport: Option<&dyn SynthesisTransport>,
    ) -> InterruptReport {
        let mut report = self.halt(queue, handler);

        if let Some(transport) = transport.filter(|t| t.is_connected()) {
            report.signal = match transport.send(ClientMessage::Interrupt).await {
                Ok(()) => {
                    self.signals_sent += 1;
                    InterruptSignal::Sent
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to send interrupt; local state cleared");
                    InterruptSignal::Failed(e.to_string())
                }
            };
        }

        tracing::debug!(
            discarded_units = report.discarded_units,
            discarded_decodes = report.discarded_decodes,
            signal = ?report.signal,
            "Interrupted"
        );
        report
    }

    /// Interrupts issued over the coordinator's lifetime
    #[must_use]
    pub fn interrupts(&self) -> u64 {
        self.interrupts
    }

    /// Remote cancel signals successfully sent
    #[must_use]
    pub fn signals_sent(&self) -> u64 {
        self.signals_sent
    }
}
