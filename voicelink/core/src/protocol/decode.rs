//! Ordered Decode Pipeline
//!
//! Chunk payloads are decoded on the blocking pool so the message-handling
//! path never stalls on base64 or container work. Results come back in
//! submission order regardless of which decode finishes first.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, StreamExt};
use futures::FutureExt;

use crate::audio::{AudioResource, DecodeError, MediaDecoder};

/// Result of decoding one chunk
#[derive(Debug)]
pub struct DecodedChunk {
    /// Position in the submission order (lifetime of the pipeline)
    pub sequence: u64,
    /// Source text of the chunk
    pub text: String,
    /// Decoded resource, or why the chunk is unplayable
    pub result: Result<AudioResource, DecodeError>,
}

/// In-flight decodes, yielded in submission order
pub struct DecodePipeline {
    decoder: Arc<dyn MediaDecoder>,
    in_flight: FuturesOrdered<BoxFuture<'static, DecodedChunk>>,
    submitted: u64,
}

impl DecodePipeline {
    /// Create an empty pipeline
    pub fn new(decoder: Arc<dyn MediaDecoder>) -> Self {
        Self {
            decoder,
            in_flight: FuturesOrdered::new(),
            submitted: 0,
        }
    }

    /// Start decoding a payload; returns its sequence number
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, payload: String, mime_type: String, text: String) -> u64 {
        let sequence = self.submitted;
        self.submitted += 1;

        let decoder = Arc::clone(&self.decoder);
        let task = tokio::task::spawn_blocking(move || decoder.decode(&payload, &mime_type));

        self.in_flight.push_back(
            async move {
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(DecodeError::Task(e.to_string())),
                };
                DecodedChunk {
                    sequence,
                    text,
                    result,
                }
            }
            .boxed(),
        );

        tracing::trace!(sequence, in_flight = self.in_flight.len(), "Decode submitted");
        sequence
    }

    /// Wait for the next decode in submission order
    ///
    /// Cancel-safe. Returns `None` when nothing is in flight.
    pub async fn next(&mut self) -> Option<DecodedChunk> {
        self.in_flight.next().await
    }

    /// Take the next decode if it has already finished
    pub fn try_next(&mut self) -> Option<DecodedChunk> {
        self.in_flight.next().now_or_never().flatten()
    }

    /// Decodes in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Abandon every in-flight decode
    ///
    /// Finished results are dropped with the pipeline entry; decodes still
    /// running on the blocking pool drop their resource when they complete.
    /// Returns the number abandoned.
    pub fn clear(&mut self) -> usize {
        let abandoned = self.in_flight.len();
        self.in_flight = FuturesOrdered::new();
        abandoned
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("in_flight", &self.in_flight.len())
            .field("submitted", &self.submitted)
            .finish()
    }
}
