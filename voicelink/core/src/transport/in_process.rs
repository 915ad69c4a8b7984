//! In-Process Transport
//!
//! Direct channel-based communication with a synthesis service running in
//! the same process. Used for embedding a local synthesis backend and for
//! driving sessions in tests without a network.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, requests, replies) = InProcessTransport::new_pair();
//!
//! // The service side reads ClientMessages from `requests`
//! // and writes ServerMessages to `replies`.
//! replies.send(ServerMessage::Connected { client_id }).await?;
//! session.connect_with(Box::new(transport)).await?;
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::{ClientMessage, ServerMessage};

use super::traits::{SynthesisTransport, TransportError};

/// Default channel capacity for in-process pairs
const DEFAULT_CAPACITY: usize = 100;

/// In-process transport using tokio channels
///
/// Messages are passed as typed values, so no serialization happens.
/// The transport starts disconnected; `connect` opens it.
pub struct InProcessTransport {
    /// Channel to send requests to the service
    request_tx: mpsc::Sender<ClientMessage>,
    /// Channel to receive replies from the service
    reply_rx: mpsc::Receiver<ServerMessage>,
    /// Connection state
    connected: bool,
}

impl InProcessTransport {
    /// Create a new in-process transport pair
    ///
    /// Returns:
    /// - `InProcessTransport`: give this to the session
    /// - `mpsc::Receiver<ClientMessage>`: the service receives requests here
    /// - `mpsc::Sender<ServerMessage>`: the service sends replies here
    ///
    /// Dropping the reply sender closes the connection from the service side.
    #[must_use]
    pub fn new_pair() -> (
        Self,
        mpsc::Receiver<ClientMessage>,
        mpsc::Sender<ServerMessage>,
    ) {
        Self::new_pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with custom channel capacity
    #[must_use]
    pub fn new_pair_with_capacity(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<ClientMessage>,
        mpsc::Sender<ServerMessage>,
    ) {
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        let transport = Self {
            request_tx,
            reply_rx,
            connected: false,
        };

        (transport, request_rx, reply_tx)
    }
}

#[async_trait]
impl SynthesisTransport for InProcessTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.request_tx.is_closed() {
            return Err(TransportError::ConnectionFailed(
                "service side dropped".to_string(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.reply_rx.close();
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.request_tx
            .send(message)
            .await
            .map_err(|_| TransportError::SendFailed("Channel closed".to_string()))
    }

    async fn recv(&mut self) -> Result<ServerMessage, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match self.reply_rx.recv().await {
            Some(message) => Ok(message),
            None => {
                self.connected = false;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<ServerMessage>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match self.reply_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.connected = false;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
