//! WebSocket Transport
//!
//! Client-side WebSocket connection to the synthesis service. One JSON
//! document per text frame in both directions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                      ┌──────────────────┐
//! │     Session      │                      │ Synthesis Service│
//! │                  │   ws:// or wss://    │                  │
//! │ WebSocketTransport├────────────────────►│                  │
//! │  ClientMessage ─►│   writer task        │◄─ chat/interrupt │
//! │  ◄─ ServerMessage│   reader task        │ audio_chunk ─►   │
//! └──────────────────┘                      └──────────────────┘
//! ```
//!
//! The reader task decodes text frames and forwards them in arrival order.
//! Frames that fail to decode are logged and skipped. When the socket
//! closes the reader drops its channel, which `recv` reports as
//! [`TransportError::ConnectionClosed`]. A write failure aborts the reader,
//! so a broken socket surfaces the same way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::messages::{ClientMessage, ServerMessage};

use super::codec::{decode_server_message, encode_client_message};
use super::config::TransportConfig;
use super::traits::{SynthesisTransport, TransportError};

/// WebSocket transport for the synthesis service
pub struct WebSocketTransport {
    /// Service URL (`ws://` or `wss://`)
    url: String,
    /// Channel sizing and message limits
    config: TransportConfig,
    /// Inbound messages from the reader task
    msg_rx: Option<mpsc::Receiver<ServerMessage>>,
    /// Outbound messages to the writer task
    out_tx: Option<mpsc::Sender<ClientMessage>>,
    /// Whether the socket is open
    connected: Arc<AtomicBool>,
    /// Reader task, aborted on disconnect
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a new transport for `url`
    pub fn new(url: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            url: url.into(),
            config,
            msg_rx: None,
            out_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Get the service URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SynthesisTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState(
                "Already connected".to_string(),
            ));
        }

        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to connect to {}: {}", self.url, e))
            })?;

        let (mut write_half, mut read_half) = stream.split();

        let capacity = self.config.channel_capacity.max(1);
        let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(capacity);
        let (out_tx, out_rx) = mpsc::channel::<ClientMessage>(capacity);

        let connected = Arc::clone(&self.connected);
        connected.store(true, Ordering::SeqCst);

        // Reader: socket -> msg_tx
        let connected_read = Arc::clone(&connected);
        let max_bytes = self.config.max_message_bytes;
        let reader = tokio::spawn(async move {
            while let Some(frame) = read_half.next().await {
                match frame {
                    Ok(Message::Text(text)) => match decode_server_message(&text, max_bytes) {
                        Ok(msg) => {
                            if msg_tx.send(msg).await.is_err() {
                                tracing::debug!("Message receiver dropped");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable message");
                        }
                    },
                    Ok(Message::Binary(data)) => {
                        tracing::debug!(len = data.len(), "Ignoring binary frame");
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            connected_read.store(false, Ordering::SeqCst);
            tracing::info!("Disconnected from synthesis service");
        });

        spawn_writer(write_half, out_rx, reader.abort_handle(), Arc::clone(&connected));

        self.msg_rx = Some(msg_rx);
        self.out_tx = Some(out_tx);
        self.reader = Some(reader);

        tracing::info!(url = %self.url, "Connected to synthesis service");

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.out_tx = None;
        self.msg_rx = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        tracing::info!("Disconnected");
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        match self.out_tx {
            Some(ref tx) => tx
                .send(message)
                .await
                .map_err(|_| TransportError::SendFailed("Channel closed".to_string())),
            None => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&mut self) -> Result<ServerMessage, TransportError> {
        let Some(ref mut rx) = self.msg_rx else {
            return Err(TransportError::NotConnected);
        };

        let received = rx.recv().await;
        match received {
            Some(message) => Ok(message),
            None => {
                self.connected.store(false, Ordering::SeqCst);
                self.msg_rx = None;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<ServerMessage>, TransportError> {
        let Some(ref mut rx) = self.msg_rx else {
            return Err(TransportError::NotConnected);
        };

        let received = rx.try_recv();
        match received {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.connected.store(false, Ordering::SeqCst);
                self.msg_rx = None;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Writer: `out_rx` -> socket
///
/// On a write error the socket is unusable; the reader is aborted so the
/// inbound channel closes and `recv` reports the connection as closed.
fn spawn_writer<S>(
    mut sink: S,
    mut out_rx: mpsc::Receiver<ClientMessage>,
    reader: AbortHandle,
    connected: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    <S as Sink<Message>>::Error: std::fmt::Display,
{
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match encode_client_message(&message) {
                Ok(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, kind = message.kind(), "Write error; closing connection");
                        connected.store(false, Ordering::SeqCst);
                        reader.abort();
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, kind = message.kind(), "Encode error");
                }
            }
        }

        // Sender dropped: close the socket politely
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "Close handshake failed");
        }
    })
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
