//! Session Transport
//!
//! One bidirectional message connection to the remote synthesis service.
//! Framing is one JSON document per transport message.
//!
//! Implementations:
//! - [`InProcessTransport`]: direct channels (embedding, tests)
//! - `WebSocketTransport`: remote service over `ws://`/`wss://`
//!   (feature `websocket`)
//!
//! A transport close is terminal for the session using it. Nothing here
//! retries or reconnects.

pub mod codec;
pub mod config;
pub mod factory;
pub mod in_process;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use codec::{decode_server_message, encode_client_message};
pub use config::TransportConfig;
pub use factory::create_transport;
pub use in_process::InProcessTransport;
pub use traits::{SynthesisTransport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
