//! Transport Factory
//!
//! Creates a transport for a service address. The scheme selects the
//! implementation.

use super::{
    config::TransportConfig,
    traits::{SynthesisTransport, TransportError},
};

#[cfg(feature = "websocket")]
use super::websocket::WebSocketTransport;

/// Create a transport for `address`
///
/// # Arguments
///
/// * `address` - Service address, e.g. `ws://127.0.0.1:8080/ws`
/// * `config` - Channel sizing and message limits
///
/// # Returns
///
/// A boxed transport, not yet connected.
///
/// # Errors
///
/// Returns `TransportError::InvalidState` if:
/// - `inprocess:` is requested (the service side must be wired up; use
///   `InProcessTransport::new_pair()` directly)
/// - the scheme is unsupported or its transport is compiled out
///
/// # Example
///
/// ```ignore
/// use voicelink_core::transport::{create_transport, TransportConfig};
///
/// let mut transport = create_transport("ws://127.0.0.1:8080/ws", &TransportConfig::default())?;
/// transport.connect().await?;
/// ```
pub fn create_transport(
    address: &str,
    config: &TransportConfig,
) -> Result<Box<dyn SynthesisTransport>, TransportError> {
    let scheme = address
        .split_once("://")
        .map_or(address, |(scheme, _)| scheme)
        .to_ascii_lowercase();

    match scheme.as_str() {
        #[cfg(feature = "websocket")]
        "ws" | "wss" => Ok(Box::new(WebSocketTransport::new(address, config.clone()))),

        "inprocess" => Err(TransportError::InvalidState(
            "InProcess transport requires a service end; use InProcessTransport::new_pair() directly"
                .into(),
        )),

        _ => {
            let _ = config;
            Err(TransportError::InvalidState(format!(
                "unsupported transport address: {address}"
            )))
        }
    }
}
