//! Transport Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default inbound message limit (10 MB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection timeout in milliseconds (0 = wait indefinitely)
    ///
    /// Bounds both channel establishment and the wait for the remote
    /// identity assignment.
    pub connect_timeout_ms: u64,

    /// Capacity of the inbound/outbound message channels
    pub channel_capacity: usize,

    /// Largest inbound message accepted, in bytes
    pub max_message_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            channel_capacity: 256,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl TransportConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `VOICELINK_CONNECT_TIMEOUT`: Connection timeout in ms (0 disables)
    /// - `VOICELINK_CHANNEL_CAPACITY`: Message channel capacity
    /// - `VOICELINK_MAX_MESSAGE_BYTES`: Inbound message size limit
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment variables on top of this configuration
    #[must_use]
    pub fn with_env(self) -> Self {
        Self {
            connect_timeout_ms: env_parse("VOICELINK_CONNECT_TIMEOUT")
                .unwrap_or(self.connect_timeout_ms),
            channel_capacity: env_parse("VOICELINK_CHANNEL_CAPACITY")
                .unwrap_or(self.channel_capacity),
            max_message_bytes: env_parse("VOICELINK_MAX_MESSAGE_BYTES")
                .unwrap_or(self.max_message_bytes),
        }
    }

    /// Connection timeout, or `None` when disabled
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
