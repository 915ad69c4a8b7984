//! Client Configuration
//!
//! Layering, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML file (`$XDG_CONFIG_HOME/voicelink/client.toml` or an explicit path)
//! 3. `VOICELINK_*` environment variables
//! 4. [`ConfigOverrides`] (command-line flags)
//!
//! The client only reads configuration; it never writes the file.
//!
//! # Example
//!
//! ```toml
//! server_url = "ws://localhost:3001"
//! persona_id = "yuki"
//! voice_id = "nova"
//! discard_until_interrupt_ack = true
//! interrupt_ack_timeout_ms = 2000
//!
//! [transport]
//! connect_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportConfig;

/// Default media type for chunks that carry none
pub const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

/// Default bitrate used to estimate chunk play time (bits per second)
pub const DEFAULT_PLAYBACK_BITRATE: u32 = 128_000;

/// Default bound on dropping messages of a cancelled response
pub const DEFAULT_INTERRUPT_ACK_TIMEOUT_MS: u64 = 2000;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the file
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Streaming client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Synthesis service address (`ws://` or `wss://`)
    pub server_url: String,

    /// Persona used when a request names none
    pub persona_id: String,

    /// Voice used when a request names none
    pub voice_id: Option<String>,

    /// Media type assumed for chunks without `mimeType`
    pub default_mime_type: String,

    /// Drop messages of a cut-off response until `interrupt_confirmed`,
    /// its own terminal message, or the acknowledgement timeout
    pub discard_until_interrupt_ack: bool,

    /// Longest the stale gate stays closed (0 = until ack or stream end)
    pub interrupt_ack_timeout_ms: u64,

    /// Bitrate used to pace headless playback
    pub playback_bitrate_bps: u32,

    /// Transport settings
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:3001".to_string(),
            persona_id: "default".to_string(),
            voice_id: None,
            default_mime_type: DEFAULT_MIME_TYPE.to_string(),
            discard_until_interrupt_ack: true,
            interrupt_ack_timeout_ms: DEFAULT_INTERRUPT_ACK_TIMEOUT_MS,
            playback_bitrate_bps: DEFAULT_PLAYBACK_BITRATE,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `VOICELINK_URL`: Synthesis service address
    /// - `VOICELINK_PERSONA`: Default persona
    /// - `VOICELINK_VOICE`: Default voice
    /// - `VOICELINK_DEFAULT_MIME`: Media type for untyped chunks
    /// - `VOICELINK_DISCARD_UNTIL_ACK`: Stale gate (true/false)
    /// - `VOICELINK_INTERRUPT_ACK_TIMEOUT`: Stale gate bound in ms
    /// - `VOICELINK_PLAYBACK_BITRATE`: Headless pacing bitrate
    /// - plus the transport variables (see [`TransportConfig::from_env`])
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment variables on top of this configuration
    #[must_use]
    pub fn with_env(self) -> Self {
        Self {
            server_url: env_string("VOICELINK_URL").unwrap_or(self.server_url),
            persona_id: env_string("VOICELINK_PERSONA").unwrap_or(self.persona_id),
            voice_id: env_string("VOICELINK_VOICE").or(self.voice_id),
            default_mime_type: env_string("VOICELINK_DEFAULT_MIME")
                .unwrap_or(self.default_mime_type),
            discard_until_interrupt_ack: env_string("VOICELINK_DISCARD_UNTIL_ACK")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.discard_until_interrupt_ack),
            interrupt_ack_timeout_ms: env_string("VOICELINK_INTERRUPT_ACK_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.interrupt_ack_timeout_ms),
            playback_bitrate_bps: env_string("VOICELINK_PLAYBACK_BITRATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.playback_bitrate_bps),
            transport: self.transport.with_env(),
        }
    }

    /// Stale gate bound, `None` when disabled
    #[must_use]
    pub fn interrupt_ack_timeout(&self) -> Option<Duration> {
        (self.interrupt_ack_timeout_ms > 0)
            .then(|| Duration::from_millis(self.interrupt_ack_timeout_ms))
    }

    /// Check values are usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url is empty".into()));
        }
        if self.persona_id.trim().is_empty() {
            return Err(ConfigError::Invalid("persona_id is empty".into()));
        }
        if !self.default_mime_type.starts_with("audio/") {
            return Err(ConfigError::Invalid(format!(
                "default_mime_type must be an audio type, got {}",
                self.default_mime_type
            )));
        }
        if self.playback_bitrate_bps == 0 {
            return Err(ConfigError::Invalid("playback_bitrate_bps must be > 0".into()));
        }
        if self.transport.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "transport.channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Explicit config file
    pub config_path: Option<PathBuf>,
    /// Service address
    pub server_url: Option<String>,
    /// Persona
    pub persona_id: Option<String>,
    /// Voice
    pub voice_id: Option<String>,
    /// Pacing bitrate
    pub playback_bitrate_bps: Option<u32>,
}

impl ConfigOverrides {
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(url) = &self.server_url {
            config.server_url.clone_from(url);
        }
        if let Some(persona) = &self.persona_id {
            config.persona_id.clone_from(persona);
        }
        if let Some(voice) = &self.voice_id {
            config.voice_id = Some(voice.clone());
        }
        if let Some(bitrate) = self.playback_bitrate_bps {
            config.playback_bitrate_bps = bitrate;
        }
        config
    }
}

/// Where the loaded configuration came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    /// No file; defaults (plus environment and overrides)
    Defaults,
    /// Loaded from this file
    File(PathBuf),
}

/// Default config file location
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("voicelink").join("client.toml"))
}

/// Parse a config file
///
/// Missing keys take their defaults.
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be read and
/// `ConfigError::Parse` if it is not valid.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration with full layering
///
/// An explicit `config_path` must exist; the default location is optional.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file fails to load or the result is
/// invalid.
pub fn load_config(overrides: &ConfigOverrides) -> Result<(ClientConfig, ConfigSource), ConfigError> {
    let (config, source) = match &overrides.config_path {
        Some(path) => (load_config_from_path(path)?, ConfigSource::File(path.clone())),
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => (load_config_from_path(&path)?, ConfigSource::File(path)),
            None => (ClientConfig::default(), ConfigSource::Defaults),
        },
    };

    let config = overrides.apply(config.with_env());
    config.validate()?;

    tracing::debug!(source = ?source, url = %config.server_url, "Configuration loaded");
    Ok((config, source))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
