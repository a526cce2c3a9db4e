use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::ClientConfig;
use crate::paths::parley_config_path;

/// On-disk configuration read from `~/.parley/config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub version: u32,
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub debug: DebugConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            backend: BackendConfig::default(),
            polling: PollingConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl ParleyConfig {
    pub fn load() -> Result<Self, String> {
        let path = parley_config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            std::fs::read_to_string(path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        parley_config_path()
    }

    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        let base_url = self.backend.base_url.trim();
        ClientConfig {
            base_url: if base_url.is_empty() {
                defaults.base_url
            } else {
                base_url.to_string()
            },
            request_timeout: Duration::from_secs(self.backend.request_timeout_secs.max(1)),
            message_poll_interval: millis_or(
                self.polling.messages_ms,
                defaults.message_poll_interval,
            ),
            pending_poll_interval: millis_or(
                self.polling.pending_ms,
                defaults.pending_poll_interval,
            ),
            events_poll_interval: millis_or(self.polling.events_ms, defaults.events_poll_interval),
            event_buffer: defaults.event_buffer,
            log_raw_parts: self.debug.log_raw_parts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:12000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub messages_ms: u64,
    pub pending_ms: u64,
    pub events_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            messages_ms: 1_000,
            pending_ms: 2_000,
            events_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log every raw part payload before normalization.
    pub log_raw_parts: bool,
}

fn millis_or(ms: u64, default: Duration) -> Duration {
    if ms == 0 {
        default
    } else {
        Duration::from_millis(ms)
    }
}
