//! Deployment configuration.
//!
//! Read from the same JSON file the bot deployment already ships. Keys the
//! bridge does not use (bot token, languages, messages) are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Command slot: the file the simulation script reads.
    pub input_file_path: PathBuf,
    /// Response slot: the file the simulation script writes.
    pub output_file_path: PathBuf,
    /// Response timeout in seconds.
    pub timeout: f64,
    pub slot_poll_interval_ms: u64,
    pub response_poll_interval_ms: u64,
    /// Seconds to wait for the command slot to empty. Unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_free_timeout: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        Self {
            input_file_path: PathBuf::from("simutrans_input.json"),
            output_file_path: PathBuf::from("simutrans_output.json"),
            timeout: bridge.timeout.as_secs_f64(),
            slot_poll_interval_ms: bridge.slot_poll_interval.as_millis() as u64,
            response_poll_interval_ms: bridge.response_poll_interval.as_millis() as u64,
            slot_free_timeout: None,
        }
    }
}

fn seconds(key: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{} is not a usable number of seconds ({})", value, e),
    })
}

fn interval(key: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "poll interval must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "Loaded config");
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Using default config");
            Self::default()
        })
    }

    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let slot_free_timeout = self
            .slot_free_timeout
            .map(|secs| seconds("slotFreeTimeout", secs))
            .transpose()?;

        Ok(BridgeConfig::new()
            .with_timeout(seconds("timeout", self.timeout)?)
            .with_slot_poll_interval(interval("slotPollIntervalMs", self.slot_poll_interval_ms)?)
            .with_response_poll_interval(interval(
                "responsePollIntervalMs",
                self.response_poll_interval_ms,
            )?)
            .with_slot_free_timeout(slot_free_timeout))
    }
}
