//! Client runtime configuration types.
//!
//! Every tab of the client core reads `democrm.toml` through these types. All
//! fields carry serde defaults, so a partial or missing file still yields a
//! usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "democrm.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level client configuration (persisted as `democrm.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub list: ListSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Idle timeout and warning lead time, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_warning_offset")]
    pub warning_offset_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            warning_offset_secs: default_warning_offset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Distance from the bottom of the list, in content units, under which
    /// the next page is requested.
    #[serde(default = "default_fetch_threshold")]
    pub fetch_threshold: f64,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            fetch_threshold: default_fetch_threshold(),
        }
    }
}

/// Applies to read-only requests only. Writes are never retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            read_retries: default_read_retries(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:4000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    1800
}
fn default_warning_offset() -> u64 {
    60
}
fn default_page_size() -> u32 {
    10
}
fn default_fetch_threshold() -> f64 {
    400.0
}
fn default_read_retries() -> u32 {
    1
}
fn default_retry_delay_ms() -> u64 {
    250
}

impl ClientConfig {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let encoded = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, encoded).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reject values the client core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.warning_offset_secs == 0 || s.warning_offset_secs >= s.idle_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "session.warning_offset_secs ({}) must be > 0 and < session.idle_timeout_secs ({})",
                s.warning_offset_secs, s.idle_timeout_secs
            )));
        }
        if self.list.page_size == 0 {
            return Err(ConfigError::Invalid("list.page_size must be > 0".into()));
        }
        if !(self.list.fetch_threshold.is_finite() && self.list.fetch_threshold >= 0.0) {
            return Err(ConfigError::Invalid(
                "list.fetch_threshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}
