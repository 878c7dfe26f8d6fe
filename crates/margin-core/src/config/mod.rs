//! Runtime configuration shared by Margin clients.
//!
//! Loaded from a JSON file, then overridden by environment variables. Every
//! field has a default, so a missing file means default configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{CONTEXT_CHARS, MIN_SELECTION_CHARS};
use crate::util::{is_http_url, normalize_text_option};

pub const SYNC_ENDPOINT_ENV: &str = "MARGIN_SYNC_ENDPOINT";
pub const DATA_DIR_ENV: &str = "MARGIN_DATA_DIR";

const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SYNC_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct MarginConfig {
    /// Characters of context captured on each side of a selection
    pub context_chars: usize,
    /// Minimum trimmed selection length
    pub min_selection_chars: usize,
    /// Base URL of the remote highlight store; local-only when unset
    pub sync_endpoint: Option<String>,
    pub sync_timeout_secs: u64,
    /// Seconds between remote polls of a watched material; 0 disables polling
    pub sync_poll_secs: u64,
    /// Directory for the database and device id
    pub data_dir: Option<PathBuf>,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            context_chars: CONTEXT_CHARS,
            min_selection_chars: MIN_SELECTION_CHARS,
            sync_endpoint: None,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            sync_poll_secs: DEFAULT_SYNC_POLL_SECS,
            data_dir: None,
        }
    }
}

impl MarginConfig {
    /// Parse and validate a JSON config payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validated()
    }

    /// Load `path`, falling back to defaults when the file does not exist,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(payload) => {
                tracing::debug!("Loaded config from {}", path.display());
                Self::parse(&payload)?
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(error) => return Err(error.into()),
        };
        config
            .with_overrides(|key| std::env::var(key).ok())
            .validated()
    }

    /// Apply overrides read through `lookup` (normally the process environment).
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = normalize_text_option(lookup(SYNC_ENDPOINT_ENV)) {
            self.sync_endpoint = Some(endpoint);
        }
        if let Some(data_dir) = normalize_text_option(lookup(DATA_DIR_ENV)) {
            self.data_dir = Some(PathBuf::from(data_dir));
        }
        self
    }

    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub const fn sync_poll_interval(&self) -> Option<Duration> {
        if self.sync_poll_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sync_poll_secs))
        }
    }

    fn validated(mut self) -> Result<Self> {
        if self.min_selection_chars == 0 {
            return Err(Error::Config(
                "min_selection_chars must be at least 1".to_string(),
            ));
        }
        if self.sync_timeout_secs == 0 {
            return Err(Error::Config(
                "sync_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.sync_endpoint = match normalize_text_option(self.sync_endpoint.take()) {
            Some(endpoint) if is_http_url(&endpoint) => {
                Some(endpoint.trim_end_matches('/').to_string())
            }
            Some(_) => {
                return Err(Error::Config(
                    "sync_endpoint must include http:// or https://".to_string(),
                ))
            }
            None => None,
        };
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn parse_fills_defaults() {
        let config = MarginConfig::parse(r#"{ "context_chars": 40 }"#).unwrap();
        assert_eq!(
            config,
            MarginConfig {
                context_chars: 40,
                ..MarginConfig::default()
            }
        );
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = MarginConfig::parse(r#"{ "colour": "red" }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn parse_normalizes_sync_endpoint() {
        let config =
            MarginConfig::parse(r#"{ "sync_endpoint": " https://sync.example.com/ " }"#).unwrap();
        assert_eq!(config.sync_endpoint.as_deref(), Some("https://sync.example.com"));

        assert!(MarginConfig::parse(r#"{ "sync_endpoint": "sync.example.com" }"#).is_err());
        assert!(MarginConfig::parse(r#"{ "sync_timeout_secs": 0 }"#).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = MarginConfig {
            sync_endpoint: Some("https://file.example.com".to_string()),
            ..MarginConfig::default()
        }
        .with_overrides(|key| match key {
            SYNC_ENDPOINT_ENV => Some("https://env.example.com".to_string()),
            DATA_DIR_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.sync_endpoint.as_deref(), Some("https://env.example.com"));
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let tmp = tempdir().unwrap();
        let config = MarginConfig::load(&tmp.path().join("missing.json")).unwrap();
        assert_eq!(config.context_chars, CONTEXT_CHARS);
        assert_eq!(config.sync_timeout(), Duration::from_secs(10));
        assert_eq!(config.sync_poll_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_poll_interval_disables_polling() {
        let config = MarginConfig::parse(r#"{ "sync_poll_secs": 0 }"#).unwrap();
        assert_eq!(config.sync_poll_interval(), None);
    }
}
