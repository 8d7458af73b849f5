// Runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::downloader::models::Platform;

/// Upper bound for a single "get info" request
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Remote service connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,

    #[serde(rename = "fetch_timeout_secs", with = "secs")]
    pub fetch_timeout: Duration,

    #[serde(rename = "request_timeout_secs", with = "secs")]
    pub request_timeout: Duration,

    /// Delay between progress polls of a remote job
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// HTTP or SOCKS5 proxy URL (e.g. "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            proxy: None,
        }
    }
}

/// Top-level configuration of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,

    /// Platform assigned to URLs without a known marker
    pub default_platform: Platform,

    /// Directory finished downloads are reported under
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            default_platform: Platform::Unknown,
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `SOCIAL_DL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("SOCIAL_DL_SERVICE_URL") {
            self.service.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(proxy) = lookup("SOCIAL_DL_PROXY") {
            self.service.proxy = Some(proxy).filter(|p| !p.trim().is_empty());
        }

        if let Some(value) = lookup("SOCIAL_DL_FETCH_TIMEOUT_SECS") {
            let secs = parse_number("SOCIAL_DL_FETCH_TIMEOUT_SECS", &value)?;
            self.service.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = lookup("SOCIAL_DL_POLL_INTERVAL_MS") {
            let ms = parse_number("SOCIAL_DL_POLL_INTERVAL_MS", &value)?;
            self.service.poll_interval = Duration::from_millis(ms);
        }

        if let Some(dir) = lookup("SOCIAL_DL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }

        Ok(self)
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
