//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// REST base address used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Realtime endpoint used when nothing else is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// REST API base address; endpoint paths are appended verbatim.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Realtime endpoint; the access token is appended as `?token=`.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub realtime: RealtimeSettings,
}

/// Timing of the proactive token refresh loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub check_interval_secs: u64,
    pub proactive_interval_secs: u64,
    pub expiry_lead_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            proactive_interval_secs: 14 * 60,
            expiry_lead_secs: 5 * 60,
        }
    }
}

impl RefreshSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn proactive_interval(&self) -> Duration {
        Duration::from_secs(self.proactive_interval_secs)
    }

    pub fn expiry_lead(&self) -> Duration {
        Duration::from_secs(self.expiry_lead_secs)
    }
}

/// Reconnection policy of the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub exponential_backoff: bool,
    pub max_reconnect_delay_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_interval_ms: 5_000,
            max_reconnect_attempts: 10,
            exponential_backoff: false,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl RealtimeSettings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            ws_url: default_ws_url(),
            refresh: RefreshSettings::default(),
            realtime: RealtimeSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `TOPUP_*` overrides from the given lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = lookup("TOPUP_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("TOPUP_WS_URL") {
            self.ws_url = url;
        }
        if let Some(level) = lookup("TOPUP_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(secs) = lookup("TOPUP_REFRESH_CHECK_SECS").and_then(|v| v.parse().ok()) {
            self.refresh.check_interval_secs = secs;
        }
    }

    /// Reject settings that would make the client loop or misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        self.ws_url()?;
        if self.refresh.check_interval_secs == 0 {
            return Err(CoreError::Config(
                "refresh.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The REST base address as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// The realtime endpoint as a parsed URL.
    pub fn ws_url(&self) -> CoreResult<Url> {
        Url::parse(&self.ws_url).map_err(CoreError::from)
    }
}
