use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Deserialize, Debug, Clone)]
pub struct FleetConfig {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Connection and credentials for the controller API.
#[derive(Deserialize, Clone)]
pub struct ControllerConfig {
    /// Base URL of the controller, without the `/API` suffix.
    pub url: String,
    pub username: String,
    pub password: Zeroizing<String>,
    /// Base32 TOTP seed when the account has a second factor.
    #[serde(default)]
    pub totp_seed: Option<Zeroizing<String>>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("totp_seed", &self.totp_seed.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl FleetConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: FleetConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = self.controller.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("controller.url must start with http:// or https://");
        }
        if self.controller.username.is_empty() {
            bail!("controller.username must not be empty");
        }
        if self.controller.request_timeout_secs == 0 {
            bail!("controller.request_timeout_secs must be positive");
        }
        if self.polling.interval_secs == 0 {
            bail!("polling.interval_secs must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.controller.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }

    /// `$XDG_CONFIG_HOME/fleetgate/config.toml`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

fn config_dir() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("fleetgate")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("fleetgate")
    } else {
        PathBuf::from("/tmp/fleetgate")
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
