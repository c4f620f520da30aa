//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, the credential backend, the last used
//! username, and the session timings that drive token refresh.
//!
//! Configuration is stored at `~/.config/taxdesk/config.json`. Environment
//! variables (optionally loaded from a `.env` file by the binary) override
//! the stored values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "taxdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing else is configured
const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "TAXDESK_API_URL";
pub const ENV_CREDENTIAL_BACKEND: &str = "TAXDESK_CREDENTIAL_BACKEND";
pub const ENV_USERNAME: &str = "TAXDESK_USERNAME";

/// Where access and refresh tokens are persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// OS keychain
    #[default]
    Keyring,
    /// JSON file in the cache directory
    File,
    /// Kept in memory only; the session ends with the process
    Memory,
}

impl CredentialBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "keyring" | "keychain" => Some(CredentialBackend::Keyring),
            "file" => Some(CredentialBackend::File),
            "memory" => Some(CredentialBackend::Memory),
            _ => None,
        }
    }
}

/// Timings of the session lifecycle. All values are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// An access token expiring within this window is refreshed proactively
    pub refresh_lookahead_secs: u64,
    /// Period of the background validity check
    pub poll_interval_secs: u64,
    /// Becoming visible after being hidden longer than this triggers a check
    pub visibility_threshold_secs: u64,
    /// Regaining focus after being idle longer than this triggers a check
    pub idle_focus_threshold_secs: u64,
    /// Lifetime of a persisted access token
    pub access_token_ttl_secs: u64,
    /// Lifetime of a persisted refresh token
    pub refresh_token_ttl_secs: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            refresh_lookahead_secs: 2 * 60,
            poll_interval_secs: 10 * 60,
            visibility_threshold_secs: 5 * 60,
            idle_focus_threshold_secs: 5 * 60,
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 14 * 24 * 60 * 60,
        }
    }
}

impl SessionTimings {
    pub fn refresh_lookahead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_lookahead_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn visibility_threshold(&self) -> Duration {
        Duration::from_secs(self.visibility_threshold_secs)
    }

    pub fn idle_focus_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_focus_threshold_secs)
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl_secs as i64)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_ttl_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub credential_backend: CredentialBackend,
    pub last_username: Option<String>,
    pub request_timeout_secs: u64,
    pub session: SessionTimings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            credential_backend: CredentialBackend::default(),
            last_username: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session: SessionTimings::default(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_CREDENTIAL_BACKEND) {
            match CredentialBackend::parse(&raw) {
                Some(backend) => self.credential_backend = backend,
                None => tracing::warn!(value = %raw, "Unknown credential backend, keeping configured one"),
            }
        }
        if let Some(username) = lookup(ENV_USERNAME).filter(|u| !u.trim().is_empty()) {
            self.last_username = Some(username);
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn api_base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("logs"))
    }
}
