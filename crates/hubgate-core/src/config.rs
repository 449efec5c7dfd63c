//! Client configuration
//!
//! Configuration is layered: defaults, then an optional file, then
//! environment variables. The CLI applies its own flags last.

use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Public GitHub API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.github.com/";

/// Window during which lookups for the same repository are coalesced
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_secs(2);

/// Environment variable names read by [`ClientConfig::apply_env`]
pub mod env_keys {
    pub const TOKEN: &str = "GITHUB_TOKEN";
    pub const ORGANIZATION: &str = "GITHUB_ORGANIZATION";
    pub const BASE_URL: &str = "GITHUB_BASE_URL";
    pub const INSECURE: &str = "GITHUB_INSECURE";
}

/// Settings for the rate-limit transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Retries after a rate-limit rejection before giving up
    pub max_retries: u32,
    /// Delay used when the server gives no reset time
    #[serde(with = "humantime_serde")]
    pub fallback_delay: Duration,
    /// Upper bound on any single wait
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fallback_delay: Duration::from_secs(60),
            max_wait: Duration::from_secs(3600),
        }
    }
}

/// Full configuration for a GitHub client instance
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bearer token; `None` means anonymous access
    pub token: Option<String>,
    /// Organization the client acts on behalf of
    pub organization: Option<String>,
    /// API root, overridable for GitHub Enterprise
    pub base_url: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Coalescing window for batched lookups
    #[serde(with = "humantime_serde")]
    pub batch_window: Duration,
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Rate-limit transport settings
    pub rate_limit: RateLimitConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            organization: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            insecure: false,
            user_agent: format!("hubgate/{}", env!("CARGO_PKG_VERSION")),
            batch_window: DEFAULT_BATCH_WINDOW,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("organization", &self.organization)
            .field("base_url", &self.base_url)
            .field("insecure", &self.insecure)
            .field("user_agent", &self.user_agent)
            .field("batch_window", &self.batch_window)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with a token and default settings
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Load configuration from a file
    ///
    /// TOML is used for `.toml` files, JSON otherwise.
    /// Returns default config if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> HubResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            HubError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => serde_json::from_str(&content).map_err(|e| {
                HubError::config(format!(
                    "Failed to parse JSON config '{}': {}",
                    path.display(),
                    e
                ))
            }),
        }
    }

    /// Overlay settings from the process environment
    pub fn apply_env(&mut self) -> HubResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay settings from an arbitrary variable source
    pub fn apply_env_with<F>(&mut self, lookup: F) -> HubResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(env_keys::TOKEN).filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(org) = lookup(env_keys::ORGANIZATION).filter(|o| !o.is_empty()) {
            self.organization = Some(org);
        }
        if let Some(base_url) = lookup(env_keys::BASE_URL).filter(|u| !u.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(insecure) = lookup(env_keys::INSECURE) {
            self.insecure = parse_bool(&insecure).ok_or_else(|| {
                HubError::config(format!(
                    "Invalid {} value: '{}'",
                    env_keys::INSECURE,
                    insecure
                ))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration and normalise the base URL
    pub fn validate(&mut self) -> HubResult<()> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| HubError::config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(HubError::config(format!(
                "Base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        // Relative endpoint paths are joined onto the base, which drops the
        // last path segment unless it ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base_url = url.to_string();

        if self.batch_window.is_zero() {
            return Err(HubError::config("Batch window must be greater than zero"));
        }

        if self.token.as_deref().is_none_or(str::is_empty) {
            warn!("No GitHub token configured, requests will be anonymous");
        }

        if self.insecure {
            warn!("TLS certificate verification is disabled");
        }

        Ok(())
    }

    /// Parsed base URL
    pub fn base_url(&self) -> HubResult<Url> {
        Ok(Url::parse(&self.base_url)?)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
