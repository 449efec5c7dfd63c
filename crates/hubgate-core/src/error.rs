//! Error types for Hubgate

use thiserror::Error;

/// Result type alias for Hubgate operations
pub type HubResult<T> = Result<T, HubError>;

/// Main error type for Hubgate
///
/// Errors are `Clone` so that a single failed bulk call can be handed to
/// every caller waiting on the same batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Network or connection failure. Never retried by this crate.
    #[error("Transport error: {message}")]
    Transport { message: String, url: Option<String> },

    /// The server kept throttling after the retry ceiling was reached
    #[error("Rate limited: {message}")]
    RateLimited {
        status: u16,
        message: String,
        url: Option<String>,
        retry_after_secs: Option<u64>,
    },

    /// Non-success response that is not a rate-limit signal
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        status: u16,
        message: String,
        url: Option<String>,
    },

    /// A success response whose body could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The caller's cancellation token fired
    #[error("Operation was cancelled")]
    Cancelled,

    /// The task running a batch ended without delivering a result
    #[error("Batch for '{group}' aborted before delivering results")]
    BatchAborted { group: String },
}

impl HubError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            url: None,
        }
    }

    /// Create a new transport error for a specific URL
    pub fn transport_at(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Create a new rate-limited error
    pub fn rate_limited(
        status: u16,
        message: impl Into<String>,
        url: impl Into<String>,
        retry_after_secs: Option<u64>,
    ) -> Self {
        Self::RateLimited {
            status,
            message: message.into(),
            url: Some(url.into()),
            retry_after_secs,
        }
    }

    /// Create a new upstream error
    pub fn upstream(status: u16, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Create a new decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new batch-aborted error
    pub fn batch_aborted(group: impl Into<String>) -> Self {
        Self::BatchAborted {
            group: group.into(),
        }
    }

    /// Whether a later attempt could succeed without changing the request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::RateLimited { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable code for the variant
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "HUB_TRANSPORT",
            Self::RateLimited { .. } => "HUB_RATE_LIMITED",
            Self::Upstream { .. } => "HUB_UPSTREAM",
            Self::Decode { .. } => "HUB_DECODE",
            Self::Config { .. } => "HUB_CONFIG",
            Self::InvalidInput { .. } => "HUB_INVALID_INPUT",
            Self::Cancelled => "HUB_CANCELLED",
            Self::BatchAborted { .. } => "HUB_BATCH_ABORTED",
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(error: reqwest::Error) -> Self {
        let url = error.url().map(|u| u.to_string());
        Self::Transport {
            message: error.to_string(),
            url,
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

impl From<std::io::Error> for HubError {
    fn from(error: std::io::Error) -> Self {
        Self::config(format!("Failed to read config: {}", error))
    }
}

impl From<toml::de::Error> for HubError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML config: {}", error))
    }
}

impl From<url::ParseError> for HubError {
    fn from(error: url::ParseError) -> Self {
        Self::invalid_input(format!("Invalid URL: {}", error))
    }
}
