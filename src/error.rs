// src/error.rs

//! Unified error handling for the scraping engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for flatwatch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Source is down, answered with a non-2xx status, or is cooling down
    #[error("{message}")]
    Unavailable { message: String },

    /// Source asked us to slow down (429/503 or a high-traffic page)
    #[error("{message}")]
    HighTraffic { message: String },

    /// Retries exhausted and the last attempt timed out
    #[error("Timeout - Website not responding")]
    Timeout,

    /// A single attempt failed below HTTP (connect, timeout, broken body)
    #[error("Transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// A whole page could not be interpreted
    #[error("Extraction failed for {source_name}: {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a high-traffic error.
    pub fn high_traffic(message: impl Into<String>) -> Self {
        Self::HighTraffic {
            message: message.into(),
        }
    }

    /// Create a transport error for a single failed attempt.
    pub fn transport(message: impl fmt::Display, timeout: bool) -> Self {
        Self::Transport {
            message: message.to_string(),
            timeout,
        }
    }

    /// Create an extraction error for a whole page.
    pub fn extraction(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the retry layer may try the same request again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
