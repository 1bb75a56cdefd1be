//! Per-source outcome of the most recent cycle.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::AppError;

/// Last known state of a source, rendered as status text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStatus {
    /// Not polled since startup
    #[default]
    NotChecked,
    /// Last fetch succeeded
    Available,
    /// Source asked us to slow down
    HighTraffic(String),
    /// Non-2xx, retries exhausted, or cooling down
    Unavailable(String),
    /// Retries exhausted on timeouts
    Timeout,
    /// Anything else, including panics inside an extractor
    Error(String),
}

impl SourceStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, SourceStatus::Available)
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::NotChecked => f.write_str("Not checked yet"),
            SourceStatus::Available => f.write_str("Available"),
            SourceStatus::HighTraffic(message) | SourceStatus::Unavailable(message) => {
                f.write_str(message)
            }
            SourceStatus::Timeout => f.write_str("Timeout - Website not responding"),
            SourceStatus::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

impl From<&AppError> for SourceStatus {
    fn from(error: &AppError) -> Self {
        match error {
            AppError::HighTraffic { message } => SourceStatus::HighTraffic(message.clone()),
            AppError::Unavailable { message } => SourceStatus::Unavailable(message.clone()),
            AppError::Timeout => SourceStatus::Timeout,
            AppError::Transport { timeout: true, .. } => SourceStatus::Timeout,
            other => SourceStatus::Error(other.to_string()),
        }
    }
}

impl Serialize for SourceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
