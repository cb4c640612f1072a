//! Error types
//!
//! Every fallible engine operation returns [`ListError`]. The type is `Clone`
//! so a single failed request can be handed to every caller waiting on it.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ListError {
    /// The HTTP call failed (network, 4xx, 5xx).
    #[error("API request failed: {message}")]
    Transport { status: Option<u16>, message: String },

    /// The response did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A field has no searchable property (strict compile mode only).
    #[error("field '{field}' is not searchable")]
    Composition { field: String },

    /// One page of a roll fetch failed; nothing fetched so far is returned.
    #[error("roll fetch aborted at page {page}: {source}")]
    PartialResult {
        page: u64,
        #[source]
        source: Box<ListError>,
    },

    /// A roll fetch would exceed the configured record ceiling.
    #[error("result set of {count} records exceeds the cap of {cap}")]
    ResultTruncated { count: u64, cap: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ListResult<T> = std::result::Result<T, ListError>;

impl ListError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of the failure, looking through roll-fetch wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::PartialResult { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ListError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Format an engine error for display
/// Security: never echoes response bodies, only a message per status class
pub fn format_api_error(error: &ListError) -> String {
    match error.status() {
        Some(401) => return "Authentication failed. Sign in again and retry.".to_string(),
        Some(403) => return "Permission denied for this resource.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(409) => return "Resource conflict. The resource may be in use.".to_string(),
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => return "Invalid request. Check your filters.".to_string(),
        Some(s) if s >= 500 => {
            return "Service temporarily unavailable. Please try again.".to_string()
        }
        _ => {}
    }

    match error {
        ListError::Transport { .. } => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        ListError::ResultTruncated { count, cap } => {
            format!("Too many results ({count}); narrow the filter below {cap}.")
        }
        other => {
            let text = other.to_string();
            let sanitized: String = text
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(80)
                .collect();
            if text.chars().count() > 80 {
                format!("{}...", sanitized)
            } else {
                sanitized
            }
        }
    }
}
