//! Unified error type for azgpt.
//!
//! Token acquisition, the chat and speech clients, configuration loading and
//! audio playback all report failures through [`Error`]. Cache read failures
//! never show up here: an unreadable token cache is treated as an empty one.

use crate::config::ConfigIssue;

/// Result type alias for azgpt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for azgpt.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The token endpoint answered with a non-success status.
    #[error("Failed to fetch token: {status_text}")]
    AuthFetch {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status, e.g. `Unauthorized`.
        status_text: String,
    },

    /// A chat or speech endpoint answered with a non-success status.
    #[error("API request failed with status {status}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for logging.
        body: String,
    },

    /// A response body did not have the expected shape.
    #[error("Expected {expected}, got {got}")]
    ResponseFormat {
        /// Expected format description.
        expected: String,
        /// Actual format received.
        got: String,
    },

    /// Speech synthesis did not complete.
    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    /// Audio playback failed.
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {}", join_issues(.issues))]
    Config {
        /// Every issue found while loading.
        issues: Vec<ConfigIssue>,
    },

    /// Network or connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a token fetch error from an HTTP status.
    #[must_use]
    pub fn auth_fetch(status: reqwest::StatusCode) -> Self {
        Self::AuthFetch {
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .map_or_else(|| status.as_str().to_owned(), ToOwned::to_owned),
        }
    }

    /// Create an API status error.
    #[must_use]
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ResponseFormat {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a speech error.
    #[must_use]
    pub fn speech(reason: impl Into<String>) -> Self {
        Self::Speech(reason.into())
    }

    /// Create a playback error.
    #[must_use]
    pub fn playback(message: impl Into<String>) -> Self {
        Self::Playback(message.into())
    }

    /// Create a configuration error from the issues found.
    #[must_use]
    pub const fn config(issues: Vec<ConfigIssue>) -> Self {
        Self::Config { issues }
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AuthFetch { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            Self::response_format("JSON body", err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
