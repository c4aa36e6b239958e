//! Error types for notionsync.
//!
//! Library crates use [`SyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all notionsync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status while downloading a binary.
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Error payload returned by the source API.
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A page record lacks a property the sync cannot do without.
    #[error("page {page_id} is missing required property '{property}'")]
    MissingProperty { page_id: String, property: String },

    /// Two pages in one run derive the same content directory.
    #[error("slug '{slug}' of page {page_id} is already used by page {existing_id}")]
    SlugCollision {
        slug: String,
        page_id: String,
        existing_id: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty slug, bad timestamp, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Malformed JSON from the source API.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Report a missing page property.
    pub fn missing_property(page_id: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingProperty {
            page_id: page_id.into(),
            property: property.into(),
        }
    }

    /// Whether retrying the failed request may succeed.
    ///
    /// Transport failures, rate limiting and server-side errors are transient.
    /// Everything else needs a change in input or environment.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => is_transient_status(*status),
            Self::Api { status, code, .. } => {
                is_transient_status(*status) || code == "rate_limited"
            }
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Config { .. }
            | Self::MissingProperty { .. }
            | Self::SlugCollision { .. }
            | Self::Validation { .. }
            | Self::Decode(_) => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
