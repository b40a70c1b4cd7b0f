//! Error types for the telegram-pipeline library.
//!
//! This module provides custom error types using `thiserror` so each pipeline
//! component can tell unit-level failures apart from run-level ones.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`crate::source::ChannelSource`].
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source asked us to back off before retrying
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// How long the source wants us to wait
        retry_after: Duration,
    },

    /// Credentials were rejected; no channel can be scraped
    #[error("source rejected credentials: {0}")]
    Unauthorized(String),

    /// The channel does not exist or is not visible to us
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// Any other request failure
    #[error("source request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Errors that can occur while running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Object detection failed for an image
    #[error("Detection error: {0}")]
    Detection(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A pipeline step failed
    #[error("Step '{step}' failed: {message}")]
    Step {
        /// Name of the failing step
        step: String,
        /// Failure description
        message: String,
    },

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// True for failures that must abort the whole run rather than one unit.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Pool(_) | Self::Source(SourceError::Unauthorized(_)) | Self::InvalidConfig(_)
        )
    }
}

/// Convenience type alias for Result with `PipelineError`
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_source_is_fatal() {
        let err = PipelineError::from(SourceError::Unauthorized("bad hash".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn rate_limit_is_not_fatal() {
        let err = PipelineError::from(SourceError::RateLimited {
            retry_after: Duration::from_secs(3),
        });
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Source error: rate limited, retry after 3s");
    }
}
