//! Error taxonomy for the archive.
//!
//! Errors are split by how the caller is expected to react:
//! - Fatal to an ingest run: [`ArchiveError::SourceUnreachable`], [`ArchiveError::Storage`]
//! - Downgraded to a counted outcome: [`ArchiveError::PerArticleFetch`], [`ArchiveError::Constraint`]
//! - Surfaced to the tool caller as-is: [`ArchiveError::TooManyRequested`],
//!   [`ArchiveError::NotFound`], [`ArchiveError::InvalidInput`]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source unreachable ({target}): {reason}")]
    SourceUnreachable { target: String, reason: String },

    #[error("failed to fetch article {url}: {reason}")]
    PerArticleFetch { url: String, reason: String },

    #[error("article already stored: {url}")]
    Constraint { url: String },

    #[error("too many articles requested: {requested} (max {max})")]
    TooManyRequested { requested: usize, max: usize },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ArchiveError {
    /// Errors that describe a bad request rather than a broken system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ArchiveError::TooManyRequested { .. }
                | ArchiveError::InvalidInput(_)
                | ArchiveError::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
