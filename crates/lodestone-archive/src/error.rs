//! Archive handling error types.

use std::path::PathBuf;

/// Errors from package registration, extraction, and discovery.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive file does not exist.
    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The archive filename has no usable stem to derive the extraction
    /// directory from.
    #[error("archive has no usable filename stem: {0}")]
    InvalidArchiveName(PathBuf),

    /// A remote package name must be a bare filename.
    #[error("invalid package name '{name}': {reason}")]
    InvalidPackageName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A discovery hint must stay inside the extraction directory.
    #[error("invalid discovery hint '{0}': must be a relative path with no parent components")]
    InvalidHint(PathBuf),

    /// The archive is unreadable or corrupt.
    #[error("extraction error: {message}")]
    Extraction {
        /// Description of the extraction failure.
        message: String,
    },

    /// An archive entry escapes the extraction directory.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry path.
        path: String,
    },

    /// The archive has more entries than allowed.
    #[error("archive exceeds maximum entry count ({limit})")]
    TooManyEntries {
        /// The entry-count limit.
        limit: usize,
    },

    /// The archive expands past the allowed total size.
    #[error("archive exceeds maximum extracted size ({limit} bytes)")]
    TooLarge {
        /// The size limit in bytes.
        limit: u64,
    },

    /// Failure from the resolver side (registration or download).
    #[error(transparent)]
    Resolve(#[from] lodestone_resolver::ResolveError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
