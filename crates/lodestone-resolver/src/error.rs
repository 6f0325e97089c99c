//! Resolver error types.

use std::path::PathBuf;

use lodestone_core::DependencyName;

/// Errors from registration and resolution operations.
///
/// Note that [`Resolver::resolve`](crate::Resolver::resolve) never returns
/// these across the host boundary — internal failures collapse to `None`
/// plus a negative-cache update, and an unknown name is plain `None`.
/// Registration-time errors, by contrast, surface immediately to the
/// registering caller.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A local artifact with this name is already registered.
    #[error("dependency already registered: {0}")]
    AlreadyRegistered(DependencyName),

    /// The dependency name is structurally unusable.
    #[error("invalid dependency name: {0}")]
    InvalidName(String),

    /// A URL could not be parsed or uses an unsupported scheme.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// The bytes or path do not constitute a valid, loadable binary.
    #[error("load failed for {path}: {message}")]
    LoadFailure {
        /// Path of the binary that failed to load.
        path: PathBuf,
        /// Failure reason.
        message: String,
    },

    /// Transport-level download failure.
    #[error("download failed for {url}: {message}")]
    DownloadFailure {
        /// The URL being fetched.
        url: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The response body was empty.
    #[error("empty response body from {url}")]
    EmptyDownload {
        /// The URL that produced no data.
        url: String,
    },

    /// The response body exceeded the maximum allowed size.
    #[error("download too large: {size} bytes (limit: {limit} bytes)")]
    DownloadTooLarge {
        /// Bytes received before the limit tripped.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: u64,
    },

    /// The HTTP client could not be constructed.
    #[error("fetcher setup failed: {0}")]
    FetcherSetup(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lodestone_core::InvalidNameError> for ResolveError {
    fn from(e: lodestone_core::InvalidNameError) -> Self {
        Self::InvalidName(e.to_string())
    }
}

/// Result type for resolver operations.
pub type ResolverResult<T> = Result<T, ResolveError>;
