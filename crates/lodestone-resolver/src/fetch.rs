//! Remote binary fetching.
//!
//! The fetcher produces either a non-empty byte sequence or an explicit
//! error — absence of data is never signalled through a sentinel length.
//! It performs no registry mutation; negative caching is the resolution
//! procedure's responsibility.

use async_trait::async_trait;
use url::Url;

use crate::error::{ResolveError, ResolverResult};

/// Maximum accepted download size (100 MB).
pub const MAX_DOWNLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Downloads a single binary from a URL.
///
/// Implementations must not mutate any registry state. Deadlines are the
/// caller's concern: the resolution procedure wraps `fetch` in a bounded
/// timeout for single binaries, while the archive path deliberately waits
/// unbounded.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the bytes at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DownloadFailure`] on transport errors,
    /// [`ResolveError::EmptyDownload`] if the body is empty, and
    /// [`ResolveError::DownloadTooLarge`] past [`MAX_DOWNLOAD_SIZE`].
    async fn fetch(&self, url: &Url) -> ResolverResult<Vec<u8>>;
}

/// Default fetcher supporting `http`, `https`, and `file` URL schemes.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default client configuration.
    ///
    /// The client carries no request timeout of its own so that the
    /// caller's deadline (or deliberate absence of one) governs.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::FetcherSetup`] if the HTTP client cannot
    /// be constructed.
    pub fn new() -> ResolverResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("lodestone-resolver")
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ResolveError::FetcherSetup(e.to_string()))?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &Url) -> ResolverResult<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ResolveError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ResolveError::DownloadFailure {
                url: url.to_string(),
                message: format!("server returned {}", response.status()),
            });
        }

        if let Some(len) = response.content_length()
            && len > MAX_DOWNLOAD_SIZE
        {
            return Err(ResolveError::DownloadTooLarge {
                size: len,
                limit: MAX_DOWNLOAD_SIZE,
            });
        }

        download_with_limit(url, response, MAX_DOWNLOAD_SIZE).await
    }

    async fn fetch_file(url: &Url) -> ResolverResult<Vec<u8>> {
        let path = url
            .to_file_path()
            .map_err(|()| ResolveError::InvalidUrl {
                url: url.to_string(),
                message: "not a valid file path".into(),
            })?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ResolveError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(bytes)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> ResolverResult<Vec<u8>> {
        let bytes = match url.scheme() {
            "http" | "https" => self.fetch_http(url).await?,
            "file" => Self::fetch_file(url).await?,
            other => {
                return Err(ResolveError::InvalidUrl {
                    url: url.to_string(),
                    message: format!("unsupported url scheme '{other}'"),
                });
            },
        };

        if bytes.is_empty() {
            return Err(ResolveError::EmptyDownload {
                url: url.to_string(),
            });
        }
        Ok(bytes)
    }
}

/// Stream a response body, failing once `max_size` is exceeded.
async fn download_with_limit(
    url: &Url,
    response: reqwest::Response,
    max_size: u64,
) -> ResolverResult<Vec<u8>> {
    use futures::StreamExt;

    let capacity =
        usize::try_from(response.content_length().unwrap_or(0).min(max_size)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ResolveError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        bytes.extend_from_slice(&chunk);
        let current_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if current_size > max_size {
            return Err(ResolveError::DownloadTooLarge {
                size: current_size,
                limit: max_size,
            });
        }
    }

    Ok(bytes)
}
