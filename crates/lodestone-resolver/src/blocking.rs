//! Synchronous facade for hosts with a blocking loader hook.

use std::sync::Arc;

use crate::error::ResolverResult;
use crate::loader::Artifact;
use crate::resolver::Resolver;

/// Adapts the async [`Resolver`] to a synchronous loader hook.
///
/// Owns a current-thread runtime; each call blocks the calling thread for
/// at most the resolver's bounded fetch deadline (plus local disk I/O).
/// Must not be called from inside an async runtime — the host's loader
/// hook is expected to fire on a plain thread.
#[derive(Debug)]
pub struct BlockingResolver {
    inner: Arc<Resolver>,
    runtime: tokio::runtime::Runtime,
}

impl BlockingResolver {
    /// Wrap a resolver in a blocking facade.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the runtime cannot be created.
    pub fn new(inner: Arc<Resolver>) -> ResolverResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { inner, runtime })
    }

    /// Resolve a name, blocking the calling thread.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Artifact> {
        self.runtime.block_on(self.inner.resolve(name))
    }

    /// The wrapped resolver, for registration calls.
    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.inner
    }
}
