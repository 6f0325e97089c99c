//! Resolution registry and the on-demand resolution procedure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};
use url::Url;

use lodestone_core::{CacheLayout, DependencyName, LogRelay};

use crate::error::{ResolveError, ResolverResult};
use crate::fetch::RemoteFetcher;
use crate::loader::{Artifact, BinaryLoader};

/// Soft deadline for a single-binary remote fetch.
///
/// Exceeding it counts as failure and negative-caches the name. The
/// timeout drops the in-flight transfer, so the underlying I/O is
/// cancelled rather than left running.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(10);

/// A remote registration buffered before initialization.
struct PendingRemote {
    name: DependencyName,
    url: Url,
}

/// Pre-init queue state. The flag and the queue live behind one mutex so
/// enqueue can never race the one-shot drain.
struct PreInit {
    initialized: bool,
    queue: Vec<PendingRemote>,
}

/// Resolution registry plus the resolution procedure.
///
/// Construct once at process start, register dependencies (any time),
/// call [`initialize`](Self::initialize) from the host's startup signal,
/// and wire [`resolve`](Self::resolve) into the host's loader hook.
///
/// All state is guarded for concurrent use: registration and resolution
/// may interleave freely across the host's threads.
pub struct Resolver {
    local: DashMap<DependencyName, PathBuf>,
    remote: DashMap<DependencyName, Url>,
    failed: DashSet<DependencyName>,
    pre_init: Mutex<PreInit>,
    layout: OnceLock<CacheLayout>,
    fetcher: Arc<dyn RemoteFetcher>,
    loader: Arc<dyn BinaryLoader>,
    relay: Arc<LogRelay>,
}

impl Resolver {
    /// Create a resolver with explicit fetcher and loader implementations.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        loader: Arc<dyn BinaryLoader>,
        relay: Arc<LogRelay>,
    ) -> Self {
        Self {
            local: DashMap::new(),
            remote: DashMap::new(),
            failed: DashSet::new(),
            pre_init: Mutex::new(PreInit {
                initialized: false,
                queue: Vec::new(),
            }),
            layout: OnceLock::new(),
            fetcher,
            loader,
            relay,
        }
    }

    /// Create a resolver with the default HTTP fetcher and native loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn native(relay: Arc<LogRelay>) -> ResolverResult<Self> {
        Ok(Self::new(
            Arc::new(crate::fetch::HttpFetcher::new()?),
            Arc::new(crate::loader::NativeLoader::new()),
            relay,
        ))
    }

    /// The log relay this resolver emits to.
    #[must_use]
    pub fn relay(&self) -> &Arc<LogRelay> {
        &self.relay
    }

    /// The loader this resolver validates binaries with.
    #[must_use]
    pub fn loader(&self) -> &Arc<dyn BinaryLoader> {
        &self.loader
    }

    /// The fetcher this resolver downloads binaries with.
    #[must_use]
    pub fn fetcher(&self) -> &Arc<dyn RemoteFetcher> {
        &self.fetcher
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pre_init
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .initialized
    }

    // -----------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------

    /// Record a known-good local artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::AlreadyRegistered`] if a local artifact with
    /// this name exists — duplicates are rejected explicitly rather than
    /// upserted, and never crash the host.
    pub fn register_local(&self, name: &str, path: impl Into<PathBuf>) -> ResolverResult<()> {
        let name = DependencyName::new(name)?;
        match self.local.entry(name.clone()) {
            Entry::Occupied(_) => Err(ResolveError::AlreadyRegistered(name)),
            Entry::Vacant(entry) => {
                let path = path.into();
                debug!(name = %name, path = %path.display(), "Registered local dependency");
                self.relay.emit(format!("adding file dependency {name}"));
                entry.insert(path);
                Ok(())
            },
        }
    }

    /// Record a not-yet-fetched remote binary.
    ///
    /// Before [`initialize`](Self::initialize) the registration is buffered
    /// and replayed, in submission order, at initialization.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidUrl`] if the URL does not parse —
    /// malformed registrations fail here, not later during resolution.
    pub fn register_remote(&self, name: &str, url: &str) -> ResolverResult<()> {
        let name = DependencyName::new(name)?;
        let url = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut pre_init = self.pre_init.lock().unwrap_or_else(PoisonError::into_inner);
        if pre_init.initialized {
            drop(pre_init);
            self.insert_remote(name, url);
        } else {
            debug!(name = %name, "Buffering remote registration until initialization");
            pre_init.queue.push(PendingRemote { name, url });
        }
        Ok(())
    }

    fn insert_remote(&self, name: DependencyName, url: Url) {
        debug!(name = %name, url = %url, "Registered remote dependency");
        self.relay.emit(format!("adding web dependency {name}"));
        self.remote.insert(name, url);
    }

    /// Add a name to the negative cache. Idempotent.
    pub fn mark_failed(&self, name: &str) {
        let Ok(name) = DependencyName::new(name) else {
            return;
        };
        if self.failed.insert(name.clone()) {
            debug!(name = %name, "Marked dependency as permanently failed");
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Path of a locally registered artifact, if any.
    #[must_use]
    pub fn lookup_local(&self, name: &str) -> Option<PathBuf> {
        let name = DependencyName::new(name).ok()?;
        self.local.get(&name).map(|entry| entry.value().clone())
    }

    /// URL of a remotely registered artifact, if any.
    #[must_use]
    pub fn lookup_remote(&self, name: &str) -> Option<Url> {
        let name = DependencyName::new(name).ok()?;
        self.remote.get(&name).map(|entry| entry.value().clone())
    }

    /// Whether the name is in the negative cache.
    #[must_use]
    pub fn is_failed(&self, name: &str) -> bool {
        DependencyName::new(name)
            .map(|name| self.failed.contains(&name))
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------

    /// One-shot initialization from the host's startup signal.
    ///
    /// Creates the cache directory layout under `working_dir`, registers
    /// every loadable binary already present in the flat binary cache
    /// (deleting damaged ones), then drains the pre-init queue in FIFO
    /// order. Subsequent calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache directories cannot be created.
    pub fn initialize(&self, working_dir: impl Into<PathBuf>) -> ResolverResult<()> {
        let pending = {
            let mut pre_init = self.pre_init.lock().unwrap_or_else(PoisonError::into_inner);
            if pre_init.initialized {
                return Ok(());
            }

            let layout = CacheLayout::new(working_dir);
            layout.ensure()?;
            self.scan_binary_cache(&layout.binary_cache_dir());
            let _ = self.layout.set(layout);

            pre_init.initialized = true;
            std::mem::take(&mut pre_init.queue)
        };

        info!(count = pending.len(), "Draining pre-init queue");
        for entry in pending {
            self.insert_remote(entry.name, entry.url);
        }
        Ok(())
    }

    /// Register every loadable binary already sitting in the flat cache,
    /// deleting damaged files. Cached binaries are keyed by file stem.
    fn scan_binary_cache(&self, cache_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(cache_dir) else {
            return;
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.loader.load(&path) {
                Ok(_) => {
                    self.relay
                        .emit(format!("adding locally cached binary {stem}"));
                    if let Err(e) = self.register_local(stem, &path) {
                        debug!(name = stem, error = %e, "Skipping cached binary");
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Deleting damaged cached binary");
                    self.relay.emit(format!("deleting damaged binary {stem}"));
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to delete damaged binary");
                    }
                },
            }
        }
    }

    // -----------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------

    /// Resolve a name to a loaded artifact.
    ///
    /// This is the callback the host's loader hook invokes. It never
    /// returns an error: every internal failure collapses to `None`, with
    /// remote failures additionally negative-cached so they are never
    /// retried this run. An unknown name resolves to `None` with no side
    /// effects at all.
    pub async fn resolve(&self, name: &str) -> Option<Artifact> {
        let name = DependencyName::new(name).ok()?;

        // Local registration takes absolute precedence: a load failure
        // here must not fall through to a remote source for the same name.
        if let Some(path) = self.local.get(&name).map(|entry| entry.value().clone()) {
            self.relay
                .emit(format!("resolving file dependency {name}"));
            return match self.loader.load(&path) {
                Ok(artifact) => {
                    self.relay.emit(format!("successfully resolved {name}"));
                    Some(artifact)
                },
                Err(e) => {
                    warn!(name = %name, error = %e, "Local dependency failed to load");
                    None
                },
            };
        }

        let url = self.remote.get(&name).map(|entry| entry.value().clone())?;
        if self.failed.contains(&name) {
            // Steady-state fast path for a previously failed name.
            return None;
        }
        self.resolve_remote(&name, &url).await
    }

    async fn resolve_remote(&self, name: &DependencyName, url: &Url) -> Option<Artifact> {
        let Some(layout) = self.layout.get() else {
            warn!(name = %name, "Remote resolution requested before initialization");
            return None;
        };

        self.relay.emit(format!("resolving web dependency {name}"));
        self.relay.emit(format!("url {url}"));

        let fetched = tokio::time::timeout(FETCH_DEADLINE, self.fetcher.fetch(url)).await;
        let bytes = match fetched {
            Err(_elapsed) => {
                warn!(name = %name, url = %url, "Download exceeded deadline");
                self.relay
                    .emit(format!("download of {name} timed out, giving up on it"));
                self.failed.insert(name.clone());
                return None;
            },
            Ok(Err(e)) => {
                warn!(name = %name, url = %url, error = %e, "Download failed");
                self.relay.emit(format!("download of {name} failed: {e}"));
                self.failed.insert(name.clone());
                return None;
            },
            Ok(Ok(bytes)) => bytes,
        };

        let Some(filename) = last_path_segment(url) else {
            warn!(name = %name, url = %url, "URL has no usable filename segment");
            self.failed.insert(name.clone());
            return None;
        };
        let target = layout.binary_cache_dir().join(filename);

        if let Err(e) = tokio::fs::write(&target, &bytes).await {
            warn!(name = %name, path = %target.display(), error = %e, "Failed to persist download");
            self.failed.insert(name.clone());
            return None;
        }

        match self.loader.load(&target) {
            Ok(artifact) => {
                // Future resolutions of this name go straight to disk.
                self.local.insert(name.clone(), target);
                self.relay.emit(format!("successfully resolved {name}"));
                Some(artifact)
            },
            Err(e) => {
                warn!(name = %name, error = %e, "Downloaded bytes are not a loadable binary");
                self.relay
                    .emit(format!("downloaded {name} but it failed to load: {e}"));
                self.failed.insert(name.clone());
                None
            },
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("local", &self.local.len())
            .field("remote", &self.remote.len())
            .field("failed", &self.failed.len())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Last non-empty path segment of a URL, used as the cache filename.
fn last_path_segment(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
}
