//! Package registration and processing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};
use url::Url;

use lodestone_core::{CacheLayout, LogRelay};
use lodestone_resolver::{BinaryLoader, RemoteFetcher, ResolveError, Resolver};

use crate::discover::{CANDIDATE_DIRS, binaries_in_dir};
use crate::error::{ArchiveError, ArchiveResult};
use crate::extract::extract_package;

/// A package registration buffered before startup.
enum PendingPackage {
    Local {
        archive: PathBuf,
        hint: Option<PathBuf>,
    },
    Remote {
        name: String,
        url: Url,
        hint: Option<PathBuf>,
    },
}

struct HandlerState {
    started: bool,
    package_dir: Option<PathBuf>,
    pending: Vec<PendingPackage>,
}

/// Unpacks dependency packages and registers the binaries found inside.
///
/// Extraction is idempotent: the target directory is derived from the
/// archive's filename stem, and its existence is treated as proof of a
/// prior successful extraction. Discovered binaries are validated with the
/// resolver's loader before registration; damaged files are deleted from
/// disk and logged rather than registered.
///
/// Packages may be added before [`startup`](Self::startup) — they are
/// buffered and processed, in submission order, once the host fires its
/// startup signal.
pub struct PackageHandler {
    resolver: Arc<Resolver>,
    fetcher: Arc<dyn RemoteFetcher>,
    loader: Arc<dyn BinaryLoader>,
    relay: Arc<LogRelay>,
    state: Mutex<HandlerState>,
}

impl PackageHandler {
    /// Create a handler feeding the given resolver, sharing its fetcher,
    /// loader, and log relay.
    #[must_use]
    pub fn new(resolver: Arc<Resolver>) -> Self {
        let fetcher = Arc::clone(resolver.fetcher());
        let loader = Arc::clone(resolver.loader());
        let relay = Arc::clone(resolver.relay());
        Self {
            resolver,
            fetcher,
            loader,
            relay,
            state: Mutex::new(HandlerState {
                started: false,
                package_dir: None,
                pending: Vec::new(),
            }),
        }
    }

    /// Whether [`startup`](Self::startup) has completed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
    }

    /// One-shot startup from the host's startup signal.
    ///
    /// Creates the package cache directory under `working_dir` and
    /// processes every buffered registration in FIFO order. Processing
    /// failures are logged per package without aborting the drain.
    /// Subsequent calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the package cache directory cannot be
    /// created.
    pub async fn startup(&self, working_dir: impl Into<PathBuf>) -> ArchiveResult<()> {
        let (package_dir, pending) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.started {
                return Ok(());
            }
            let package_dir = CacheLayout::new(working_dir).package_cache_dir();
            std::fs::create_dir_all(&package_dir)?;
            state.package_dir = Some(package_dir.clone());
            state.started = true;
            (package_dir, std::mem::take(&mut state.pending))
        };

        info!(count = pending.len(), "Processing buffered packages");
        for entry in pending {
            let outcome = match entry {
                PendingPackage::Local { archive, hint } => {
                    self.process_package(&package_dir, &archive, hint.as_deref())
                },
                PendingPackage::Remote { name, url, hint } => {
                    self.fetch_and_process(&package_dir, &name, &url, hint.as_deref())
                        .await
                },
            };
            if let Err(e) = outcome {
                warn!(error = %e, "Buffered package failed to process");
                self.relay.emit(format!("package failed to process: {e}"));
            }
        }
        Ok(())
    }

    /// Add a package archive to be processed.
    ///
    /// With an internal path `hint`, only that sub-directory of the
    /// extracted tree is searched for binaries; without one, every
    /// existing [`CANDIDATE_DIRS`] entry is searched in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::ArchiveNotFound`] immediately if the file
    /// does not exist, [`ArchiveError::InvalidHint`] if the hint could
    /// escape the extraction directory, and extraction errors when
    /// processing runs.
    pub fn add_package(&self, archive: &Path, hint: Option<&Path>) -> ArchiveResult<()> {
        if !archive.is_file() {
            return Err(ArchiveError::ArchiveNotFound(archive.to_path_buf()));
        }
        if let Some(hint) = hint {
            validate_hint(hint)?;
        }

        let package_dir = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.started {
                debug!(archive = %archive.display(), "Buffering package until startup");
                state.pending.push(PendingPackage::Local {
                    archive: archive.to_path_buf(),
                    hint: hint.map(Path::to_path_buf),
                });
                return Ok(());
            }
            state.package_dir.clone().ok_or_else(|| ArchiveError::Extraction {
                message: "package cache directory missing after startup".into(),
            })?
        };

        self.process_package(&package_dir, archive, hint)
    }

    /// Add a package to be downloaded and processed.
    ///
    /// The archive is stored as `cache/nupkg/<name>` and only downloaded
    /// if that file is not already present. Unlike the single-binary
    /// resolution path, this download carries **no deadline** — archives
    /// can be large, and the host explicitly asked for this package, so
    /// the wait is unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidPackageName`] for names that are not
    /// bare filenames, [`ArchiveError::InvalidHint`] for hints that could
    /// escape the extraction directory, URL parse errors immediately, and
    /// download or extraction errors when processing runs.
    pub async fn add_package_from_url(
        &self,
        name: &str,
        url: &str,
        hint: Option<&Path>,
    ) -> ArchiveResult<()> {
        validate_package_name(name)?;
        if let Some(hint) = hint {
            validate_hint(hint)?;
        }
        let url = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let package_dir = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.started {
                debug!(name, "Buffering remote package until startup");
                state.pending.push(PendingPackage::Remote {
                    name: name.to_string(),
                    url,
                    hint: hint.map(Path::to_path_buf),
                });
                return Ok(());
            }
            state.package_dir.clone().ok_or_else(|| ArchiveError::Extraction {
                message: "package cache directory missing after startup".into(),
            })?
        };

        self.fetch_and_process(&package_dir, name, &url, hint).await
    }

    async fn fetch_and_process(
        &self,
        package_dir: &Path,
        name: &str,
        url: &Url,
        hint: Option<&Path>,
    ) -> ArchiveResult<()> {
        let archive = package_dir.join(name);
        if archive.is_file() {
            debug!(name, "Package already downloaded");
        } else {
            self.relay.emit(format!("downloading package {name}"));
            self.relay.emit(format!("url {url}"));
            let bytes = self.fetcher.fetch(url).await.map_err(ArchiveError::from)?;
            tokio::fs::write(&archive, &bytes).await?;
        }
        self.process_package(package_dir, &archive, hint)
    }

    fn process_package(
        &self,
        package_dir: &Path,
        archive: &Path,
        hint: Option<&Path>,
    ) -> ArchiveResult<()> {
        let stem = archive
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ArchiveError::InvalidArchiveName(archive.to_path_buf()))?;
        let extraction_dir = package_dir.join(stem);

        if extraction_dir.is_dir() {
            // Existence of the extraction directory is taken as proof of a
            // prior successful extraction; contents are not verified.
            debug!(stem, "Package already extracted, skipping");
        } else {
            self.relay.emit(format!("extracting package {stem}"));
            extract_package(archive, &extraction_dir)?;
        }

        if let Some(hint) = hint {
            self.register_dir(&extraction_dir.join(hint));
        } else {
            for candidate in CANDIDATE_DIRS {
                let dir = extraction_dir.join(candidate);
                if dir.is_dir() {
                    self.register_dir(&dir);
                }
            }
        }
        Ok(())
    }

    /// Register every binary directly inside `dir` that passes the
    /// loader's probe, deleting damaged files. A name already registered
    /// keeps its earlier (higher-priority) registration.
    fn register_dir(&self, dir: &Path) {
        let paths = match binaries_in_dir(dir) {
            Ok(paths) => paths,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable candidate directory");
                return;
            },
        };

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.loader.probe(&path) {
                warn!(path = %path.display(), "Deleting damaged binary from package");
                self.relay.emit(format!("deleting damaged binary {stem}"));
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to delete damaged binary");
                }
                continue;
            }
            match self.resolver.register_local(stem, &path) {
                Ok(()) => self.relay.emit(format!("adding extracted binary {stem}")),
                Err(ResolveError::AlreadyRegistered(name)) => {
                    debug!(name = %name, "Name already registered, keeping earlier entry");
                },
                Err(e) => {
                    warn!(name = stem, error = %e, "Failed to register extracted binary");
                },
            }
        }
    }
}

impl std::fmt::Debug for PackageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageHandler")
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// A hint is joined onto the extraction directory, so it must not be able
/// to escape it.
fn validate_hint(hint: &Path) -> ArchiveResult<()> {
    let inside = hint
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)));
    if !inside {
        return Err(ArchiveError::InvalidHint(hint.to_path_buf()));
    }
    Ok(())
}

/// Remote package names become cache filenames, so they must be bare.
fn validate_package_name(name: &str) -> ArchiveResult<()> {
    if name.trim().is_empty() {
        return Err(ArchiveError::InvalidPackageName {
            name: name.to_string(),
            reason: "name must not be empty".into(),
        });
    }
    let is_bare = Path::new(name)
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)))
        && Path::new(name).components().count() == 1;
    if !is_bare {
        return Err(ArchiveError::InvalidPackageName {
            name: name.to_string(),
            reason: "name must be a bare filename".into(),
        });
    }
    Ok(())
}
