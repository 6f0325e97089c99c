//! Binary loading seam.
//!
//! "Is this a valid binary?" is answered by an explicit validate-and-load
//! primitive rather than by catching load exceptions: [`BinaryLoader::load`]
//! returns a success/failure result, and [`BinaryLoader::probe`] gives the
//! archive discovery path a cheap validity check.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ResolveError, ResolverResult};

/// A loaded binary dependency handed back to the host.
///
/// The handle keeps the underlying library mapped for as long as the host
/// retains it. [`as_any`](LoadedBinary::as_any) allows hosts that know the
/// concrete loader to downcast and reach the raw library handle.
pub trait LoadedBinary: Send + Sync + std::fmt::Debug {
    /// Filesystem path the binary was loaded from.
    fn path(&self) -> &Path;

    /// Downcast support for host-side symbol lookup.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a loaded binary.
pub type Artifact = Arc<dyn LoadedBinary>;

/// Validates and loads binaries from disk.
pub trait BinaryLoader: Send + Sync {
    /// Load the binary at `path`, validating it in the process.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::LoadFailure`] if the file is unreadable or
    /// does not constitute a valid, loadable binary.
    fn load(&self, path: &Path) -> ResolverResult<Artifact>;

    /// Cheap validity probe used during archive discovery.
    fn probe(&self, path: &Path) -> bool {
        self.load(path).is_ok()
    }
}

/// Default loader backed by `libloading`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLoader;

impl NativeLoader {
    /// Create a native loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A natively loaded dynamic library.
pub struct NativeBinary {
    path: PathBuf,
    library: libloading::Library,
}

impl NativeBinary {
    /// The underlying library handle, for symbol lookup by the host.
    #[must_use]
    pub fn library(&self) -> &libloading::Library {
        &self.library
    }
}

impl LoadedBinary for NativeBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for NativeBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBinary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl BinaryLoader for NativeLoader {
    fn load(&self, path: &Path) -> ResolverResult<Artifact> {
        // SAFETY: loading a dynamic library runs its initialization code.
        // That is the entire point of this engine — the host asked for the
        // binary by name and trusts the bytes it registered or fetched.
        let library =
            unsafe { libloading::Library::new(path) }.map_err(|e| ResolveError::LoadFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Arc::new(NativeBinary {
            path: path.to_path_buf(),
            library,
        }))
    }
}
