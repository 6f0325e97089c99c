//! Cache directory layout.
//!
//! All on-disk state lives under the host-supplied working directory:
//! `<workingDir>/cache/dll/` holds flat cached single-binary downloads,
//! `<workingDir>/cache/nupkg/<archive-stem>/` holds extracted package
//! trees.

use std::path::{Path, PathBuf};

/// Cache directory layout derived from the host's working directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    working_dir: PathBuf,
}

impl CacheLayout {
    /// Create a layout rooted at `working_dir`.
    ///
    /// Does **not** create any directories — call [`ensure`](Self::ensure)
    /// for that.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// The host-supplied working directory this layout is rooted at.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Directory holding flat cached single-binary downloads.
    #[must_use]
    pub fn binary_cache_dir(&self) -> PathBuf {
        self.working_dir.join("cache").join("dll")
    }

    /// Directory holding downloaded packages and their extracted trees.
    #[must_use]
    pub fn package_cache_dir(&self) -> PathBuf {
        self.working_dir.join("cache").join("nupkg")
    }

    /// Extraction target directory for the archive with the given stem.
    #[must_use]
    pub fn package_dir(&self, stem: &str) -> PathBuf {
        self.package_cache_dir().join(stem)
    }

    /// Create the cache directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.binary_cache_dir())?;
        std::fs::create_dir_all(self.package_cache_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = CacheLayout::new("/mods/resolver");
        assert_eq!(
            layout.binary_cache_dir(),
            PathBuf::from("/mods/resolver/cache/dll")
        );
        assert_eq!(
            layout.package_dir("HtmlRenderer.Core.1.5.0.6"),
            PathBuf::from("/mods/resolver/cache/nupkg/HtmlRenderer.Core.1.5.0.6")
        );
    }

    #[test]
    fn ensure_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        layout.ensure().unwrap();
        assert!(layout.binary_cache_dir().is_dir());
        assert!(layout.package_cache_dir().is_dir());
    }
}
