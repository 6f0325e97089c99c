//! Binary discovery inside extracted packages.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Candidate sub-directories searched when no internal path hint is given.
///
/// Packages place their binaries under case/separator variants of the
/// target framework moniker; every candidate that exists is processed, in
/// this priority order — not merely the first match.
pub const CANDIDATE_DIRS: &[&str] = &[
    "lib/net35-client",
    "lib/net35",
    "lib/35-client",
    "lib/35",
    "net35-client",
    "net35",
    "35-client",
    "35",
];

/// Extensions that mark a file as a loadable binary.
const BINARY_EXTENSIONS: &[&str] = &["dll", "so", "dylib"];

/// Whether the path carries a dynamic-library extension.
pub(crate) fn is_binary_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext))
}

/// Binary candidates directly inside `dir`, sorted by filename so that
/// registration order is deterministic.
pub(crate) fn binaries_in_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_binary_candidate(path))
        .collect();
    paths.sort();
    Ok(paths)
}
