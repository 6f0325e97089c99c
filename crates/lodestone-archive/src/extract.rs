//! Hardened zip extraction.
//!
//! Extracts a package archive while guarding against:
//! - Path traversal (`../` components, absolute paths)
//! - Excessive entry counts
//! - Decompression bombs (cumulative extracted size)
//!
//! A failed extraction removes whatever it wrote, so the existence of the
//! target directory only ever means a run completed.

use std::io::Read;
use std::path::Path;

use crate::error::{ArchiveError, ArchiveResult};

/// Maximum number of entries allowed in an archive.
const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total extracted size (500 MB).
const MAX_EXTRACTED_SIZE: u64 = 500_000_000;

/// Extract the archive at `archive` into `dest`, creating it.
///
/// # Errors
///
/// Returns [`ArchiveError::Extraction`] on unreadable/corrupt/empty
/// archives, [`ArchiveError::PathTraversal`] on malicious entry paths, and
/// the limit variants past [`MAX_ENTRY_COUNT`] / [`MAX_EXTRACTED_SIZE`].
/// On any error the partially written `dest` is removed.
pub fn extract_package(archive: &Path, dest: &Path) -> ArchiveResult<()> {
    let file = std::fs::File::open(archive)?;
    let mut package = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Extraction {
        message: format!("failed to read archive {}: {e}", archive.display()),
    })?;

    if package.is_empty() {
        return Err(ArchiveError::Extraction {
            message: "archive is empty".into(),
        });
    }
    if package.len() > MAX_ENTRY_COUNT {
        return Err(ArchiveError::TooManyEntries {
            limit: MAX_ENTRY_COUNT,
        });
    }

    std::fs::create_dir_all(dest)?;
    let result = extract_entries(&mut package, dest);
    if result.is_err() {
        // A failed extraction must not masquerade as a completed one on
        // the next idempotence check.
        let _ = std::fs::remove_dir_all(dest);
    }
    result
}

fn extract_entries(
    package: &mut zip::ZipArchive<std::fs::File>,
    dest: &Path,
) -> ArchiveResult<()> {
    let mut total_size: u64 = 0;

    for index in 0..package.len() {
        let mut entry = package
            .by_index(index)
            .map_err(|e| ArchiveError::Extraction {
                message: format!("failed to read archive entry {index}: {e}"),
            })?;

        // `enclosed_name` yields None for absolute paths and any `..`
        // component that could escape the destination.
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::PathTraversal {
                path: entry.name().to_string(),
            });
        };

        total_size = total_size.saturating_add(entry.size());
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(ArchiveError::TooLarge {
                limit: MAX_EXTRACTED_SIZE,
            });
        }

        let target = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut output = std::fs::File::create(&target)?;
        copy_entry(&mut entry, &mut output)?;
    }

    Ok(())
}

fn copy_entry(entry: &mut impl Read, output: &mut std::fs::File) -> ArchiveResult<()> {
    std::io::copy(entry, output).map_err(|e| ArchiveError::Extraction {
        message: format!("failed to unpack entry: {e}"),
    })?;
    Ok(())
}
