//! Package extraction and binary discovery.
//!
//! Dependencies are also distributed as zip-style packages bundling one or
//! more binaries inside a directory tree. [`PackageHandler`] unpacks such
//! an archive into a per-archive cache directory (idempotently — an
//! existing extraction directory is taken as proof of prior success),
//! discovers the loadable binaries inside it by walking a prioritized
//! candidate sub-path list, and registers each with the resolution
//! registry. Damaged binaries are deleted and logged, never registered.
//!
//! Packages registered before the host's startup signal are buffered and
//! processed, in submission order, when [`PackageHandler::startup`] runs.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod discover;
mod error;
mod extract;
mod handler;

pub use discover::CANDIDATE_DIRS;
pub use error::{ArchiveError, ArchiveResult};
pub use extract::extract_package;
pub use handler::PackageHandler;
