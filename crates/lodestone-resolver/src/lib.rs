//! On-demand binary dependency resolution for a plugin-hosting process.
//!
//! When the host's own loader cannot find a named binary it calls
//! [`Resolver::resolve`], which consults the registry in strict order:
//!
//! 1. A locally registered artifact is loaded from disk. Local
//!    registration takes absolute precedence — a load failure does **not**
//!    fall through to a remote source for the same name.
//! 2. A remotely registered artifact is fetched with a bounded deadline,
//!    persisted under `cache/dll/`, and loaded. Any failure adds the name
//!    to the negative cache so it is never retried this run.
//! 3. Anything else resolves to `None` with no side effects.
//!
//! Failures never cross the host boundary: `resolve` returns
//! `Option<Artifact>`, never an error.
//!
//! Remote registrations submitted before [`Resolver::initialize`] are
//! buffered in a FIFO queue and replayed exactly once at initialization.
//!
//! The seams are traits: [`RemoteFetcher`] (default: [`HttpFetcher`] over
//! `http`/`https`/`file` URLs) and [`BinaryLoader`] (default:
//! [`NativeLoader`] via `libloading`).

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod blocking;
mod error;
mod fetch;
mod loader;
mod resolver;

pub use blocking::BlockingResolver;
pub use error::{ResolveError, ResolverResult};
pub use fetch::{HttpFetcher, MAX_DOWNLOAD_SIZE, RemoteFetcher};
pub use loader::{Artifact, BinaryLoader, LoadedBinary, NativeLoader};
pub use resolver::{FETCH_DEADLINE, Resolver};

pub use lodestone_core::{CacheLayout, DependencyName, LogRelay};
