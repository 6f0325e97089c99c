//! Shared leaf types for the lodestone dependency resolution engine.
//!
//! This crate provides:
//!
//! - [`DependencyName`]: Opaque, exact-match key identifying a requested
//!   binary dependency
//! - [`CacheLayout`]: Derives the cache directory tree from the
//!   host-supplied working directory
//! - [`LogRelay`]: Fire-and-forget line-event relay for external log
//!   subscribers, with a console fallback
//!
//! Nothing here performs network or registry work — the resolution engine
//! lives in `lodestone-resolver` and archive handling in
//! `lodestone-archive`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod layout;
mod name;
mod relay;

pub use layout::CacheLayout;
pub use name::{DependencyName, InvalidNameError};
pub use relay::LogRelay;
