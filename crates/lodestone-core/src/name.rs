//! Dependency name key type.

use std::fmt;

/// Opaque, process-unique identifier for a binary dependency.
///
/// Names are supplied by the host loader (e.g. a binary's fully qualified
/// identity string) and matched exactly — no normalization, no versioning.
/// The only structural requirement is that a name is not empty or
/// whitespace-only, since such a key could never be requested back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyName(String);

/// Error returned when a dependency name is structurally unusable.
#[derive(Debug, thiserror::Error)]
#[error("dependency name must not be empty")]
pub struct InvalidNameError;

impl DependencyName {
    /// Create a new `DependencyName`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNameError`] if the name is empty or contains only
    /// whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidNameError);
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DependencyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
