//! Dependency normalization and hashing
//!
//! Raw specifiers from a script are parsed, rendered canonically and
//! collected into a sorted set. The set's hash addresses the cached
//! environment, so normalization must be deterministic: changing it
//! changes every cache key.

mod hash;
mod requirement;

pub use hash::{hash_dependencies, CacheKey};
pub use requirement::{normalize_name, Requirement};

use crate::error::IdaeResult;
use std::collections::BTreeSet;

/// Canonical, deduplicated, sorted dependency specifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDependencySet {
    specs: BTreeSet<String>,
}

impl NormalizedDependencySet {
    /// Normalize raw specifiers as written in a script
    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> IdaeResult<Self> {
        let specs = raw
            .iter()
            .map(|s| Requirement::parse(s.as_ref()).map(|r| r.to_string()))
            .collect::<IdaeResult<BTreeSet<_>>>()?;
        Ok(Self { specs })
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Canonical specifiers in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(String::as_str)
    }

    /// Owned copy of the sorted specifiers, as passed to the installer
    pub fn to_vec(&self) -> Vec<String> {
        self.specs.iter().cloned().collect()
    }
}
