//! Content-addressed cache keys
//!
//! Same dependency set = same hash, regardless of the order or spacing the
//! script used to declare it.

use super::NormalizedDependencySet;
use crate::python::Version;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// SHA256 of the sorted canonical specifiers with whitespace removed
pub fn hash_dependencies(deps: &NormalizedDependencySet) -> String {
    let mut compact: Vec<String> = deps
        .iter()
        .map(|dep| dep.chars().filter(|c| !c.is_whitespace()).collect())
        .collect();
    compact.sort();

    let mut hasher = Sha256::new();
    for dep in &compact {
        hasher.update(dep.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Location of a cached environment: `<major>.<minor>/<hash>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Interpreter `major.minor`
    pub python: String,
    /// [`hash_dependencies`] digest
    pub hash: String,
}

impl CacheKey {
    pub fn new(python: &Version, deps: &NormalizedDependencySet) -> Self {
        Self {
            python: python.major_minor(),
            hash: hash_dependencies(deps),
        }
    }

    /// Path relative to the cache root
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.python).join(&self.hash)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.python, self.hash)
    }
}
