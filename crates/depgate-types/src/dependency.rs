//! Dependency declarations and their tracking key.

use crate::Ecosystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A dependency declared in a manifest.
///
/// Identity is `(name, ecosystem)`; the version, declaring path and line are
/// attributes. Values are produced by a parser and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name (`lodash`, `org.slf4j:slf4j-api`)
    pub name: String,

    /// Package-manager family
    pub ecosystem: Ecosystem,

    /// Declared version or range, when the manifest states one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Manifest that declares this dependency
    pub manifest: PathBuf,

    /// 1-based line of the declaration, used to anchor diagnostics
    #[serde(default)]
    pub line: u32,
}

impl Dependency {
    /// Create a dependency without a line hint.
    pub fn new(
        name: impl Into<String>,
        ecosystem: Ecosystem,
        version: Option<String>,
        manifest: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            ecosystem,
            version,
            manifest: manifest.into(),
            line: 0,
        }
    }

    /// Attach a line hint.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Human-readable version, `"*"` when none was declared.
    pub fn version_or_any(&self) -> &str {
        self.version.as_deref().unwrap_or("*")
    }

    /// Tracking key of this dependency.
    pub fn key(&self) -> PollKey {
        PollKey::new(&self.manifest, &self.name)
    }
}

/// Identity of a tracked (manifest, dependency) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollKey {
    pub manifest: PathBuf,
    pub name: String,
}

impl PollKey {
    pub fn new(manifest: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            manifest: manifest.as_ref().to_path_buf(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PollKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.manifest.display(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let dep = Dependency::new("lodash", Ecosystem::Npm, Some("4.17.21".into()), "app/package.json");
        assert_eq!(dep.key().to_string(), "app/package.json#lodash");
        assert_eq!(dep.version_or_any(), "4.17.21");
    }

    #[test]
    fn test_version_or_any() {
        let dep = Dependency::new("junit:junit", Ecosystem::Maven, None, "pom.xml").at_line(12);
        assert_eq!(dep.version_or_any(), "*");
        assert_eq!(dep.line, 12);
    }
}
