//! Manifest parsers.
//!
//! Parser dispatch is a closed sum type selected by a total match over the
//! manifest's file name. Files no parser claims are simply not tracked.

mod gradle;
mod maven;
mod npm;

use crate::error::ParseError;
use depgate_types::{Dependency, Ecosystem};
use std::collections::HashSet;
use std::path::Path;

/// A manifest parser for one ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserCapability {
    Npm,
    Maven,
    Gradle,
}

impl ParserCapability {
    /// Select the parser for a manifest path, if any.
    pub fn for_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        [Self::Npm, Self::Maven, Self::Gradle]
            .into_iter()
            .find(|parser| parser.supports(name))
    }

    /// Whether this parser understands a file with the given name.
    pub fn supports(&self, filename: &str) -> bool {
        match self {
            Self::Npm => filename == "package.json",
            Self::Maven => filename == "pom.xml",
            Self::Gradle => filename == "build.gradle" || filename == "build.gradle.kts",
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            Self::Npm => Ecosystem::Npm,
            Self::Maven => Ecosystem::Maven,
            Self::Gradle => Ecosystem::Gradle,
        }
    }

    /// Every dependency declared in `content`, in declaration order with
    /// duplicate names collapsed to their first declaration.
    ///
    /// Blank content is a manifest with no dependencies, not an error.
    pub fn parse_all(&self, manifest: &Path, content: &str) -> Result<Vec<Dependency>, ParseError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let deps = match self {
            Self::Npm => npm::parse(manifest, content)?,
            Self::Maven => maven::parse(manifest, content)?,
            Self::Gradle => gradle::parse(manifest, content)?,
        };
        let mut seen = HashSet::new();
        Ok(deps
            .into_iter()
            .filter(|dep| seen.insert(dep.name.clone()))
            .collect())
    }

    /// Dependencies present in `current` whose names are absent from
    /// `previous`. Unparseable content counts as having no dependencies.
    pub fn parse_added(&self, manifest: &Path, current: &str, previous: &str) -> Vec<Dependency> {
        let previous: HashSet<String> = self
            .parse_all(manifest, previous)
            .unwrap_or_default()
            .into_iter()
            .map(|dep| dep.name)
            .collect();
        self.parse_all(manifest, current)
            .unwrap_or_default()
            .into_iter()
            .filter(|dep| !previous.contains(&dep.name))
            .collect()
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            ecosystem: self.ecosystem(),
            reason: reason.into(),
        }
    }
}

/// 1-based line number of a byte offset.
pub(crate) fn line_of(content: &str, offset: usize) -> u32 {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u32 + 1
}
