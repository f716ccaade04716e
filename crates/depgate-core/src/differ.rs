//! Manifest revision diffing.
//!
//! Given the last known content of a manifest, its new content and the names
//! currently tracked for it, compute which dependencies appeared, which
//! disappeared and which changed version. Parse failures never escape: an
//! unparseable previous revision counts as empty, and an unparseable current
//! revision produces an empty diff with `parsed == false` so the caller keeps
//! its last good snapshot instead of dropping every tracked dependency.

use crate::parser::ParserCapability;
use depgate_types::Dependency;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::warn;

/// Result of diffing two revisions of one manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Newly declared and not yet tracked
    pub added: Vec<Dependency>,

    /// Tracked names no longer declared
    pub removed: BTreeSet<String>,

    /// Tracked and still declared, with a different version
    pub changed: Vec<Dependency>,

    /// Full inventory of the current revision
    pub current: Vec<Dependency>,

    /// False when the current revision could not be parsed
    pub parsed: bool,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Diff two revisions of `manifest`.
///
/// `tracked` maps every dependency name currently tracked for this manifest
/// to its last known declared version.
pub fn diff_manifest(
    parser: ParserCapability,
    manifest: &Path,
    previous: &str,
    current: &str,
    tracked: &BTreeMap<String, Option<String>>,
) -> ManifestDiff {
    let previous_names: HashSet<String> = match parser.parse_all(manifest, previous) {
        Ok(deps) => deps.into_iter().map(|dep| dep.name).collect(),
        Err(err) => {
            warn!(manifest = %manifest.display(), error = %err, "Previous revision unparseable, treating as empty");
            HashSet::new()
        }
    };

    let current = match parser.parse_all(manifest, current) {
        Ok(deps) => deps,
        Err(err) => {
            warn!(manifest = %manifest.display(), error = %err, "Manifest unparseable, keeping last good revision");
            return ManifestDiff::default();
        }
    };

    let current_names: HashSet<&str> = current.iter().map(|dep| dep.name.as_str()).collect();

    let added = current
        .iter()
        .filter(|dep| !previous_names.contains(&dep.name) && !tracked.contains_key(&dep.name))
        .cloned()
        .collect();

    let removed = tracked
        .keys()
        .filter(|name| !current_names.contains(name.as_str()))
        .cloned()
        .collect();

    let changed = current
        .iter()
        .filter(|dep| matches!(tracked.get(&dep.name), Some(version) if *version != dep.version))
        .cloned()
        .collect();

    ManifestDiff {
        added,
        removed,
        changed,
        current,
        parsed: true,
    }
}
