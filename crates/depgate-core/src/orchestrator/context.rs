//! Per-workspace tracking state.

use crate::gate::NotificationGate;
use depgate_types::{Dependency, DependencyStatus, Ecosystem, PollKey};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Last accepted content of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSnapshot {
    pub ecosystem: Ecosystem,
    pub content: String,
}

/// A dependency the engine is driving through approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedDependency {
    pub dependency: Dependency,
    pub status: DependencyStatus,
    pub message: Option<String>,
    pub reason_url: Option<String>,
    /// Incarnation number; responses carrying an older epoch are stale
    #[serde(skip)]
    pub epoch: u64,
}

/// Manifest cache, tracked dependencies and notification gate of one
/// workspace.
#[derive(Debug, Default)]
pub struct TrackingContext {
    manifests: HashMap<PathBuf, ManifestSnapshot>,
    tracked: HashMap<PathBuf, BTreeMap<String, TrackedDependency>>,
    gate: NotificationGate,
    next_epoch: u64,
}

impl TrackingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, manifest: &Path) -> Option<&ManifestSnapshot> {
        self.manifests.get(manifest)
    }

    /// Replace the cached content of `manifest`.
    pub fn cache(&mut self, manifest: &Path, ecosystem: Ecosystem, content: impl Into<String>) {
        self.manifests.insert(
            manifest.to_path_buf(),
            ManifestSnapshot {
                ecosystem,
                content: content.into(),
            },
        );
    }

    pub fn forget_manifest(&mut self, manifest: &Path) -> Option<ManifestSnapshot> {
        self.manifests.remove(manifest)
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests.len()
    }

    /// Name to declared version of everything tracked for `manifest`.
    pub fn tracked_versions(&self, manifest: &Path) -> BTreeMap<String, Option<String>> {
        self.tracked
            .get(manifest)
            .map(|deps| {
                deps.iter()
                    .map(|(name, t)| (name.clone(), t.dependency.version.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tracked_keys(&self, manifest: &Path) -> Vec<PollKey> {
        self.tracked
            .get(manifest)
            .map(|deps| deps.keys().map(|name| PollKey::new(manifest, name.clone())).collect())
            .unwrap_or_default()
    }

    /// Start tracking `dependency`, replacing any earlier incarnation.
    /// Returns the new epoch.
    pub fn track(&mut self, dependency: Dependency, status: DependencyStatus) -> u64 {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        self.gate.forget(&dependency.key());
        let deps = self.tracked.entry(dependency.manifest.clone()).or_default();
        deps.insert(
            dependency.name.clone(),
            TrackedDependency {
                dependency,
                status,
                message: None,
                reason_url: None,
                epoch,
            },
        );
        epoch
    }

    /// Stop tracking; clears the notified set as well.
    pub fn untrack(&mut self, key: &PollKey) -> Option<TrackedDependency> {
        self.gate.forget(key);
        let deps = self.tracked.get_mut(&key.manifest)?;
        let removed = deps.remove(&key.name);
        if deps.is_empty() {
            self.tracked.remove(&key.manifest);
        }
        removed
    }

    pub fn get(&self, key: &PollKey) -> Option<&TrackedDependency> {
        self.tracked.get(&key.manifest)?.get(&key.name)
    }

    pub fn get_mut(&mut self, key: &PollKey) -> Option<&mut TrackedDependency> {
        self.tracked.get_mut(&key.manifest)?.get_mut(&key.name)
    }

    /// Whether `epoch` is still the live incarnation of `key`.
    pub fn is_current(&self, key: &PollKey, epoch: u64) -> bool {
        self.get(key).is_some_and(|t| t.epoch == epoch)
    }

    pub fn tracked_in(&self, manifest: &Path) -> Vec<TrackedDependency> {
        self.tracked
            .get(manifest)
            .map(|deps| deps.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_tracked(&self) -> Vec<TrackedDependency> {
        let mut all: Vec<TrackedDependency> = self
            .tracked
            .values()
            .flat_map(|deps| deps.values().cloned())
            .collect();
        all.sort_by(|a, b| {
            (&a.dependency.manifest, &a.dependency.name)
                .cmp(&(&b.dependency.manifest, &b.dependency.name))
        });
        all
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.values().map(BTreeMap::len).sum()
    }

    pub fn gate_mut(&mut self) -> &mut NotificationGate {
        &mut self.gate
    }

    /// Paths with cached content or tracked dependencies.
    pub fn known_manifests(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .manifests
            .keys()
            .chain(self.tracked.keys())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn clear(&mut self) {
        self.manifests.clear();
        self.tracked.clear();
        self.gate.clear();
    }
}
