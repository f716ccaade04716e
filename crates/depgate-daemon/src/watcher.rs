//! Polling manifest watcher.
//!
//! Each scan walks the workspace, reads every supported manifest and compares
//! it with the content seen last time. Differences become [`ManifestEvent`]s
//! that are handed to the orchestrator, one concurrent batch per scan so that
//! events for the same file never overtake each other.

use crate::error::{DaemonError, DaemonResult};
use depgate_core::bootstrap::discover_manifests;
use depgate_core::LifecycleOrchestrator;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// A manifest appeared, changed or disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEvent {
    Changed { path: PathBuf, content: String },
    Deleted { path: PathBuf },
}

impl ManifestEvent {
    pub fn path(&self) -> &Path {
        match self {
            ManifestEvent::Changed { path, .. } | ManifestEvent::Deleted { path } => path,
        }
    }
}

pub struct ManifestWatcher {
    root: PathBuf,
    snapshots: HashMap<PathBuf, String>,
}

impl ManifestWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshots: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of manifests seen by the last scan.
    pub fn known(&self) -> usize {
        self.snapshots.len()
    }

    /// Scan once and report what differs from the previous scan.
    pub async fn poll(&mut self) -> DaemonResult<Vec<ManifestEvent>> {
        let root = self.root.clone();
        let found = tokio::task::spawn_blocking(move || discover_manifests(&root))
            .await
            .map_err(|e| DaemonError::Scan(e.to_string()))?;

        let mut seen = HashSet::with_capacity(found.len());
        let mut events = Vec::new();
        for (path, _) in found {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    seen.insert(path.clone());
                    if self.snapshots.get(&path) != Some(&content) {
                        self.snapshots.insert(path.clone(), content.clone());
                        events.push(ManifestEvent::Changed { path, content });
                    }
                }
                // Removed between the walk and the read; reported below.
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(manifest = %path.display(), error = %err, "Cannot read manifest");
                    seen.insert(path);
                }
            }
        }

        let mut gone: Vec<PathBuf> = self
            .snapshots
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        gone.sort();
        for path in gone {
            self.snapshots.remove(&path);
            events.push(ManifestEvent::Deleted { path });
        }

        Ok(events)
    }

    /// Scan every `interval` and feed the orchestrator until the future is
    /// dropped.
    pub async fn run(mut self, orchestrator: LifecycleOrchestrator, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.poll().await {
                Ok(events) if events.is_empty() => {}
                Ok(events) => {
                    debug!(events = events.len(), "Manifest changes detected");
                    dispatch(&orchestrator, events).await;
                }
                Err(err) => warn!(error = %err, "Workspace scan failed"),
            }
        }
    }
}

/// Hand one scan's events to the orchestrator.
pub async fn dispatch(orchestrator: &LifecycleOrchestrator, events: Vec<ManifestEvent>) {
    join_all(events.into_iter().map(|event| async move {
        match event {
            ManifestEvent::Changed { path, content } => {
                orchestrator.handle_manifest_change(&path, &content).await
            }
            ManifestEvent::Deleted { path } => orchestrator.handle_manifest_deleted(&path).await,
        }
    }))
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PACKAGE_JSON: &str = r#"{ "dependencies": { "left-pad": "1.3.0" } }"#;

    #[tokio::test]
    async fn test_first_scan_reports_every_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), PACKAGE_JSON).unwrap();
        fs::create_dir(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("api/pom.xml"), "<project/>").unwrap();
        fs::write(dir.path().join("README.md"), "# shop").unwrap();

        let mut watcher = ManifestWatcher::new(dir.path());
        let events = watcher.poll().await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| matches!(event, ManifestEvent::Changed { .. })));
        assert_eq!(watcher.known(), 2);
    }

    #[tokio::test]
    async fn test_only_differences_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, PACKAGE_JSON).unwrap();

        let mut watcher = ManifestWatcher::new(dir.path());
        watcher.poll().await.unwrap();
        assert!(watcher.poll().await.unwrap().is_empty());

        let revised = r#"{ "dependencies": { "left-pad": "1.3.0", "lodash": "4.17.21" } }"#;
        fs::write(&manifest, revised).unwrap();
        assert_eq!(
            watcher.poll().await.unwrap(),
            vec![ManifestEvent::Changed {
                path: manifest.clone(),
                content: revised.to_string(),
            }]
        );

        fs::remove_file(&manifest).unwrap();
        assert_eq!(
            watcher.poll().await.unwrap(),
            vec![ManifestEvent::Deleted { path: manifest }]
        );
        assert_eq!(watcher.known(), 0);
    }

    #[tokio::test]
    async fn test_vendored_manifests_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        fs::write(dir.path().join("node_modules/left-pad/package.json"), PACKAGE_JSON).unwrap();

        let mut watcher = ManifestWatcher::new(dir.path());
        assert!(watcher.poll().await.unwrap().is_empty());
    }
}
