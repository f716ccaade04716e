//! One-time inventory submission per workspace.
//!
//! The first time a workspace is seen, every manifest is parsed in full and
//! each ecosystem's packages are queued with a single bulk call. Completion
//! is persisted, so later starts skip straight to watching. A manual scan
//! drops the record and runs again unconditionally.

use crate::error::{BootstrapError, BootstrapResult, StoreError};
use crate::gateway::ApprovalApi;
use crate::orchestrator::{LifecycleOrchestrator, SeedManifest};
use crate::parser::ParserCapability;
use crate::sink::NotificationSink;
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use depgate_types::wire::{ProjectRef, QueueRequest};
use depgate_types::{Dependency, Ecosystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

/// Directories never searched for manifests.
pub const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "build",
    "dist",
    ".gradle",
    "vendor",
];

/// Persisted completion marker of a workspace bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceBootstrapRecord {
    pub workspace_id: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Packages queued per ecosystem
    #[serde(default)]
    pub packages: BTreeMap<Ecosystem, usize>,
}

/// Result of a bootstrap entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A completed record already existed; nothing was submitted
    AlreadyCompleted,
    Completed {
        manifests: usize,
        packages: usize,
    },
}

/// Runs and persists the workspace bootstrap.
pub struct BootstrapCoordinator {
    workspace_id: String,
    root: PathBuf,
    project: ProjectRef,
    api: Arc<dyn ApprovalApi>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn NotificationSink>,
    orchestrator: LifecycleOrchestrator,
    watching: AtomicBool,
    running: Mutex<()>,
}

impl BootstrapCoordinator {
    pub fn new(
        workspace_id: impl Into<String>,
        root: impl Into<PathBuf>,
        api: Arc<dyn ApprovalApi>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn NotificationSink>,
        orchestrator: LifecycleOrchestrator,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            root: root.into(),
            project: orchestrator.project().clone(),
            api,
            store,
            notifier,
            orchestrator,
            watching: AtomicBool::new(false),
            running: Mutex::new(()),
        }
    }

    pub fn record_key(&self) -> String {
        format!("bootstrap:{}", self.workspace_id)
    }

    /// Stored record, if any. A corrupt record reads as absent.
    pub async fn record(&self) -> BootstrapResult<Option<WorkspaceBootstrapRecord>> {
        let Some(value) = self.store.get(&self.record_key()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(workspace = %self.workspace_id, error = %err, "Ignoring unreadable bootstrap record");
                Ok(None)
            }
        }
    }

    /// Whether automatic watching may run. Off until a bootstrap succeeds
    /// or a completed record is found, and off again after a failure.
    pub fn watching_enabled(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Run the bootstrap unless this workspace already completed one.
    #[instrument(skip(self), fields(workspace = %self.workspace_id))]
    pub async fn ensure_bootstrapped(&self) -> BootstrapResult<BootstrapOutcome> {
        let _running = self.running.lock().await;
        if self.record().await?.is_some_and(|record| record.completed) {
            debug!("Workspace already bootstrapped");
            self.watching.store(true, Ordering::SeqCst);
            return Ok(BootstrapOutcome::AlreadyCompleted);
        }
        self.run().await
    }

    /// Forget the record and run again, replacing all tracked state.
    #[instrument(skip(self), fields(workspace = %self.workspace_id))]
    pub async fn manual_scan(&self) -> BootstrapResult<BootstrapOutcome> {
        let _running = self.running.lock().await;
        self.store.delete(&self.record_key()).await?;
        self.orchestrator.reset();
        self.run().await
    }

    /// Drop the record so the next start bootstraps again.
    pub async fn reset(&self) -> BootstrapResult<bool> {
        let _running = self.running.lock().await;
        let existed = self.store.delete(&self.record_key()).await?;
        info!(workspace = %self.workspace_id, existed, "Bootstrap record reset");
        Ok(existed)
    }

    async fn run(&self) -> BootstrapResult<BootstrapOutcome> {
        match self.submit_inventory().await {
            Ok(outcome) => {
                self.watching.store(true, Ordering::SeqCst);
                Ok(outcome)
            }
            Err(err) => {
                error!(workspace = %self.workspace_id, error = %err, "Workspace bootstrap failed");
                self.watching.store(false, Ordering::SeqCst);
                self.notifier.bootstrap_failed(&err.to_string());
                Err(err)
            }
        }
    }

    async fn submit_inventory(&self) -> BootstrapResult<BootstrapOutcome> {
        let seeds = self.read_manifests().await?;

        let mut by_ecosystem: BTreeMap<Ecosystem, Vec<Dependency>> = BTreeMap::new();
        for seed in &seeds {
            by_ecosystem
                .entry(seed.ecosystem)
                .or_default()
                .extend(seed.dependencies.iter().cloned());
        }

        for (ecosystem, deps) in &by_ecosystem {
            if deps.is_empty() {
                continue;
            }
            info!(ecosystem = %ecosystem, packages = deps.len(), "Queueing inventory");
            let request = QueueRequest::new(&self.project, *ecosystem, deps);
            self.api
                .queue(&request)
                .await
                .map_err(|source| BootstrapError::Queue {
                    ecosystem: *ecosystem,
                    source,
                })?;
        }

        let packages: BTreeMap<Ecosystem, usize> = by_ecosystem
            .iter()
            .map(|(ecosystem, deps)| (*ecosystem, deps.len()))
            .collect();
        let total = packages.values().sum();
        let record = WorkspaceBootstrapRecord {
            workspace_id: self.workspace_id.clone(),
            completed: true,
            completed_at: Some(Utc::now()),
            packages,
        };
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.store.set(&self.record_key(), value).await?;

        let manifests = seeds.len();
        self.orchestrator.seed(seeds).await;
        info!(manifests, packages = total, "Workspace bootstrap complete");
        Ok(BootstrapOutcome::Completed {
            manifests,
            packages: total,
        })
    }

    async fn read_manifests(&self) -> BootstrapResult<Vec<SeedManifest>> {
        let root = self.root.clone();
        let found = tokio::task::spawn_blocking(move || discover_manifests(&root))
            .await
            .map_err(|err| BootstrapError::Io {
                path: self.root.clone(),
                source: std::io::Error::other(err),
            })?;

        let mut seeds = Vec::with_capacity(found.len());
        for (path, parser) in found {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(BootstrapError::Io { path, source }),
            };
            let dependencies = match parser.parse_all(&path, &content) {
                Ok(deps) => deps,
                Err(err) => {
                    warn!(manifest = %path.display(), error = %err, "Skipping unparseable manifest");
                    continue;
                }
            };
            seeds.push(SeedManifest {
                path,
                ecosystem: parser.ecosystem(),
                content,
                dependencies,
            });
        }
        Ok(seeds)
    }
}

/// Every supported manifest under `root`, skipping dependency and build
/// output directories.
pub fn discover_manifests(root: &Path) -> Vec<(PathBuf, ParserCapability)> {
    let mut found: Vec<(PathBuf, ParserCapability)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let parser = ParserCapability::for_path(entry.path())?;
            Some((entry.into_path(), parser))
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use crate::error::ApiError;
    use crate::sink::InMemoryDiagnostics;
    use crate::store::MemoryStore;
    use crate::testing::{Call, RecordingNotifier, ScriptedApi, Shown};
    use depgate_types::{DependencyStatus, PollKey};
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        api: Arc<ScriptedApi>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: LifecycleOrchestrator,
        coordinator: BootstrapCoordinator,
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn workspace() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "web/package.json",
            r#"{"dependencies": {"lodash": "4.17.21", "express": "4.18.2"}}"#,
        );
        write(
            dir.path(),
            "web/node_modules/lodash/package.json",
            r#"{"dependencies": {"nested": "1.0.0"}}"#,
        );
        write(
            dir.path(),
            "api/pom.xml",
            r#"<project>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
    </dependency>
  </dependencies>
</project>"#,
        );
        write(dir.path(), "api/target/pom.xml", "<project></project>");
        write(dir.path(), "README.md", "# shop");

        let api = ScriptedApi::new();
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let orchestrator = LifecycleOrchestrator::new(
            ProjectRef::new("shop", None),
            PollingConfig::default(),
            api.clone(),
            Arc::new(InMemoryDiagnostics::new()),
            notifier.clone(),
        );
        let coordinator = BootstrapCoordinator::new(
            "shop-ws",
            dir.path(),
            api.clone(),
            store.clone(),
            notifier.clone(),
            orchestrator.clone(),
        );
        Fixture {
            dir,
            api,
            store,
            notifier,
            orchestrator,
            coordinator,
        }
    }

    #[test]
    fn test_discovery_skips_vendor_dirs() {
        let f = workspace();
        let found: Vec<PathBuf> = discover_manifests(f.dir.path())
            .into_iter()
            .map(|(path, _)| path.strip_prefix(f.dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![PathBuf::from("api/pom.xml"), PathBuf::from("web/package.json")]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_queues_once_per_ecosystem() {
        let f = workspace();

        let outcome = f.coordinator.ensure_bootstrapped().await.unwrap();
        assert_eq!(
            outcome,
            BootstrapOutcome::Completed {
                manifests: 2,
                packages: 3
            }
        );
        assert!(f.coordinator.watching_enabled());

        let queued: Vec<Call> = f
            .api
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Queue { .. }))
            .collect();
        assert_eq!(queued.len(), 2);
        assert!(queued.contains(&Call::Queue {
            ecosystem: Ecosystem::Maven,
            packages: vec!["junit:junit".into()],
        }));
        assert_eq!(f.api.requests_for("lodash"), 0);

        let record = f.coordinator.record().await.unwrap().unwrap();
        assert!(record.completed);
        assert_eq!(record.packages[&Ecosystem::Npm], 2);

        let manifest = f.dir.path().join("web/package.json");
        assert_eq!(
            f.orchestrator.status_of(&PollKey::new(&manifest, "lodash")),
            Some(DependencyStatus::Pending)
        );
        assert_eq!(f.notifier.total(), 0);
        f.orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_bootstrap_runs_at_most_once() {
        let f = workspace();
        f.coordinator.ensure_bootstrapped().await.unwrap();
        let second = f.coordinator.ensure_bootstrapped().await.unwrap();

        assert_eq!(second, BootstrapOutcome::AlreadyCompleted);
        assert_eq!(f.api.queue_calls(), 2);

        assert!(f.coordinator.reset().await.unwrap());
        f.coordinator.ensure_bootstrapped().await.unwrap();
        assert_eq!(f.api.queue_calls(), 4);
        f.orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_manual_scan_is_unconditional() {
        let f = workspace();
        fs::remove_file(f.dir.path().join("api/pom.xml")).unwrap();

        f.coordinator.manual_scan().await.unwrap();
        f.coordinator.manual_scan().await.unwrap();

        assert_eq!(f.api.queue_calls(), 2);
        assert_eq!(f.orchestrator.tracked_count(), 2);
        f.orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_record_survives_restart() {
        let f = workspace();
        f.coordinator.ensure_bootstrapped().await.unwrap();
        f.orchestrator.shutdown();

        let restarted = BootstrapCoordinator::new(
            "shop-ws",
            f.dir.path(),
            f.api.clone(),
            f.store.clone(),
            f.notifier.clone(),
            f.orchestrator.clone(),
        );
        assert!(!restarted.watching_enabled());
        assert_eq!(
            restarted.ensure_bootstrapped().await.unwrap(),
            BootstrapOutcome::AlreadyCompleted
        );
        assert!(restarted.watching_enabled());
        assert_eq!(f.api.queue_calls(), 2);
    }

    #[tokio::test]
    async fn test_queue_failure_disables_watching() {
        let f = workspace();
        f.api.fail_queue(Some(ApiError::Transient("HTTP 503".into())));

        let err = f.coordinator.ensure_bootstrapped().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Queue { .. }));
        assert!(!f.coordinator.watching_enabled());
        assert_eq!(f.notifier.count(Shown::BootstrapFailed), 1);
        assert!(f.coordinator.record().await.unwrap().is_none());
        assert_eq!(f.orchestrator.tracked_count(), 0);

        f.api.fail_queue(None);
        f.coordinator.manual_scan().await.unwrap();
        assert!(f.coordinator.watching_enabled());
        f.orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let f = workspace();
        f.store
            .set(&f.coordinator.record_key(), serde_json::json!("garbage"))
            .await
            .unwrap();
        assert!(f.coordinator.record().await.unwrap().is_none());
    }
}
