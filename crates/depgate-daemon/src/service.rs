//! Daemon lifecycle: wiring, bootstrap, watching and shutdown.

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::watcher::ManifestWatcher;
use depgate_core::{
    ApprovalApi, BootstrapCoordinator, BootstrapOutcome, DiagnosticSink, HeartbeatMonitor,
    HttpApprovalApi, InMemoryDiagnostics, JsonFileStore, LifecycleOrchestrator, NotificationSink,
    StatusCounts, TracingNotifier, WorkspaceBootstrapRecord,
};
use depgate_types::wire::ProjectRef;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// What `depgated status` prints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub workspace_id: String,
    pub root: PathBuf,
    pub project_name: String,
    pub api_url: String,
    pub state_file: PathBuf,
    pub bootstrap: Option<WorkspaceBootstrapRecord>,
}

/// A fully wired daemon for one workspace.
pub struct Daemon {
    config: DaemonConfig,
    root: PathBuf,
    workspace_id: String,
    state_file: PathBuf,
    orchestrator: LifecycleOrchestrator,
    bootstrap: BootstrapCoordinator,
    heartbeat: Arc<HeartbeatMonitor>,
    diagnostics: Arc<InMemoryDiagnostics>,
}

impl Daemon {
    /// Wire the engine against the configured approval service.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let api: Arc<dyn ApprovalApi> = Arc::new(HttpApprovalApi::new(&config.engine().api)?);
        Ok(Self::with_api(config, api))
    }

    /// Wire the engine against an arbitrary [`ApprovalApi`].
    pub fn with_api(config: DaemonConfig, api: Arc<dyn ApprovalApi>) -> Self {
        let engine = config.engine();
        let root = config.workspace.resolved_root();
        let workspace_id = config.workspace.workspace_id(&root);
        let project = ProjectRef::new(
            config.workspace.project_name(&root),
            config.workspace.repository.clone(),
        );

        let store = Arc::new(JsonFileStore::new(
            config.workspace.state_dir(),
            &workspace_id,
        ));
        let state_file = store.path().to_path_buf();
        let diagnostics = Arc::new(InMemoryDiagnostics::new());
        let notifier: Arc<dyn NotificationSink> = Arc::new(TracingNotifier);

        let orchestrator = LifecycleOrchestrator::new(
            project.clone(),
            engine.polling,
            Arc::clone(&api),
            Arc::clone(&diagnostics) as Arc<dyn DiagnosticSink>,
            Arc::clone(&notifier),
        );
        let bootstrap = BootstrapCoordinator::new(
            workspace_id.clone(),
            root.clone(),
            Arc::clone(&api),
            store,
            Arc::clone(&notifier),
            orchestrator.clone(),
        );
        let heartbeat = HeartbeatMonitor::new(project, api, notifier, &engine.heartbeat);

        Self {
            config,
            root,
            workspace_id,
            state_file,
            orchestrator,
            bootstrap,
            heartbeat,
            diagnostics,
        }
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    pub fn counts(&self) -> StatusCounts {
        self.diagnostics.counts_by_status()
    }

    /// Watch until Ctrl+C or SIGTERM.
    pub async fn watch(&self) -> DaemonResult<()> {
        self.watch_until(shutdown_signal()).await
    }

    /// Bootstrap if needed, then watch manifests until `shutdown` resolves.
    ///
    /// A failed bootstrap is returned without starting the watcher; the next
    /// `scan` retries it.
    pub async fn watch_until(&self, shutdown: impl Future<Output = ()>) -> DaemonResult<()> {
        info!(
            root = %self.root.display(),
            workspace = %self.workspace_id,
            project = %self.orchestrator.project().project_name,
            "depgated starting"
        );

        match self.bootstrap.ensure_bootstrapped().await? {
            BootstrapOutcome::AlreadyCompleted => info!("Workspace already bootstrapped"),
            BootstrapOutcome::Completed {
                manifests,
                packages,
            } => info!(manifests, packages, "Workspace bootstrapped"),
        }

        if self.config.heartbeat.enabled {
            self.heartbeat.start();
        }

        let watcher = ManifestWatcher::new(&self.root);
        tokio::select! {
            _ = watcher.run(self.orchestrator.clone(), self.config.watcher.scan_interval()) => {}
            _ = self.report_counts() => {}
            _ = shutdown => {}
        }

        self.shutdown();
        Ok(())
    }

    /// Forget the bootstrap record and submit the whole inventory again.
    pub async fn scan(&self) -> DaemonResult<BootstrapOutcome> {
        let outcome = self.bootstrap.manual_scan().await?;
        Ok(outcome)
    }

    /// Drop the bootstrap record; returns whether one existed.
    pub async fn reset(&self) -> DaemonResult<bool> {
        Ok(self.bootstrap.reset().await?)
    }

    pub async fn status(&self) -> DaemonResult<StatusReport> {
        Ok(StatusReport {
            workspace_id: self.workspace_id.clone(),
            root: self.root.clone(),
            project_name: self.orchestrator.project().project_name.clone(),
            api_url: self.config.api.base_url.clone(),
            state_file: self.state_file.clone(),
            bootstrap: self.bootstrap.record().await?,
        })
    }

    /// Cancel every poll task and stop the heartbeat.
    pub fn shutdown(&self) {
        info!("depgated shutting down");
        self.heartbeat.stop();
        self.orchestrator.shutdown();
    }

    /// Log the pending/denied/scanning totals whenever they change.
    async fn report_counts(&self) {
        let mut ticker = tokio::time::interval(self.config.watcher.scan_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = StatusCounts::default();
        loop {
            ticker.tick().await;
            let counts = self.counts();
            if counts != last {
                if counts.denied > 0 {
                    warn!(
                        pending = counts.pending,
                        denied = counts.denied,
                        scanning = counts.scanning,
                        "Approval summary"
                    );
                } else {
                    info!(
                        pending = counts.pending,
                        denied = counts.denied,
                        scanning = counts.scanning,
                        "Approval summary"
                    );
                }
                last = counts;
            }
        }
    }
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
