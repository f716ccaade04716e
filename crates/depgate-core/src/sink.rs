//! Output seams: inline diagnostics and user notifications.
//!
//! The engine reports through these traits and never renders anything
//! itself. [`InMemoryDiagnostics`] and [`TracingNotifier`] are the reference
//! implementations used by the daemon.

use dashmap::DashMap;
use depgate_types::wire::HeartbeatAlert;
use depgate_types::{DependencyStatus, PollKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// How loudly a diagnostic should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
}

impl Severity {
    pub fn for_status(status: DependencyStatus) -> Self {
        match status {
            DependencyStatus::Denied | DependencyStatus::Error => Severity::Error,
            DependencyStatus::Pending
            | DependencyStatus::Scanning
            | DependencyStatus::NotFound => Severity::Warning,
            DependencyStatus::New | DependencyStatus::Requested | DependencyStatus::Approved => {
                Severity::Information
            }
        }
    }
}

/// Inline diagnostic anchored to a dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub manifest: PathBuf,
    pub name: String,
    pub status: DependencyStatus,
    pub severity: Severity,
    pub message: String,
    /// 1-based line; 0 when unknown
    pub line: u32,
    pub reason_url: Option<String>,
}

/// Dependencies currently awaiting or failing approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub denied: usize,
    pub scanning: usize,
}

/// Receives per-dependency diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn upsert(&self, diagnostic: Diagnostic);

    fn remove(&self, manifest: &Path, name: &str);

    fn clear_file(&self, manifest: &Path);

    fn counts_by_status(&self) -> StatusCounts;
}

/// Payload of a user notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub package: String,
    pub version: Option<String>,
    pub message: String,
    pub reason_url: Option<String>,
}

/// Receives user-facing notifications, one method per outcome kind.
pub trait NotificationSink: Send + Sync {
    fn approved(&self, notice: &Notice);

    fn denied(&self, notice: &Notice);

    fn pending(&self, notice: &Notice);

    fn scanning(&self, notice: &Notice);

    fn not_found(&self, notice: &Notice);

    /// A previously denied dependency was removed from its manifest.
    fn removed(&self, notice: &Notice);

    /// Connection-retry gave up.
    fn connection_error(&self, notice: &Notice);

    /// The service rejected the submission (4xx).
    fn request_failed(&self, notice: &Notice);

    /// Workspace bootstrap failed; automatic watching is off.
    fn bootstrap_failed(&self, message: &str);

    /// Org-wide alert naming packages not announced before.
    fn heartbeat_alert(&self, alert: &HeartbeatAlert, packages: &[String]);
}

/// Diagnostics kept in memory, keyed by (manifest, dependency).
#[derive(Debug, Default)]
pub struct InMemoryDiagnostics {
    entries: DashMap<PollKey, Diagnostic>,
}

impl InMemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, manifest: &Path, name: &str) -> Option<Diagnostic> {
        self.entries
            .get(&PollKey::new(manifest, name))
            .map(|entry| entry.clone())
    }

    /// Snapshot sorted by manifest then line.
    pub fn all(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| (&a.manifest, a.line, &a.name).cmp(&(&b.manifest, b.line, &b.name)));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiagnosticSink for InMemoryDiagnostics {
    fn upsert(&self, diagnostic: Diagnostic) {
        let key = PollKey::new(&diagnostic.manifest, diagnostic.name.clone());
        self.entries.insert(key, diagnostic);
    }

    fn remove(&self, manifest: &Path, name: &str) {
        self.entries.remove(&PollKey::new(manifest, name));
    }

    fn clear_file(&self, manifest: &Path) {
        self.entries.retain(|key, _| key.manifest.as_path() != manifest);
    }

    fn counts_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.entries.iter() {
            match entry.status {
                DependencyStatus::Pending => counts.pending += 1,
                DependencyStatus::Denied => counts.denied += 1,
                DependencyStatus::Scanning => counts.scanning += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Emits every notification as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn approved(&self, notice: &Notice) {
        info!(package = %notice.package, version = ?notice.version, "Dependency approved");
    }

    fn denied(&self, notice: &Notice) {
        error!(
            package = %notice.package,
            version = ?notice.version,
            reason = ?notice.reason_url,
            "Dependency denied: {}",
            notice.message
        );
    }

    fn pending(&self, notice: &Notice) {
        warn!(package = %notice.package, version = ?notice.version, "Dependency pending approval: {}", notice.message);
    }

    fn scanning(&self, notice: &Notice) {
        info!(package = %notice.package, version = ?notice.version, "Dependency being scanned: {}", notice.message);
    }

    fn not_found(&self, notice: &Notice) {
        warn!(package = %notice.package, version = ?notice.version, "Dependency unknown to approval service: {}", notice.message);
    }

    fn removed(&self, notice: &Notice) {
        info!(package = %notice.package, "Denied dependency removed");
    }

    fn connection_error(&self, notice: &Notice) {
        error!(package = %notice.package, "Could not connect to approval service: {}", notice.message);
    }

    fn request_failed(&self, notice: &Notice) {
        error!(package = %notice.package, "Approval request rejected: {}", notice.message);
    }

    fn bootstrap_failed(&self, message: &str) {
        error!("Workspace scan failed, automatic monitoring disabled: {}", message);
    }

    fn heartbeat_alert(&self, alert: &HeartbeatAlert, packages: &[String]) {
        warn!(
            severity = %alert.severity,
            packages = ?packages,
            "{}: {}",
            alert.title,
            alert.message
        );
    }
}
