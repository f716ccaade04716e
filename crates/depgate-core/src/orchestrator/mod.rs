//! Dependency lifecycle orchestration.
//!
//! The [`LifecycleOrchestrator`] consumes manifest events, diffs them against
//! its cache, submits new dependencies for approval and drives every
//! non-terminal dependency through status polling until a verdict arrives.
//!
//! State lives in a [`TrackingContext`] behind a `std::sync::Mutex` that is
//! only ever held between suspension points. Every asynchronous result is
//! tagged with the epoch of the dependency incarnation it belongs to and is
//! re-validated under that lock before it is applied, so a response that
//! arrives after removal (or after removal and re-adding) is dropped.
//!
//! Event handlers return once the cache is updated. The submissions and
//! removal announcements they trigger run on an in-flight task set that
//! `shutdown` aborts.

mod context;

pub use context::{ManifestSnapshot, TrackedDependency, TrackingContext};

use crate::config::PollingConfig;
use crate::differ::diff_manifest;
use crate::error::{ApiError, BestEffort};
use crate::gateway::ApprovalApi;
use crate::parser::ParserCapability;
use crate::scheduler::{PollMode, PollSpec, PollingScheduler, TickContext, TickFn, TickOutcome};
use crate::sink::{Diagnostic, DiagnosticSink, Notice, NotificationSink, Severity};
use dashmap::DashMap;
use depgate_types::wire::{
    CheckRequest, DependencyRequest, ProjectRef, StatusResponse, UpdateAction, UpdateRequest,
};
use depgate_types::{Dependency, DependencyStatus, Ecosystem, PollKey};
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn, Instrument};

/// Full inventory of one manifest, handed over by the bootstrap.
#[derive(Debug, Clone)]
pub struct SeedManifest {
    pub path: PathBuf,
    pub ecosystem: Ecosystem,
    pub content: String,
    pub dependencies: Vec<Dependency>,
}

/// Central state machine of the engine.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    project: ProjectRef,
    polling: PollingConfig,
    api: Arc<dyn ApprovalApi>,
    diagnostics: Arc<dyn DiagnosticSink>,
    notifier: Arc<dyn NotificationSink>,
    scheduler: PollingScheduler,
    context: Mutex<TrackingContext>,
    manifest_locks: DashMap<PathBuf, Arc<AsyncMutex<()>>>,
    in_flight: Mutex<JoinSet<()>>,
}

/// Work decided under the context lock and carried out after it.
#[derive(Default)]
struct ChangePlan {
    removed: Vec<TrackedDependency>,
    changed: Vec<(Dependency, DependencyStatus, u64)>,
    added: Vec<(Dependency, u64)>,
}

impl LifecycleOrchestrator {
    pub fn new(
        project: ProjectRef,
        polling: PollingConfig,
        api: Arc<dyn ApprovalApi>,
        diagnostics: Arc<dyn DiagnosticSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                project,
                polling,
                api,
                diagnostics,
                notifier,
                scheduler: PollingScheduler::new(),
                context: Mutex::new(TrackingContext::new()),
                manifest_locks: DashMap::new(),
                in_flight: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn project(&self) -> &ProjectRef {
        &self.inner.project
    }

    /// Process a created or modified manifest.
    #[instrument(skip_all, fields(manifest = %manifest.display()))]
    pub async fn handle_manifest_change(&self, manifest: &Path, content: &str) {
        let Some(parser) = ParserCapability::for_path(manifest) else {
            debug!("No parser for file, ignoring");
            return;
        };

        // Only the diff and cache update are serialized per file; submissions
        // run after the lock is released and are validated by epoch.
        let plan = {
            let lock = self.inner.manifest_lock(manifest);
            let _serial = lock.lock().await;
            let mut ctx = self.inner.context();
            self.inner.plan_change(&mut ctx, parser, manifest, content)
        };
        if let Some(plan) = plan {
            let inner = Arc::clone(&self.inner);
            self.inner
                .spawn_work(async move { inner.execute(plan).await }.in_current_span());
        }
    }

    /// Process a deleted manifest: every dependency it declared is removed.
    #[instrument(skip_all, fields(manifest = %manifest.display()))]
    pub async fn handle_manifest_deleted(&self, manifest: &Path) {
        let removed: Vec<TrackedDependency> = {
            let lock = self.inner.manifest_lock(manifest);
            let _serial = lock.lock().await;
            let mut ctx = self.inner.context();
            let removed: Vec<TrackedDependency> = ctx
                .tracked_keys(manifest)
                .iter()
                .filter_map(|key| self.inner.untrack_locked(&mut ctx, key))
                .collect();
            ctx.forget_manifest(manifest);
            self.inner.diagnostics.clear_file(manifest);
            removed
        };

        if removed.is_empty() {
            return;
        }
        info!(count = removed.len(), "Manifest deleted, dependencies removed");
        let inner = Arc::clone(&self.inner);
        self.inner.spawn_work(
            async move {
                join_all(removed.iter().map(|tracked| inner.announce_removal(tracked))).await;
            }
            .in_current_span(),
        );
    }

    /// Replace the state of each manifest with a freshly queued inventory.
    ///
    /// Every dependency starts `pending` with a status-poll scheduled. The
    /// pending state counts as already notified, so seeding is silent.
    #[instrument(skip_all, fields(manifests = manifests.len()))]
    pub async fn seed(&self, manifests: Vec<SeedManifest>) {
        for manifest in manifests {
            let lock = self.inner.manifest_lock(&manifest.path);
            let _serial = lock.lock().await;
            let mut ctx = self.inner.context();
            self.inner.seed_locked(&mut ctx, manifest);
        }
    }

    /// Cancel every task and forget every manifest and dependency.
    pub fn reset(&self) {
        self.inner.abort_in_flight();
        self.inner.scheduler.cancel_all();
        let mut ctx = self.inner.context();
        for manifest in ctx.known_manifests() {
            self.inner.diagnostics.clear_file(&manifest);
        }
        ctx.clear();
        debug!("Tracking state reset");
    }

    /// Stop all polling and abort in-flight submissions. Tracked state is
    /// left intact for inspection.
    pub fn shutdown(&self) {
        let active = self.inner.scheduler.len();
        let aborted = self.inner.abort_in_flight();
        self.inner.scheduler.cancel_all();
        info!(cancelled = active, aborted, "Orchestrator shut down");
    }

    pub fn status_of(&self, key: &PollKey) -> Option<DependencyStatus> {
        self.inner.context().get(key).map(|t| t.status)
    }

    pub fn tracked(&self, key: &PollKey) -> Option<TrackedDependency> {
        self.inner.context().get(key).cloned()
    }

    pub fn tracked_in(&self, manifest: &Path) -> Vec<TrackedDependency> {
        self.inner.context().tracked_in(manifest)
    }

    /// Every tracked dependency, sorted by manifest and name.
    pub fn all_tracked(&self) -> Vec<TrackedDependency> {
        self.inner.context().all_tracked()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.context().tracked_count()
    }

    pub fn cached_content(&self, manifest: &Path) -> Option<String> {
        self.inner
            .context()
            .snapshot(manifest)
            .map(|snapshot| snapshot.content.clone())
    }

    pub fn poll_mode(&self, key: &PollKey) -> Option<PollMode> {
        self.inner.scheduler.active_mode(key)
    }

    pub fn active_tasks(&self) -> usize {
        self.inner.scheduler.len()
    }

    /// Submissions and removal announcements still running.
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.inner.in_flight();
        while in_flight.try_join_next().is_some() {}
        in_flight.len()
    }
}

impl Inner {
    fn context(&self) -> MutexGuard<'_, TrackingContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run event follow-up work off the caller's path, reaping finished
    /// tasks first.
    fn spawn_work<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.in_flight();
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(work);
    }

    /// Returns how many tasks were still running.
    fn abort_in_flight(&self) -> usize {
        let mut in_flight = self.in_flight();
        while in_flight.try_join_next().is_some() {}
        let running = in_flight.len();
        in_flight.abort_all();
        running
    }

    fn manifest_lock(&self, manifest: &Path) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.manifest_locks.entry(manifest.to_path_buf()).or_default())
    }

    /// Diff and cache update; runs entirely under the context lock.
    fn plan_change(
        self: &Arc<Self>,
        ctx: &mut TrackingContext,
        parser: ParserCapability,
        manifest: &Path,
        content: &str,
    ) -> Option<ChangePlan> {
        let previous = ctx
            .snapshot(manifest)
            .map(|snapshot| snapshot.content.clone())
            .unwrap_or_default();
        let tracked = ctx.tracked_versions(manifest);
        let diff = diff_manifest(parser, manifest, &previous, content, &tracked);
        if !diff.parsed {
            return None;
        }
        ctx.cache(manifest, parser.ecosystem(), content);

        for dep in &diff.current {
            if let Some(tracked) = ctx.get_mut(&dep.key()) {
                tracked.dependency.line = dep.line;
            }
        }

        // Gave up earlier (retries exhausted or rejected); any new event
        // for the file is the cue to try again.
        let stalled: Vec<Dependency> = diff
            .current
            .iter()
            .filter(|dep| {
                let key = dep.key();
                ctx.get(&key)
                    .is_some_and(|t| t.status == DependencyStatus::Error)
                    && self.scheduler.active_mode(&key).is_none()
                    && !diff.changed.iter().any(|c| c.name == dep.name)
            })
            .cloned()
            .collect();

        if diff.is_empty() && stalled.is_empty() {
            return None;
        }
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            stalled = stalled.len(),
            "Manifest diff"
        );

        let mut plan = ChangePlan::default();
        for name in &diff.removed {
            let key = PollKey::new(manifest, name.clone());
            if let Some(tracked) = self.untrack_locked(ctx, &key) {
                plan.removed.push(tracked);
            }
        }
        for dep in diff.changed {
            let key = dep.key();
            self.scheduler.cancel(&key);
            let previous = ctx
                .get(&key)
                .map(|t| t.status)
                .unwrap_or(DependencyStatus::New);
            let epoch = ctx.track(dep.clone(), DependencyStatus::Requested);
            plan.changed.push((dep, previous, epoch));
        }
        for dep in diff.added.into_iter().chain(stalled) {
            let epoch = ctx.track(dep.clone(), DependencyStatus::Requested);
            plan.added.push((dep, epoch));
        }
        Some(plan)
    }

    async fn execute(self: &Arc<Self>, plan: ChangePlan) {
        join_all(plan.removed.iter().map(|tracked| self.announce_removal(tracked))).await;

        join_all(plan.changed.into_iter().map(|(dep, previous, epoch)| async move {
            info!(dependency = %dep.name, version = dep.version_or_any(), "Declared version changed, resubmitting");
            let update = UpdateRequest::new(&self.project, &dep, UpdateAction::Changed, previous);
            BestEffort::from_result(self.api.update(&update).await).log("update");
            self.submit(dep, epoch).await;
        }))
        .await;

        join_all(plan.added.into_iter().map(|(dep, epoch)| self.submit(dep, epoch))).await;
    }

    /// Cancel, forget and clear the diagnostic of `key`.
    fn untrack_locked(&self, ctx: &mut TrackingContext, key: &PollKey) -> Option<TrackedDependency> {
        self.scheduler.cancel(key);
        let tracked = ctx.untrack(key)?;
        self.diagnostics.remove(&key.manifest, &key.name);
        Some(tracked)
    }

    async fn announce_removal(&self, tracked: &TrackedDependency) {
        let dep = &tracked.dependency;
        info!(dependency = %dep.name, status = %tracked.status, "Dependency removed");
        if tracked.status == DependencyStatus::Denied {
            self.notifier.removed(&Notice {
                package: dep.name.clone(),
                version: dep.version.clone(),
                message: format!("Denied dependency {} was removed", dep.name),
                reason_url: tracked.reason_url.clone(),
            });
        }
        let update = UpdateRequest::new(&self.project, dep, UpdateAction::Removed, tracked.status);
        BestEffort::from_result(self.api.update(&update).await).log("update");
    }

    fn seed_locked(self: &Arc<Self>, ctx: &mut TrackingContext, manifest: SeedManifest) {
        for key in ctx.tracked_keys(&manifest.path) {
            self.untrack_locked(ctx, &key);
        }
        self.diagnostics.clear_file(&manifest.path);
        ctx.cache(&manifest.path, manifest.ecosystem, manifest.content);

        for dep in manifest.dependencies {
            let key = dep.key();
            let epoch = ctx.track(dep, DependencyStatus::Pending);
            ctx.gate_mut().mark_notified(&key, DependencyStatus::Pending);
            if let Some(tracked) = ctx.get(&key) {
                self.diagnostics.upsert(diagnostic_for(tracked));
            }
            self.schedule_status_poll(key, epoch);
        }
    }

    /// Initial submission of one dependency incarnation.
    async fn submit(self: &Arc<Self>, dep: Dependency, epoch: u64) {
        let key = dep.key();
        debug!(dependency = %dep.name, version = dep.version_or_any(), "Submitting for approval");
        let result = self
            .api
            .request(&DependencyRequest::new(&self.project, &dep))
            .await;

        let mut ctx = self.context();
        if !ctx.is_current(&key, epoch) {
            debug!(dependency = %dep.name, "Discarding response for removed dependency");
            return;
        }
        match result {
            Ok(response) => {
                self.apply_response(&mut ctx, &key, epoch, response);
            }
            Err(err) if err.is_permanent() => self.reject(&mut ctx, &key, &err),
            Err(err) => {
                warn!(dependency = %dep.name, error = %err, "Submission failed, entering connection retry");
                self.set_error(&mut ctx, &key, format!("Could not reach approval service: {err}"));
                self.schedule_connection_retry(key, epoch);
            }
        }
    }

    /// Apply a verdict: record it, refresh the diagnostic, maybe notify, and
    /// start or stop status polling.
    fn apply_response(
        self: &Arc<Self>,
        ctx: &mut TrackingContext,
        key: &PollKey,
        epoch: u64,
        response: StatusResponse,
    ) -> DependencyStatus {
        let status = DependencyStatus::from(response.status);
        let Some(tracked) = ctx.get_mut(key) else {
            return status;
        };
        let previous = tracked.status;
        tracked.status = status;
        tracked.message = Some(response.message).filter(|m| !m.is_empty());
        tracked.reason_url = response.reason_url;
        let tracked = tracked.clone();

        if previous != status {
            info!(dependency = %key.name, from = %previous, to = %status, "Status changed");
        }
        self.diagnostics.upsert(diagnostic_for(&tracked));

        let fresh = ctx.gate_mut().should_notify(key, status);
        if fresh && !(status.is_terminal() && previous == status) {
            self.notify(&tracked);
        }

        if status.is_pollable() {
            if self.scheduler.active_mode(key) != Some(PollMode::StatusPoll) {
                self.schedule_status_poll(key.clone(), epoch);
            }
        } else {
            self.scheduler.cancel(key);
        }
        status
    }

    /// 4xx or unreadable answer: terminal for this attempt, surfaced at once.
    fn reject(&self, ctx: &mut TrackingContext, key: &PollKey, err: &ApiError) {
        warn!(dependency = %key.name, error = %err, "Approval service rejected the request");
        self.scheduler.cancel(key);
        if let Some(tracked) = self.set_error(ctx, key, format!("Approval request failed: {err}")) {
            self.notifier.request_failed(&notice_for(&tracked));
        }
    }

    fn set_error(
        &self,
        ctx: &mut TrackingContext,
        key: &PollKey,
        message: String,
    ) -> Option<TrackedDependency> {
        let tracked = ctx.get_mut(key)?;
        tracked.status = DependencyStatus::Error;
        tracked.message = Some(message);
        tracked.reason_url = None;
        let tracked = tracked.clone();
        let _ = ctx.gate_mut().should_notify(key, DependencyStatus::Error);
        self.diagnostics.upsert(diagnostic_for(&tracked));
        Some(tracked)
    }

    fn notify(&self, tracked: &TrackedDependency) {
        let notice = notice_for(tracked);
        match tracked.status {
            DependencyStatus::Approved => self.notifier.approved(&notice),
            DependencyStatus::Denied => self.notifier.denied(&notice),
            DependencyStatus::Pending => self.notifier.pending(&notice),
            DependencyStatus::Scanning => self.notifier.scanning(&notice),
            DependencyStatus::NotFound => self.notifier.not_found(&notice),
            DependencyStatus::New | DependencyStatus::Requested | DependencyStatus::Error => {}
        }
    }

    /// Clone of the dependency if `epoch` is still live and the tick was
    /// not cancelled.
    fn live_dependency(&self, key: &PollKey, epoch: u64, tick: &TickContext) -> Option<Dependency> {
        let ctx = self.context();
        if tick.token.is_cancelled() || !ctx.is_current(key, epoch) {
            return None;
        }
        ctx.get(key).map(|t| t.dependency.clone())
    }

    fn schedule_status_poll(self: &Arc<Self>, key: PollKey, epoch: u64) {
        let spec = PollSpec::status_poll(self.polling.poll_interval());
        self.schedule(key, epoch, spec);
    }

    fn schedule_connection_retry(self: &Arc<Self>, key: PollKey, epoch: u64) {
        let spec = PollSpec::connection_retry(
            self.polling.connection_retry_delay(),
            self.polling.connection_retry_attempts.max(1),
        );
        self.schedule(key, epoch, spec);
    }

    /// The task only holds a weak reference, so dropping the orchestrator
    /// ends its polling.
    fn schedule(self: &Arc<Self>, key: PollKey, epoch: u64, spec: PollSpec) {
        let weak = Arc::downgrade(self);
        let task_key = key.clone();
        let tick: TickFn = Arc::new(move |tick: TickContext| -> BoxFuture<'static, TickOutcome> {
            let Some(inner) = weak.upgrade() else {
                return Box::pin(async { TickOutcome::Stop });
            };
            match spec.mode {
                PollMode::StatusPoll => Box::pin(inner.poll_tick(task_key.clone(), epoch, tick)),
                PollMode::ConnectionRetry => {
                    Box::pin(inner.retry_tick(task_key.clone(), epoch, tick))
                }
            }
        });
        self.scheduler.schedule(key, spec, tick);
    }

    async fn poll_tick(self: Arc<Self>, key: PollKey, epoch: u64, tick: TickContext) -> TickOutcome {
        let Some(dep) = self.live_dependency(&key, epoch, &tick) else {
            return TickOutcome::Stop;
        };
        let result = self.api.check(&CheckRequest::new(&self.project, &dep)).await;

        let mut ctx = self.context();
        if tick.token.is_cancelled() || !ctx.is_current(&key, epoch) {
            return TickOutcome::Stop;
        }
        match result {
            Ok(response) => {
                if self.apply_response(&mut ctx, &key, epoch, response).is_pollable() {
                    TickOutcome::Continue
                } else {
                    TickOutcome::Stop
                }
            }
            Err(err) if err.is_permanent() => {
                self.reject(&mut ctx, &key, &err);
                TickOutcome::Stop
            }
            Err(err) => {
                warn!(dependency = %key.name, attempt = tick.attempt, error = %err, "Status check failed");
                TickOutcome::Continue
            }
        }
    }

    async fn retry_tick(self: Arc<Self>, key: PollKey, epoch: u64, tick: TickContext) -> TickOutcome {
        let Some(dep) = self.live_dependency(&key, epoch, &tick) else {
            return TickOutcome::Stop;
        };
        let result = self
            .api
            .request(&DependencyRequest::new(&self.project, &dep))
            .await;

        let mut ctx = self.context();
        if tick.token.is_cancelled() || !ctx.is_current(&key, epoch) {
            return TickOutcome::Stop;
        }
        match result {
            Ok(response) => {
                info!(dependency = %key.name, attempt = tick.attempt, "Approval service reachable again");
                self.apply_response(&mut ctx, &key, epoch, response);
                TickOutcome::Stop
            }
            Err(err) if err.is_permanent() => {
                self.reject(&mut ctx, &key, &err);
                TickOutcome::Stop
            }
            Err(err) if tick.is_last_attempt() => {
                warn!(dependency = %key.name, attempts = tick.attempt, error = %err, "Connection retry exhausted");
                let message = format!(
                    "Could not connect to approval service after {} attempts",
                    tick.attempt
                );
                if let Some(tracked) = self.set_error(&mut ctx, &key, message) {
                    self.notifier.connection_error(&notice_for(&tracked));
                }
                TickOutcome::Stop
            }
            Err(err) => {
                debug!(dependency = %key.name, attempt = tick.attempt, error = %err, "Connection retry failed");
                TickOutcome::Continue
            }
        }
    }
}

fn notice_for(tracked: &TrackedDependency) -> Notice {
    Notice {
        package: tracked.dependency.name.clone(),
        version: tracked.dependency.version.clone(),
        message: describe(tracked),
        reason_url: tracked.reason_url.clone(),
    }
}

fn diagnostic_for(tracked: &TrackedDependency) -> Diagnostic {
    Diagnostic {
        manifest: tracked.dependency.manifest.clone(),
        name: tracked.dependency.name.clone(),
        status: tracked.status,
        severity: Severity::for_status(tracked.status),
        message: describe(tracked),
        line: tracked.dependency.line,
        reason_url: tracked.reason_url.clone(),
    }
}

fn describe(tracked: &TrackedDependency) -> String {
    if let Some(message) = &tracked.message {
        return message.clone();
    }
    let dep = &tracked.dependency;
    let what = match tracked.status {
        DependencyStatus::New | DependencyStatus::Requested => "submitted for approval",
        DependencyStatus::Approved => "approved",
        DependencyStatus::Denied => "denied",
        DependencyStatus::Pending => "pending approval",
        DependencyStatus::Scanning => "being scanned",
        DependencyStatus::NotFound => "unknown to the approval service",
        DependencyStatus::Error => "could not be submitted",
    };
    format!("{}@{} is {}", dep.name, dep.version_or_any(), what)
}
