//! Scripted collaborators for engine tests.

use crate::error::{ApiError, ApiResult};
use crate::gateway::ApprovalApi;
use crate::sink::{Notice, NotificationSink};
use async_trait::async_trait;
use depgate_types::wire::{
    CheckRequest, DependencyRequest, HeartbeatAlert, HeartbeatRequest, HeartbeatResponse,
    QueueRequest, StatusResponse, UpdateAction, UpdateRequest,
};
use depgate_types::{DependencyStatus, Ecosystem, WireStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One call observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Queue {
        ecosystem: Ecosystem,
        packages: Vec<String>,
    },
    Request(String),
    Check(String),
    Update {
        name: String,
        action: UpdateAction,
        status: DependencyStatus,
    },
    Heartbeat,
}

/// Per-name answer scripts. The last entry of a script repeats forever;
/// unscripted names answer `pending`.
#[derive(Default)]
pub struct ScriptedApi {
    requests: Mutex<HashMap<String, VecDeque<ApiResult<StatusResponse>>>>,
    checks: Mutex<HashMap<String, VecDeque<ApiResult<StatusResponse>>>>,
    heartbeats: Mutex<VecDeque<ApiResult<HeartbeatResponse>>>,
    queue_error: Mutex<Option<ApiError>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<Call>>,
}

pub fn verdict(name: &str, status: WireStatus) -> ApiResult<StatusResponse> {
    Ok(StatusResponse {
        status,
        approved: status == WireStatus::Approved,
        message: String::new(),
        package_name: name.to_string(),
        package_manager: "npm".to_string(),
        reason_url: None,
    })
}

pub fn refused() -> ApiResult<StatusResponse> {
    Err(ApiError::Transient("connection refused".into()))
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_request(&self, name: &str, answers: Vec<ApiResult<StatusResponse>>) {
        self.requests
            .lock()
            .unwrap()
            .insert(name.to_string(), answers.into());
    }

    pub fn script_check(&self, name: &str, answers: Vec<ApiResult<StatusResponse>>) {
        self.checks
            .lock()
            .unwrap()
            .insert(name.to_string(), answers.into());
    }

    pub fn script_heartbeats(&self, answers: Vec<ApiResult<HeartbeatResponse>>) {
        *self.heartbeats.lock().unwrap() = answers.into();
    }

    pub fn fail_queue(&self, err: Option<ApiError>) {
        *self.queue_error.lock().unwrap() = err;
    }

    /// Make the next request for `name` wait until the returned handle is
    /// notified.
    pub fn hold_request(&self, name: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests_for(&self, name: &str) -> usize {
        self.count(|call| matches!(call, Call::Request(n) if n == name))
    }

    pub fn checks_for(&self, name: &str) -> usize {
        self.count(|call| matches!(call, Call::Check(n) if n == name))
    }

    pub fn queue_calls(&self) -> usize {
        self.count(|call| matches!(call, Call::Queue { .. }))
    }

    pub fn updates(&self) -> Vec<(String, UpdateAction, DependencyStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update {
                    name,
                    action,
                    status,
                } => Some((name, action, status)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next<T: Clone>(scripts: &Mutex<HashMap<String, VecDeque<T>>>, name: &str) -> Option<T> {
        let mut scripts = scripts.lock().unwrap();
        let script = scripts.get_mut(name)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl ApprovalApi for ScriptedApi {
    async fn queue(&self, request: &QueueRequest) -> ApiResult<()> {
        self.record(Call::Queue {
            ecosystem: request.ecosystem,
            packages: request.packages.iter().map(|p| p.name.clone()).collect(),
        });
        match self.queue_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn request(&self, request: &DependencyRequest) -> ApiResult<StatusResponse> {
        self.record(Call::Request(request.name.clone()));
        let hold = self.holds.lock().unwrap().remove(&request.name);
        if let Some(hold) = hold {
            hold.notified().await;
        }
        Self::next(&self.requests, &request.name)
            .unwrap_or_else(|| verdict(&request.name, WireStatus::Pending))
    }

    async fn check(&self, request: &CheckRequest) -> ApiResult<StatusResponse> {
        self.record(Call::Check(request.name.clone()));
        Self::next(&self.checks, &request.name)
            .unwrap_or_else(|| verdict(&request.name, WireStatus::Pending))
    }

    async fn update(&self, request: &UpdateRequest) -> ApiResult<()> {
        self.record(Call::Update {
            name: request.name.clone(),
            action: request.action,
            status: request.status,
        });
        Ok(())
    }

    async fn heartbeat(&self, _request: &HeartbeatRequest) -> ApiResult<HeartbeatResponse> {
        self.record(Call::Heartbeat);
        let mut answers = self.heartbeats.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap_or_else(|| Err(ApiError::Timeout))
        } else {
            answers.front().cloned().unwrap_or_else(|| Err(ApiError::Timeout))
        }
    }
}

/// Kind of notification recorded by [`RecordingNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shown {
    Approved,
    Denied,
    Pending,
    Scanning,
    NotFound,
    Removed,
    ConnectionError,
    RequestFailed,
    BootstrapFailed,
    HeartbeatAlert,
}

#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(Shown, String, Notice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds_for(&self, package: &str) -> Vec<Shown> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, name, _)| name == package)
            .map(|(kind, _, _)| *kind)
            .collect()
    }

    pub fn count(&self, kind: Shown) -> usize {
        self.shown.lock().unwrap().iter().filter(|(k, _, _)| *k == kind).count()
    }

    pub fn last_notice(&self, kind: Shown) -> Option<Notice> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, _, notice)| notice.clone())
    }

    pub fn total(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    fn push(&self, kind: Shown, notice: &Notice) {
        self.shown
            .lock()
            .unwrap()
            .push((kind, notice.package.clone(), notice.clone()));
    }
}

fn bare(package: &str, message: &str) -> Notice {
    Notice {
        package: package.to_string(),
        version: None,
        message: message.to_string(),
        reason_url: None,
    }
}

impl NotificationSink for RecordingNotifier {
    fn approved(&self, notice: &Notice) {
        self.push(Shown::Approved, notice);
    }

    fn denied(&self, notice: &Notice) {
        self.push(Shown::Denied, notice);
    }

    fn pending(&self, notice: &Notice) {
        self.push(Shown::Pending, notice);
    }

    fn scanning(&self, notice: &Notice) {
        self.push(Shown::Scanning, notice);
    }

    fn not_found(&self, notice: &Notice) {
        self.push(Shown::NotFound, notice);
    }

    fn removed(&self, notice: &Notice) {
        self.push(Shown::Removed, notice);
    }

    fn connection_error(&self, notice: &Notice) {
        self.push(Shown::ConnectionError, notice);
    }

    fn request_failed(&self, notice: &Notice) {
        self.push(Shown::RequestFailed, notice);
    }

    fn bootstrap_failed(&self, message: &str) {
        self.push(Shown::BootstrapFailed, &bare("", message));
    }

    fn heartbeat_alert(&self, alert: &HeartbeatAlert, packages: &[String]) {
        for package in packages {
            self.push(Shown::HeartbeatAlert, &bare(package, &alert.message));
        }
    }
}

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
