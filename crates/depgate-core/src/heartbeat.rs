//! Periodic pull of org-wide alerts.
//!
//! Independent of per-dependency tracking: an alert names packages that were
//! denied somewhere in the organization, and each name is announced at most
//! once per process.

use crate::config::HeartbeatConfig;
use crate::error::BestEffort;
use crate::gateway::ApprovalApi;
use crate::sink::NotificationSink;
use depgate_types::wire::{HeartbeatHealth, HeartbeatRequest, HeartbeatResponse, ProjectRef};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

pub struct HeartbeatMonitor {
    project: ProjectRef,
    api: Arc<dyn ApprovalApi>,
    notifier: Arc<dyn NotificationSink>,
    interval: Duration,
    announced: Mutex<HashSet<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(
        project: ProjectRef,
        api: Arc<dyn ApprovalApi>,
        notifier: Arc<dyn NotificationSink>,
        config: &HeartbeatConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            project,
            api,
            notifier,
            interval: config.interval(),
            announced: Mutex::new(HashSet::new()),
            task: Mutex::new(None),
        })
    }

    /// One pull. Failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn beat(&self) -> BestEffort {
        let result = self
            .api
            .heartbeat(&HeartbeatRequest::new(&self.project))
            .await;
        if let Ok(response) = &result {
            self.handle_response(response);
        }
        BestEffort::from_result(result)
    }

    fn handle_response(&self, response: &HeartbeatResponse) {
        if response.status != HeartbeatHealth::Warning {
            return;
        }
        let Some(alert) = &response.alert else {
            return;
        };

        let fresh: Vec<String> = {
            let mut announced = self.announced.lock().unwrap_or_else(PoisonError::into_inner);
            alert
                .packages
                .iter()
                .filter(|name| announced.insert((*name).clone()))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            debug!(title = %alert.title, "Alert names nothing new");
            return;
        }
        info!(title = %alert.title, packages = fresh.len(), "Org-wide alert");
        self.notifier.heartbeat_alert(alert, &fresh);
    }

    /// Start the periodic pull; a no-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                monitor.beat().await.log("heartbeat");
            }
        }));
        info!(interval_secs = period.as_secs(), "Heartbeat monitor started");
    }

    pub fn stop(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            debug!("Heartbeat monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Package names announced so far.
    pub fn announced(&self) -> usize {
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::{settle, RecordingNotifier, ScriptedApi, Shown};
    use depgate_types::wire::HeartbeatAlert;

    fn warning(packages: &[&str]) -> HeartbeatResponse {
        HeartbeatResponse {
            status: HeartbeatHealth::Warning,
            alert: Some(HeartbeatAlert {
                severity: "high".into(),
                title: "Packages denied".into(),
                message: "Remove these packages".into(),
                packages: packages.iter().map(|p| p.to_string()).collect(),
            }),
        }
    }

    fn monitor(api: Arc<ScriptedApi>, notifier: Arc<RecordingNotifier>) -> Arc<HeartbeatMonitor> {
        HeartbeatMonitor::new(
            ProjectRef::new("shop", None),
            api,
            notifier,
            &HeartbeatConfig {
                enabled: true,
                interval_secs: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_alert_names_announced_once() {
        let api = ScriptedApi::new();
        let notifier = RecordingNotifier::new();
        api.script_heartbeats(vec![
            Ok(warning(&["event-stream", "left-pad"])),
            Ok(warning(&["left-pad", "colors"])),
            Ok(warning(&["colors"])),
        ]);
        let monitor = monitor(api.clone(), notifier.clone());

        for _ in 0..3 {
            assert!(monitor.beat().await.is_delivered());
        }

        assert_eq!(notifier.count(Shown::HeartbeatAlert), 3);
        assert_eq!(notifier.kinds_for("left-pad"), vec![Shown::HeartbeatAlert]);
        assert_eq!(monitor.announced(), 3);
    }

    #[tokio::test]
    async fn test_healthy_and_errors_are_quiet() {
        let api = ScriptedApi::new();
        let notifier = RecordingNotifier::new();
        api.script_heartbeats(vec![
            Ok(HeartbeatResponse {
                status: HeartbeatHealth::Healthy,
                alert: None,
            }),
            Err(ApiError::Timeout),
        ]);
        let monitor = monitor(api, notifier.clone());

        assert!(monitor.beat().await.is_delivered());
        assert!(!monitor.beat().await.is_delivered());
        assert_eq!(notifier.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pull() {
        let api = ScriptedApi::new();
        let notifier = RecordingNotifier::new();
        api.script_heartbeats(vec![Ok(warning(&["left-pad"]))]);
        let monitor = monitor(api.clone(), notifier.clone());

        monitor.start();
        monitor.start();
        assert!(monitor.is_running());
        settle().await;

        tokio::time::sleep(Duration::from_secs(150)).await;
        settle().await;
        let beats = api
            .calls()
            .iter()
            .filter(|call| matches!(call, crate::testing::Call::Heartbeat))
            .count();
        assert_eq!(beats, 3);
        assert_eq!(notifier.count(Shown::HeartbeatAlert), 1);

        monitor.stop();
        assert!(!monitor.is_running());
    }
}
