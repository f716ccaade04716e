//! Per-dependency notification dedup.
//!
//! Non-terminal statuses (`pending`, `scanning`, `not_found`) surface at most
//! once per run of identical observations: the remembered set is cleared
//! whenever the dependency moves to a different status. Terminal statuses
//! bypass the set entirely.

use depgate_types::{DependencyStatus, PollKey};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct NotifiedState {
    last: Option<DependencyStatus>,
    shown: HashSet<DependencyStatus>,
}

/// Dedup filter for user-facing status notifications.
#[derive(Debug, Default)]
pub struct NotificationGate {
    states: HashMap<PollKey, NotifiedState>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `status` and decide whether to surface it.
    pub fn should_notify(&mut self, key: &PollKey, status: DependencyStatus) -> bool {
        let state = self.states.entry(key.clone()).or_default();
        if state.last != Some(status) {
            state.shown.clear();
            state.last = Some(status);
        }
        if status.is_terminal() {
            return true;
        }
        state.shown.insert(status)
    }

    /// Record `status` as already surfaced without showing anything.
    pub fn mark_notified(&mut self, key: &PollKey, status: DependencyStatus) {
        let state = self.states.entry(key.clone()).or_default();
        if state.last != Some(status) {
            state.shown.clear();
            state.last = Some(status);
        }
        state.shown.insert(status);
    }

    /// Drop everything remembered for `key`.
    pub fn forget(&mut self, key: &PollKey) {
        self.states.remove(key);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
