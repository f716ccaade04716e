//! Registry of cancellable poll tasks.
//!
//! Every tracked dependency owns at most one task, keyed by
//! (manifest path, dependency name). A task is a spawned loop that sleeps
//! for its interval and then runs a tick callback until the callback asks
//! to stop, the attempt budget runs out, or the task is cancelled.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use depgate_types::PollKey;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// What a poll task is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollMode {
    /// Resubmitting after a transport failure
    ConnectionRetry,
    /// Checking a non-terminal verdict
    StatusPoll,
}

impl std::fmt::Display for PollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollMode::ConnectionRetry => write!(f, "connection-retry"),
            PollMode::StatusPoll => write!(f, "status-poll"),
        }
    }
}

/// Shared cancellation flag. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Timing of a poll task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub mode: PollMode,
    pub interval: Duration,
    /// `None` polls until stopped
    pub max_attempts: Option<u32>,
}

impl PollSpec {
    pub fn status_poll(interval: Duration) -> Self {
        Self {
            mode: PollMode::StatusPoll,
            interval,
            max_attempts: None,
        }
    }

    pub fn connection_retry(delay: Duration, attempts: u32) -> Self {
        Self {
            mode: PollMode::ConnectionRetry,
            interval: delay,
            max_attempts: Some(attempts),
        }
    }
}

/// Passed to every tick.
#[derive(Debug, Clone)]
pub struct TickContext {
    /// 1-based
    pub attempt: u32,
    pub max_attempts: Option<u32>,
    pub token: CancelToken,
}

impl TickContext {
    /// Whether the budget ends with this tick.
    pub fn is_last_attempt(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempt >= max)
    }
}

/// What the loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Tick callback.
pub type TickFn = Arc<dyn Fn(TickContext) -> BoxFuture<'static, TickOutcome> + Send + Sync>;

struct PollTask {
    mode: PollMode,
    generation: u64,
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Cancellable timed tasks, at most one per key.
pub struct PollingScheduler {
    tasks: Arc<DashMap<PollKey, PollTask>>,
    generations: AtomicU64,
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Start a task for `key`, cancelling whatever task held the key before.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, key: PollKey, spec: PollSpec, tick: TickFn) -> CancelToken {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancelToken::new();

        // The shard stays locked until the new task is registered, so a task
        // that finishes immediately still finds its own entry to remove.
        let previous = match self.tasks.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().token.cancel();
                let task = self.spawn(key.clone(), spec, generation, token.clone(), tick);
                Some(occupied.insert(task))
            }
            Entry::Vacant(vacant) => {
                let task = self.spawn(key.clone(), spec, generation, token.clone(), tick);
                vacant.insert(task);
                None
            }
        };

        if let Some(previous) = previous {
            debug!(key = %key, mode = %previous.mode, "Replacing poll task");
            previous.stop();
        }
        debug!(key = %key, mode = %spec.mode, interval_ms = spec.interval.as_millis() as u64, "Poll task scheduled");
        token
    }

    fn spawn(
        &self,
        key: PollKey,
        spec: PollSpec,
        generation: u64,
        token: CancelToken,
        tick: TickFn,
    ) -> PollTask {
        let tasks = Arc::clone(&self.tasks);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                tokio::time::sleep(spec.interval).await;
                if loop_token.is_cancelled() {
                    break;
                }
                attempt += 1;
                trace!(key = %key, mode = %spec.mode, attempt, "Poll tick");
                let ctx = TickContext {
                    attempt,
                    max_attempts: spec.max_attempts,
                    token: loop_token.clone(),
                };
                if tick(ctx).await == TickOutcome::Stop || loop_token.is_cancelled() {
                    break;
                }
                if spec.max_attempts.is_some_and(|max| attempt >= max) {
                    debug!(key = %key, mode = %spec.mode, attempt, "Poll attempts exhausted");
                    break;
                }
            }
            tasks.remove_if(&key, |_, task| task.generation == generation);
        });

        PollTask {
            mode: spec.mode,
            generation,
            token,
            handle,
        }
    }

    /// Cancel the task for `key`. Returns whether one was running.
    pub fn cancel(&self, key: &PollKey) -> bool {
        match self.tasks.remove(key) {
            Some((_, task)) => {
                debug!(key = %key, mode = %task.mode, "Poll task cancelled");
                task.stop();
                true
            }
            None => false,
        }
    }

    /// Cancel every task.
    pub fn cancel_all(&self) {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| {
            task.token.cancel();
            task.handle.abort();
            false
        });
        if before > 0 {
            debug!(count = before, "All poll tasks cancelled");
        }
    }

    pub fn active_mode(&self, key: &PollKey) -> Option<PollMode> {
        self.tasks.get(key).map(|task| task.mode)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn key(name: &str) -> PollKey {
        PollKey::new("package.json", name)
    }

    fn counting(counter: Arc<AtomicU32>, stop_after: Option<u32>) -> TickFn {
        Arc::new(move |ctx: TickContext| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match stop_after {
                    Some(n) if ctx.attempt >= n => TickOutcome::Stop,
                    _ => TickOutcome::Continue,
                }
            })
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_poll_repeats_until_stop() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));
        scheduler.schedule(
            key("lodash"),
            PollSpec::status_poll(Duration::from_secs(5)),
            counting(ticks.clone(), Some(3)),
        );
        assert_eq!(scheduler.active_mode(&key("lodash")), Some(PollMode::StatusPoll));

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_retry_is_bounded() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));
        scheduler.schedule(
            key("lodash"),
            PollSpec::connection_retry(Duration::from_secs(10), 4),
            counting(ticks.clone(), None),
        );

        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.active_mode(&key("lodash")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));
        scheduler.schedule(
            key("lodash"),
            PollSpec::status_poll(Duration::from_secs(5)),
            counting(ticks.clone(), None),
        );

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        assert!(scheduler.cancel(&key("lodash")));
        assert!(!scheduler.cancel(&key("lodash")));
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_task() {
        let scheduler = PollingScheduler::new();
        let retry_ticks = Arc::new(AtomicU32::new(0));
        let poll_ticks = Arc::new(AtomicU32::new(0));

        scheduler.schedule(
            key("lodash"),
            PollSpec::connection_retry(Duration::from_secs(10), 30),
            counting(retry_ticks.clone(), None),
        );
        scheduler.schedule(
            key("lodash"),
            PollSpec::status_poll(Duration::from_secs(5)),
            counting(poll_ticks.clone(), None),
        );
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.active_mode(&key("lodash")), Some(PollMode::StatusPoll));

        tokio::time::sleep(Duration::from_secs(21)).await;
        settle().await;
        assert_eq!(retry_ticks.load(Ordering::SeqCst), 0);
        assert_eq!(poll_ticks.load(Ordering::SeqCst), 4);
        scheduler.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));
        for name in ["a", "b", "c"] {
            scheduler.schedule(
                key(name),
                PollSpec::status_poll(Duration::from_secs(5)),
                counting(ticks.clone(), None),
            );
        }
        assert_eq!(scheduler.len(), 3);

        scheduler.cancel_all();
        assert!(scheduler.is_empty());
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_last_attempt() {
        let ctx = TickContext {
            attempt: 30,
            max_attempts: Some(30),
            token: CancelToken::new(),
        };
        assert!(ctx.is_last_attempt());
        let unbounded = TickContext {
            max_attempts: None,
            ..ctx
        };
        assert!(!unbounded.is_last_attempt());
    }
}
