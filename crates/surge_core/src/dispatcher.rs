//! Per-worker scheduling loop.
//!
//! A dispatcher launches one attempt per pacing interval without waiting for
//! earlier attempts, so any number of attempts can be in flight. Issuance
//! continues while the attempt target has not been reached **or** the run
//! deadline has not passed; it stops only once both are satisfied, or when
//! shutdown is requested. After issuance stops, every in-flight attempt is
//! awaited before the worker reports [`DispatchState::Stopped`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::executor::RequestExecutor;

/// Lifecycle of a dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Fixed pacing and stopping inputs of one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunPlan {
    pub target_attempts: u64,
    pub run_duration: Duration,
    pub pacing_interval: Duration,
}

/// What a worker did over its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSummary {
    pub worker_id: u32,
    pub attempts_issued: u64,
    /// Confirmed successes once every attempt has finished.
    pub successes: u64,
}

/// Drives one worker's stream of attempts.
pub struct Dispatcher {
    executor: Arc<RequestExecutor>,
    plan: RunPlan,
    shutdown: CancellationToken,
    state: watch::Sender<DispatchState>,
}

impl Dispatcher {
    pub fn new(executor: RequestExecutor, plan: RunPlan, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(DispatchState::Idle);
        Self {
            executor: Arc::new(executor),
            plan,
            shutdown,
            state,
        }
    }

    pub fn worker_id(&self) -> u32 {
        self.executor.worker_id()
    }

    /// Observes state transitions; subscribe before calling [`Dispatcher::run`].
    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    /// Issues attempts until the stopping condition holds, then drains.
    pub async fn run(self) -> DispatchSummary {
        let worker_id = self.worker_id();
        let deadline = deadline_after(Instant::now(), self.plan.run_duration);
        let tracker = TaskTracker::new();
        let mut issued = 0u64;

        self.state.send_replace(DispatchState::Running);
        info!(
            worker_id,
            target_attempts = self.plan.target_attempts,
            run_duration_ms = self.plan.run_duration.as_millis() as u64,
            pacing_ms = self.plan.pacing_interval.as_millis() as u64,
            "worker started"
        );

        while should_continue(issued + 1, self.plan.target_attempts, Instant::now(), deadline) {
            if self.shutdown.is_cancelled() {
                break;
            }
            issued += 1;
            let attempt = issued;
            let executor = Arc::clone(&self.executor);
            tracker.spawn(async move {
                executor.execute(attempt).await;
            });

            tokio::select! {
                _ = time::sleep(self.plan.pacing_interval) => {}
                _ = self.shutdown.cancelled() => {
                    debug!(worker_id, issued, "shutdown requested");
                    break;
                }
            }
        }

        self.state.send_replace(DispatchState::Draining);
        info!(worker_id, issued, in_flight = tracker.len(), "worker draining");
        tracker.close();
        tracker.wait().await;

        let summary = DispatchSummary {
            worker_id,
            attempts_issued: issued,
            successes: self.executor.successes().snapshot(),
        };
        self.state.send_replace(DispatchState::Stopped);
        info!(
            worker_id,
            attempts = summary.attempts_issued,
            successes = summary.successes,
            "worker stopped"
        );
        summary
    }
}

/// Continue while attempt `next_attempt` is within the target or the deadline
/// has not passed.
pub fn should_continue(next_attempt: u64, target_attempts: u64, now: Instant, deadline: Instant) -> bool {
    next_attempt <= target_attempts || now < deadline
}

/// `start + duration`, saturating at a far-future instant.
fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .unwrap_or_else(|| start + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}
