//! Runs every configured worker concurrently.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::dispatcher::{DispatchSummary, Dispatcher, RunPlan};
use crate::executor::RequestExecutor;
use crate::payload::PayloadFactory;
use crate::sink::RecordSink;
use crate::store::StoreClient;

/// Fixed set of workers sharing one store client and one sink.
///
/// Workers share nothing mutable: each owns its attempt sequence and its
/// success counter. The pool completes when every worker has stopped.
pub struct WorkerPool {
    config: HarnessConfig,
    store: Arc<dyn StoreClient>,
    payloads: Arc<dyn PayloadFactory>,
    sink: Arc<dyn RecordSink>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        config: HarnessConfig,
        store: Arc<dyn StoreClient>,
        payloads: Arc<dyn PayloadFactory>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            store,
            payloads,
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops issuance on every worker; in-flight
    /// attempts still finish.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn dispatcher(&self, worker_id: u32) -> Dispatcher {
        let executor = RequestExecutor::new(
            worker_id,
            Arc::clone(&self.store),
            Arc::clone(&self.payloads),
            Arc::clone(&self.sink),
            &self.config,
        );
        let plan = RunPlan {
            target_attempts: self.config.target_attempts,
            run_duration: self.config.run_duration,
            pacing_interval: self.config.pacing_interval,
        };
        Dispatcher::new(executor, plan, self.shutdown.child_token())
    }

    /// Starts all workers and waits for them to stop. Summaries are ordered by worker id.
    pub async fn run(self) -> anyhow::Result<Vec<DispatchSummary>> {
        self.config.validate()?;
        info!(workers = self.config.worker_count, "starting worker pool");

        let mut tasks = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let worker_id = u32::try_from(worker_id).context("worker id overflow")?;
            let dispatcher = self.dispatcher(worker_id);
            tasks.push(tokio::spawn(dispatcher.run()));
        }

        let (mut summaries, first_error) = join_all(tasks).await;
        self.sink.flush();
        if let Some(err) = first_error {
            return Err(err).context("worker task panicked");
        }
        summaries.sort_by_key(|s| s.worker_id);

        let attempts: u64 = summaries.iter().map(|s| s.attempts_issued).sum();
        let successes: u64 = summaries.iter().map(|s| s.successes).sum();
        info!(attempts, successes, "worker pool finished");
        Ok(summaries)
    }
}

/// Awaits every handle, even after one fails, and keeps the first failure.
async fn join_all(
    tasks: Vec<JoinHandle<DispatchSummary>>,
) -> (Vec<DispatchSummary>, Option<JoinError>) {
    let mut summaries = Vec::with_capacity(tasks.len());
    let mut first_error = None;
    for task in tasks {
        match task.await {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                error!(error = %err, "worker task failed");
                first_error.get_or_insert(err);
            }
        }
    }
    (summaries, first_error)
}
