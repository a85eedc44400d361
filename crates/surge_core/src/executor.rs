//! One timed write attempt.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::json;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::classify::OutcomeClassifier;
use crate::config::HarnessConfig;
use crate::counters::SuccessCounter;
use crate::payload::PayloadFactory;
use crate::record::{AttemptContext, ResultRecord};
use crate::sink::RecordSink;
use crate::store::{StoreClient, WriteFailure};

/// Runs write attempts for a single worker.
///
/// Each call to [`RequestExecutor::execute`] is independent: it has its own
/// timeout and cancelling it never touches sibling attempts. The only state
/// attempts share is the worker's [`SuccessCounter`].
pub struct RequestExecutor {
    worker_id: u32,
    store: Arc<dyn StoreClient>,
    payloads: Arc<dyn PayloadFactory>,
    sink: Arc<dyn RecordSink>,
    successes: SuccessCounter,
    classifier: OutcomeClassifier,
    attempt_timeout: Duration,
    request_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(
        worker_id: u32,
        store: Arc<dyn StoreClient>,
        payloads: Arc<dyn PayloadFactory>,
        sink: Arc<dyn RecordSink>,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            worker_id,
            store,
            payloads,
            sink,
            successes: SuccessCounter::new(),
            classifier: OutcomeClassifier::new(config.diagnostics_threshold),
            attempt_timeout: config.attempt_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    pub fn successes(&self) -> &SuccessCounter {
        &self.successes
    }

    /// Runs attempt `attempt` and returns its record, which has already been
    /// handed to the sink. Always completes with exactly one record.
    pub async fn execute(&self, attempt: u64) -> ResultRecord {
        let context = AttemptContext {
            worker_id: self.worker_id,
            attempt,
            successes_so_far: self.successes.snapshot(),
        };
        let document = self.payloads.next_document();

        let started = Instant::now();
        let write = AssertUnwindSafe(self.store.create_item(document, self.request_timeout))
            .catch_unwind();
        let result = match time::timeout(self.attempt_timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(WriteFailure::Other(format!(
                "store call panicked: {}",
                panic_message(&*panic)
            ))),
            // The elapsed timeout drops the write future, which cancels it.
            Err(_) => Err(self.cancelled(started.elapsed())),
        };
        let latency = started.elapsed();

        let record = self.classifier.classify(context, latency, result);
        if record.is_confirmed_success() {
            self.successes.record_success();
        }
        debug!(
            worker_id = self.worker_id,
            attempt,
            outcome = ?record.outcome(),
            status = record.status_code(),
            latency_ms = latency.as_millis() as u64,
            "attempt finished"
        );
        self.sink.record(&record);
        record
    }

    fn cancelled(&self, elapsed: Duration) -> WriteFailure {
        WriteFailure::Cancelled {
            message: format!(
                "write cancelled after exceeding the {}ms attempt timeout",
                self.attempt_timeout.as_millis()
            ),
            diagnostics: json!({
                "source": "caller",
                "clientId": self.worker_id,
                "attemptTimeoutMs": self.attempt_timeout.as_millis() as u64,
                "requestTimeoutMs": self.request_timeout.as_millis() as u64,
                "elapsedMs": elapsed.as_secs_f64() * 1_000.0,
            }),
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Outcome;
    use crate::sim::{SimOutcome, SimResponse, SimulatedConnector};
    use crate::sink::MemorySink;
    use crate::store::{ClientOptions, Credentials, StoreConnector};

    async fn executor_with(
        plan: impl Fn(u64) -> SimResponse + Send + Sync + 'static,
        config: &HarnessConfig,
    ) -> (RequestExecutor, MemorySink) {
        let connector = SimulatedConnector::with_regions(&["West US 2"]).with_plan(plan);
        let client = connector
            .connect("https://sim", &Credentials::new("a", "k"), ClientOptions::default())
            .await
            .unwrap();
        let sink = MemorySink::new();
        let executor = RequestExecutor::new(
            7,
            Arc::from(client),
            Arc::new(crate::payload::BookFactory),
            Arc::new(sink.clone()),
            config,
        );
        (executor, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn success_increments_counter_after_snapshot() {
        let (executor, sink) = executor_with(
            |_| SimResponse::new(Duration::from_millis(5), SimOutcome::Created),
            &HarnessConfig::default(),
        )
        .await;
        let first = executor.execute(1).await;
        let second = executor.execute(2).await;
        assert_eq!(first.outcome(), Outcome::Success);
        assert_eq!(first.successes_so_far(), 0);
        assert_eq!(second.successes_so_far(), 1);
        assert_eq!(executor.successes().snapshot(), 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(first.worker_id(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_cancellation_record() {
        let config = HarnessConfig {
            attempt_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
            ..HarnessConfig::default()
        };
        let (executor, sink) = executor_with(
            |_| SimResponse::new(Duration::from_millis(500), SimOutcome::Created),
            &config,
        )
        .await;
        let record = executor.execute(1).await;
        assert_eq!(record.outcome(), Outcome::Cancelled);
        assert_eq!(record.status_code(), 0);
        assert!(record.error_message().contains("50ms"));
        assert!(record.request_latency() >= Duration::from_millis(50));
        assert!(record.request_latency() < Duration::from_millis(500));
        assert_eq!(executor.successes().snapshot(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_store_still_yields_a_record() {
        let (executor, sink) = executor_with(
            |_| SimResponse::new(Duration::from_millis(1), SimOutcome::Panic),
            &HarnessConfig::default(),
        )
        .await;
        let record = executor.execute(1).await;
        assert_eq!(record.outcome(), Outcome::Unclassified);
        assert!(record.error_message().contains("panicked"));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn panic_payloads_render() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&5u8), "unknown panic");
    }
}
