//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use surge_core::{
    BookFactory, ClientOptions, Credentials, Dispatcher, HarnessConfig, MemorySink,
    RequestExecutor, ResultRecord, RunPlan, SimResponse, SimulatedConnector, StoreClient,
    StoreConnector,
};
use tokio_util::sync::CancellationToken;

pub const ENDPOINT: &str = "https://acct.documents.example.net:443/";

pub fn credentials() -> Credentials {
    Credentials::new("acct", "primary-key")
}

pub fn connector(plan: impl Fn(u64) -> SimResponse + Send + Sync + 'static) -> SimulatedConnector {
    SimulatedConnector::with_regions(&["West US 2", "East US 2"]).with_plan(plan)
}

pub async fn client(connector: &SimulatedConnector) -> Arc<dyn StoreClient> {
    let client = connector
        .connect(ENDPOINT, &credentials(), ClientOptions::default())
        .await
        .expect("simulated connect");
    Arc::from(client)
}

pub fn config(target_attempts: u64, run_duration: Duration, pacing: Duration) -> HarnessConfig {
    HarnessConfig {
        target_attempts,
        run_duration,
        pacing_interval: pacing,
        ..HarnessConfig::default()
    }
}

/// Builds a single-worker dispatcher writing into a fresh memory sink.
pub fn dispatcher(
    store: Arc<dyn StoreClient>,
    config: &HarnessConfig,
    shutdown: CancellationToken,
) -> (Dispatcher, MemorySink) {
    let sink = MemorySink::new();
    let executor = RequestExecutor::new(
        0,
        store,
        Arc::new(BookFactory),
        Arc::new(sink.clone()),
        config,
    );
    let plan = RunPlan {
        target_attempts: config.target_attempts,
        run_duration: config.run_duration,
        pacing_interval: config.pacing_interval,
    };
    (Dispatcher::new(executor, plan, shutdown), sink)
}

/// Records sorted by attempt sequence.
pub fn by_attempt(mut records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    records.sort_by_key(|r| (r.worker_id(), r.attempt_sequence()));
    records
}

/// Asserts attempt sequences are exactly `1..=n`.
pub fn assert_gap_free(records: &[ResultRecord], n: u64) {
    let seqs = records.iter().map(|r| r.attempt_sequence()).collect::<Vec<_>>();
    assert_eq!(seqs, (1..=n).collect::<Vec<_>>());
}
