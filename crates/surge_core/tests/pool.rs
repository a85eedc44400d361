mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use surge_core::{
    BookFactory, HarnessConfig, MemorySink, SimOutcome, SimResponse, StoreClient, WorkerPool,
};

use common::{by_attempt, client, connector};

#[tokio::test(start_paused = true)]
async fn workers_run_independent_sequences() {
    let connector = connector(|call| {
        if call % 3 == 0 {
            SimResponse::new(
                Duration::from_millis(4),
                SimOutcome::StoreError {
                    status: 429,
                    sub_status: 3200,
                },
            )
        } else {
            SimResponse::new(Duration::from_millis(4), SimOutcome::Created)
        }
    });
    let store: Arc<dyn StoreClient> = client(&connector).await;
    let sink = MemorySink::new();
    let config = HarnessConfig {
        worker_count: 3,
        target_attempts: 4,
        run_duration: Duration::ZERO,
        pacing_interval: Duration::from_millis(10),
        ..HarnessConfig::default()
    };

    let summaries = WorkerPool::new(config, store, Arc::new(BookFactory), Arc::new(sink.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(
        summaries.iter().map(|s| s.worker_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(summaries.iter().all(|s| s.attempts_issued == 4));
    assert_eq!(connector.write_calls(), 12);

    let mut per_worker: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
    for record in by_attempt(sink.records()) {
        per_worker
            .entry(record.worker_id())
            .or_default()
            .push(record.attempt_sequence());
    }
    assert_eq!(per_worker.len(), 3);
    assert!(per_worker.values().all(|seqs| seqs == &vec![1, 2, 3, 4]));

    let total: u64 = summaries.iter().map(|s| s.successes).sum();
    let confirmed = sink.records().iter().filter(|r| r.is_confirmed_success()).count() as u64;
    assert_eq!(total, confirmed);
    assert_eq!(total, 8);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let connector = connector(|_| SimResponse::new(Duration::ZERO, SimOutcome::Created));
    let store = client(&connector).await;
    let config = HarnessConfig {
        worker_count: 0,
        ..HarnessConfig::default()
    };
    let result = WorkerPool::new(config, store, Arc::new(BookFactory), Arc::new(MemorySink::new()))
        .run()
        .await;
    assert!(result.is_err());
}
