//! Write-path load generation against a partitioned, multi-region store.
//!
//! A run resolves the account's preferred regions once, builds a single
//! long-lived store client, and then starts a fixed pool of workers. Each
//! worker paces out write attempts without waiting for earlier ones, bounds
//! every attempt by its own timeout, and emits exactly one [`ResultRecord`]
//! per attempt to the injected [`RecordSink`].
//!
//! ```text
//! RegionResolver ──► StoreClient (shared) ──► WorkerPool
//!                                              ├─ Dispatcher 0 ──► RequestExecutor ──► OutcomeClassifier ──► RecordSink
//!                                              └─ Dispatcher N ──► ...
//! ```

pub mod classify;
pub mod config;
pub mod counters;
pub mod dispatcher;
pub mod executor;
pub mod payload;
pub mod pool;
pub mod record;
pub mod regions;
pub mod resolver;
pub mod sim;
pub mod sink;
pub mod store;

pub use classify::{OutcomeClassifier, DIAGNOSTICS_LATENCY_THRESHOLD};
pub use config::{HarnessConfig, RUN_FOREVER};
pub use counters::SuccessCounter;
pub use dispatcher::{DispatchState, DispatchSummary, Dispatcher, RunPlan};
pub use executor::RequestExecutor;
pub use payload::{BookFactory, PayloadFactory};
pub use pool::WorkerPool;
pub use record::{AttemptContext, Outcome, ResultRecord};
pub use resolver::RegionResolver;
pub use sim::{SimOutcome, SimResponse, SimulatedConnector, SimulationProfile};
pub use sink::{ConsoleSink, FanoutSink, FileSink, MemorySink, RecordSink};
pub use store::{
    AccountTopology, ClientOptions, Credentials, Diagnostics, StoreClient, StoreConnector,
    WriteFailure, WriteResponse,
};
