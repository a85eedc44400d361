//! In-process store used when no real backend is wired in.
//!
//! [`SimulatedConnector`] hands out [`SimulatedStore`] handles that answer
//! topology queries and writes according to a response plan. The plan is a
//! function of the global write call number, so tests can script exact
//! latencies and outcomes, and the CLI can draw them from a seeded RNG.
//!
//! The simulator also behaves like a client with its own request timeout
//! (slow writes come back as `408`) and rejects documents that lack the
//! partition key (`400/1001`).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::time;

use crate::store::{
    AccountTopology, ClientOptions, Credentials, Diagnostics, StoreClient, StoreConnector,
    WriteFailure, WriteResponse,
};

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_REQUEST_TIMEOUT: u16 = 408;
pub const SUBSTATUS_PARTITION_KEY_MISMATCH: u32 = 1001;

/// Store errors the random profile draws from.
const TRANSIENT_ERRORS: &[(u16, u32)] = &[(429, 3200), (503, 21008), (410, 1002), (449, 0)];

/// What a simulated write does once its latency has elapsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimOutcome {
    /// `201 Created`.
    Created,
    /// A non-error status other than `201`.
    Status(u16),
    StoreError { status: u16, sub_status: u32 },
    /// Client-side cancellation reported by the store client.
    Cancelled,
    /// Failure outside the store's status taxonomy.
    Failure(String),
    /// Panics inside the store call.
    Panic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimResponse {
    pub latency: Duration,
    pub outcome: SimOutcome,
}

impl SimResponse {
    pub fn new(latency: Duration, outcome: SimOutcome) -> Self {
        Self { latency, outcome }
    }
}

/// Maps the 1-based write call number to a response.
pub type ResponsePlan = Arc<dyn Fn(u64) -> SimResponse + Send + Sync>;

/// Randomized response profile.
#[derive(Clone, Debug)]
pub struct SimulationProfile {
    /// Base latency of every write.
    pub latency: Duration,
    /// Extra uniformly distributed latency in `[0, jitter]`.
    pub jitter: Duration,
    /// Percent of writes failing with a transient store error.
    pub store_error_pct: u8,
    /// Percent of writes failing outside the store taxonomy.
    pub failure_pct: u8,
    /// RNG seed; 0 picks one at random.
    pub seed: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            jitter: Duration::from_millis(150),
            store_error_pct: 2,
            failure_pct: 0,
            seed: 0,
        }
    }
}

impl SimulationProfile {
    pub fn into_plan(self) -> ResponsePlan {
        let seed = if self.seed == 0 {
            rand::thread_rng().gen()
        } else {
            self.seed
        };
        let rng = Mutex::new(SmallRng::seed_from_u64(seed));
        Arc::new(move |_call: u64| {
            let mut rng = match rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let jitter_us = self.jitter.as_micros() as u64;
            let extra = if jitter_us == 0 {
                0
            } else {
                rng.gen_range(0..=jitter_us)
            };
            let latency = self.latency + Duration::from_micros(extra);
            let roll = rng.gen_range(0..100u32);
            let outcome = if roll < self.store_error_pct as u32 {
                let (status, sub_status) = TRANSIENT_ERRORS[rng.gen_range(0..TRANSIENT_ERRORS.len())];
                SimOutcome::StoreError { status, sub_status }
            } else if roll < self.store_error_pct as u32 + self.failure_pct as u32 {
                SimOutcome::Failure("connection reset by peer".to_string())
            } else {
                SimOutcome::Created
            };
            SimResponse::new(latency, outcome)
        })
    }
}

#[derive(Clone, Debug)]
enum TopologyMode {
    Available(AccountTopology),
    QueryFails,
    QueryHangs,
    ConnectFails,
}

/// Opens [`SimulatedStore`] connections.
#[derive(Clone)]
pub struct SimulatedConnector {
    topology: TopologyMode,
    plan: ResponsePlan,
    partition_key_path: String,
    open_connections: Arc<AtomicUsize>,
    write_calls: Arc<AtomicU64>,
}

impl SimulatedConnector {
    pub fn new(topology: AccountTopology) -> Self {
        Self {
            topology: TopologyMode::Available(topology),
            plan: SimulationProfile::default().into_plan(),
            partition_key_path: "/id".to_string(),
            open_connections: Arc::new(AtomicUsize::new(0)),
            write_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Single-region-list account: every region both writable and readable.
    pub fn with_regions(regions: &[&str]) -> Self {
        let regions = regions.iter().map(|r| r.to_string()).collect::<Vec<_>>();
        Self::new(AccountTopology {
            writable_regions: regions.clone(),
            readable_regions: regions,
        })
    }

    /// Topology queries fail after connecting.
    pub fn failing_topology(mut self) -> Self {
        self.topology = TopologyMode::QueryFails;
        self
    }

    /// Topology queries never answer.
    pub fn hanging_topology(mut self) -> Self {
        self.topology = TopologyMode::QueryHangs;
        self
    }

    /// Connecting fails outright.
    pub fn failing_connect(mut self) -> Self {
        self.topology = TopologyMode::ConnectFails;
        self
    }

    pub fn with_plan(mut self, plan: impl Fn(u64) -> SimResponse + Send + Sync + 'static) -> Self {
        self.plan = Arc::new(plan);
        self
    }

    pub fn with_profile(mut self, profile: SimulationProfile) -> Self {
        self.plan = profile.into_plan();
        self
    }

    pub fn with_partition_key_path(mut self, path: impl Into<String>) -> Self {
        self.partition_key_path = path.into();
        self
    }

    /// Connections handed out and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    /// Writes submitted across all connections.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl StoreConnector for SimulatedConnector {
    async fn connect(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        options: ClientOptions,
    ) -> anyhow::Result<Box<dyn StoreClient>> {
        if matches!(self.topology, TopologyMode::ConnectFails) {
            bail!("connect to {endpoint}: connection refused");
        }
        if credentials.key.is_empty() {
            bail!("connect to {endpoint}: empty account key");
        }
        self.open_connections.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(SimulatedStore {
            endpoint: endpoint.to_string(),
            options,
            topology: self.topology.clone(),
            plan: Arc::clone(&self.plan),
            partition_key_path: self.partition_key_path.clone(),
            write_calls: Arc::clone(&self.write_calls),
            _guard: ConnectionGuard(Arc::clone(&self.open_connections)),
        }))
    }
}

/// Releases the connection slot when the store handle is dropped.
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One simulated connection.
pub struct SimulatedStore {
    endpoint: String,
    options: ClientOptions,
    topology: TopologyMode,
    plan: ResponsePlan,
    partition_key_path: String,
    write_calls: Arc<AtomicU64>,
    _guard: ConnectionGuard,
}

impl SimulatedStore {
    fn serving_region(&self) -> String {
        if let Some(region) = self.options.preferred_regions.first() {
            return region.clone();
        }
        match &self.topology {
            TopologyMode::Available(t) => t
                .writable_regions
                .first()
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            _ => "Unknown".to_string(),
        }
    }

    fn diagnostics(&self, call: u64, region: &str, latency: Duration) -> Diagnostics {
        json!({
            "name": "CreateItem",
            "endpoint": self.endpoint,
            "call": call,
            "contactedRegions": [region],
            "clientElapsedMs": latency.as_secs_f64() * 1_000.0,
            "partitionLevelFailover": self.options.partition_level_failover,
        })
    }
}

#[async_trait]
impl StoreClient for SimulatedStore {
    fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn read_topology(&self) -> anyhow::Result<AccountTopology> {
        match &self.topology {
            TopologyMode::Available(topology) => Ok(topology.clone()),
            TopologyMode::QueryHangs => std::future::pending().await,
            _ => bail!("read account from {}: service unavailable", self.endpoint),
        }
    }

    async fn create_item(
        &self,
        document: Value,
        request_timeout: Duration,
    ) -> Result<WriteResponse, WriteFailure> {
        let call = self.write_calls.fetch_add(1, Ordering::AcqRel) + 1;
        let region = self.serving_region();

        if document.pointer(&self.partition_key_path).is_none() {
            return Err(WriteFailure::Store {
                status: STATUS_BAD_REQUEST,
                sub_status: SUBSTATUS_PARTITION_KEY_MISMATCH,
                diagnostics: self.diagnostics(call, &region, Duration::ZERO),
            });
        }

        let response = (self.plan)(call);
        if response.latency > request_timeout {
            time::sleep(request_timeout).await;
            return Err(WriteFailure::Store {
                status: STATUS_REQUEST_TIMEOUT,
                sub_status: 0,
                diagnostics: self.diagnostics(call, &region, request_timeout),
            });
        }
        time::sleep(response.latency).await;

        let diagnostics = self.diagnostics(call, &region, response.latency);
        match response.outcome {
            SimOutcome::Created => Ok(WriteResponse {
                status: crate::store::STATUS_CREATED,
                contacted_regions: vec![region],
                diagnostics,
            }),
            SimOutcome::Status(status) => Ok(WriteResponse {
                status,
                contacted_regions: vec![region],
                diagnostics,
            }),
            SimOutcome::StoreError { status, sub_status } => Err(WriteFailure::Store {
                status,
                sub_status,
                diagnostics,
            }),
            SimOutcome::Cancelled => Err(WriteFailure::Cancelled {
                message: "the operation was canceled by the client".to_string(),
                diagnostics,
            }),
            SimOutcome::Failure(message) => Err(WriteFailure::Other(message)),
            SimOutcome::Panic => panic!("simulated store fault on call {call}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("acct", "key")
    }

    #[tokio::test]
    async fn connections_are_released_on_drop() {
        let connector = SimulatedConnector::with_regions(&["West US 2"]);
        let a = connector
            .connect("e", &creds(), ClientOptions::default())
            .await
            .unwrap();
        let b = connector
            .connect("e", &creds(), ClientOptions::default())
            .await
            .unwrap();
        assert_eq!(connector.open_connections(), 2);
        drop(a);
        assert_eq!(connector.open_connections(), 1);
        drop(b);
        assert_eq!(connector.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_writes_hit_the_request_timeout() {
        let connector = SimulatedConnector::with_regions(&["East US 2"])
            .with_plan(|_| SimResponse::new(Duration::from_secs(9), SimOutcome::Created));
        let client = connector
            .connect("e", &creds(), ClientOptions::default())
            .await
            .unwrap();
        let err = client
            .create_item(json!({"id": "1"}), Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            WriteFailure::Store { status, .. } => assert_eq!(status, STATUS_REQUEST_TIMEOUT),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_partition_key_is_rejected() {
        let connector = SimulatedConnector::with_regions(&["East US 2"])
            .with_partition_key_path("/tenant");
        let client = connector
            .connect("e", &creds(), ClientOptions::default())
            .await
            .unwrap();
        let err = client
            .create_item(json!({"id": "1"}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WriteFailure::Store {
                status: STATUS_BAD_REQUEST,
                sub_status: SUBSTATUS_PARTITION_KEY_MISMATCH,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn preferred_region_is_contacted() {
        let connector = SimulatedConnector::with_regions(&["West US 2", "East US 2"])
            .with_plan(|_| SimResponse::new(Duration::from_millis(3), SimOutcome::Created));
        let options = ClientOptions::default().with_preferred_regions(vec!["East US 2".into()]);
        let client = connector.connect("e", &creds(), options).await.unwrap();
        let response = client
            .create_item(json!({"id": "1"}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.status, crate::store::STATUS_CREATED);
        assert_eq!(response.contacted_regions, vec!["East US 2".to_string()]);
        assert_eq!(connector.write_calls(), 1);
    }

    #[test]
    fn seeded_profiles_are_deterministic() {
        let profile = SimulationProfile {
            store_error_pct: 40,
            failure_pct: 10,
            seed: 7,
            ..SimulationProfile::default()
        };
        let a = profile.clone().into_plan();
        let b = profile.into_plan();
        for call in 1..50 {
            assert_eq!(a(call), b(call));
        }
    }
}
