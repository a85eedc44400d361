//! Boundary types and traits for the data store under test.
//!
//! Workers never talk to a wire protocol directly. Everything the harness needs
//! from the store goes through [`StoreConnector`] and [`StoreClient`], so the
//! same dispatch engine drives a real client or the in-process simulator in
//! [`crate::sim`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Opaque structured trace of one store call.
pub type Diagnostics = Value;

/// Status code the store returns when a write created the item.
pub const STATUS_CREATED: u16 = 201;

/// Placeholder diagnostics used when the full blob is not captured.
pub fn empty_diagnostics() -> Diagnostics {
    Value::Object(serde_json::Map::new())
}

/// Returns true for the `{}` placeholder (or a JSON null).
pub fn is_empty_diagnostics(diagnostics: &Diagnostics) -> bool {
    match diagnostics {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Account topology as reported by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountTopology {
    /// Regions accepting writes, in the order the account lists them.
    pub writable_regions: Vec<String>,
    /// Regions serving reads, in the order the account lists them.
    pub readable_regions: Vec<String>,
}

/// Account name and key used to authenticate against the store.
#[derive(Clone)]
pub struct Credentials {
    pub account_name: String,
    pub key: String,
}

impl Credentials {
    pub fn new(account_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_name", &self.account_name)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Options a store client is built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Ordered region preference used for routing.
    pub preferred_regions: Vec<String>,
    /// Per-request timeout enforced by the client itself.
    pub request_timeout: Duration,
    /// Retries on throttled (429) responses. The harness wants raw outcomes, so 0.
    pub max_rate_limited_retries: u32,
    pub idle_connection_timeout: Duration,
    pub open_connection_timeout: Duration,
    pub application_name: String,
    /// Whether the client reports telemetry back to the service.
    pub client_telemetry: bool,
    /// Partition-level failover. Required on the long-lived client.
    pub partition_level_failover: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            preferred_regions: Vec::new(),
            request_timeout: Duration::from_secs(5),
            max_rate_limited_retries: 0,
            idle_connection_timeout: Duration::from_secs(10 * 60),
            open_connection_timeout: Duration::from_secs(1),
            application_name: String::new(),
            client_telemetry: true,
            partition_level_failover: true,
        }
    }
}

impl ClientOptions {
    /// Options for the short-lived connection that only reads topology.
    pub fn for_bootstrap() -> Self {
        Self {
            partition_level_failover: false,
            client_telemetry: false,
            ..Self::default()
        }
    }

    pub fn with_preferred_regions(mut self, regions: Vec<String>) -> Self {
        self.preferred_regions = regions;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_client_telemetry(mut self, enabled: bool) -> Self {
        self.client_telemetry = enabled;
        self
    }

    /// Post-construction check that the client runs with partition-level failover.
    pub fn ensure_partition_failover(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.partition_level_failover,
            "partition-level failover is not enabled on the store client"
        );
        Ok(())
    }
}

/// Structured success response of a write.
#[derive(Clone, Debug)]
pub struct WriteResponse {
    pub status: u16,
    /// Regions touched while serving the write, in contact order.
    pub contacted_regions: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Ways a write can fail.
#[derive(Debug, thiserror::Error)]
pub enum WriteFailure {
    /// The store rejected or failed the write with a defined status pair.
    #[error("store returned status {status} (substatus {sub_status})")]
    Store {
        status: u16,
        sub_status: u32,
        diagnostics: Diagnostics,
    },
    /// The write was cancelled before it completed.
    #[error("{message}")]
    Cancelled {
        message: String,
        diagnostics: Diagnostics,
    },
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Client handle for an open store connection.
///
/// Implementations must be safe to share across every worker; the harness
/// only ever calls them through `&self`. Dropping the handle releases the
/// connection.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Options the client was built with.
    fn options(&self) -> &ClientOptions;

    /// Reads the account's writable and readable region lists.
    async fn read_topology(&self) -> anyhow::Result<AccountTopology>;

    /// Creates one item, giving up after `request_timeout`.
    async fn create_item(
        &self,
        document: Value,
        request_timeout: Duration,
    ) -> Result<WriteResponse, WriteFailure>;
}

/// Opens store connections.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        options: ClientOptions,
    ) -> anyhow::Result<Box<dyn StoreClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_options_disable_failover() {
        let options = ClientOptions::for_bootstrap();
        assert!(!options.partition_level_failover);
        assert!(options.ensure_partition_failover().is_err());
        assert!(ClientOptions::default().ensure_partition_failover().is_ok());
    }

    #[test]
    fn credentials_debug_hides_key() {
        let creds = Credentials::new("acct", "super-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("acct"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn placeholder_diagnostics_detection() {
        assert!(is_empty_diagnostics(&empty_diagnostics()));
        assert!(is_empty_diagnostics(&Value::Null));
        assert!(!is_empty_diagnostics(&serde_json::json!({"a": 1})));
    }
}
