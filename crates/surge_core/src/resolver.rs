//! Preferred-region bootstrap.
//!
//! Before the long-lived client is built, a throwaway connection reads the
//! account topology once. The preference list is the writable regions followed
//! by the readable regions, each in listed order, keeping only the first
//! occurrence of every region. Any failure is logged and replaced by a fixed
//! fallback list chosen from the endpoint, so bootstrap never fails the run.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use tokio::time;
use tracing::{error, info, warn};

use crate::regions::{fallback_regions, DEFAULT_TEST_MARKER};
use crate::store::{AccountTopology, ClientOptions, Credentials, StoreConnector};

pub struct RegionResolver<'a> {
    connector: &'a dyn StoreConnector,
    environment_marker: String,
    options: ClientOptions,
}

impl<'a> RegionResolver<'a> {
    pub fn new(connector: &'a dyn StoreConnector) -> Self {
        Self {
            connector,
            environment_marker: DEFAULT_TEST_MARKER.to_string(),
            options: ClientOptions::for_bootstrap(),
        }
    }

    pub fn with_environment_marker(mut self, marker: impl Into<String>) -> Self {
        self.environment_marker = marker.into();
        self
    }

    /// Upper bound on the topology query; defaults to the bootstrap client's request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Ordered, de-duplicated region preference list. Never empty.
    pub async fn resolve(&self, endpoint: &str, credentials: &Credentials) -> Vec<String> {
        match self.query(endpoint, credentials).await {
            Ok(regions) if !regions.is_empty() => {
                info!(?regions, "resolved preferred regions from account topology");
                regions
            }
            Ok(_) => {
                let fallback = fallback_regions(endpoint, &self.environment_marker);
                warn!(?fallback, "account topology listed no regions; using fallback regions");
                fallback
            }
            Err(err) => {
                let fallback = fallback_regions(endpoint, &self.environment_marker);
                error!(error = %format!("{err:#}"), ?fallback, "failed to get the preferred regions; using fallback regions");
                fallback
            }
        }
    }

    async fn query(&self, endpoint: &str, credentials: &Credentials) -> anyhow::Result<Vec<String>> {
        let timeout = self.options.request_timeout;
        let client = time::timeout(
            timeout,
            self.connector.connect(endpoint, credentials, self.options.clone()),
        )
        .await
        .context("bootstrap connection timed out")?
        .context("open bootstrap connection")?;
        let topology = time::timeout(timeout, client.read_topology())
            .await
            .context("topology query timed out")?
            .context("read account topology")?;
        Ok(preference_order(&topology))
    }
}

/// Writable regions then readable regions, first occurrence wins.
pub fn preference_order(topology: &AccountTopology) -> Vec<String> {
    let mut seen = HashSet::new();
    topology
        .writable_regions
        .iter()
        .chain(topology.readable_regions.iter())
        .filter(|region| seen.insert(region.as_str()))
        .cloned()
        .collect()
}
