//! Run configuration shared by every worker.

use std::time::Duration;

use crate::classify::DIAGNOSTICS_LATENCY_THRESHOLD;
use crate::regions::DEFAULT_TEST_MARKER;

/// Duration used when a run should continue until stopped externally.
pub const RUN_FOREVER: Duration = Duration::from_secs(99_999 * 24 * 60 * 60);

/// Inputs fixed before any worker starts.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Attempts each worker issues at minimum.
    pub target_attempts: u64,
    /// Each worker keeps issuing until this much time has passed, at minimum.
    pub run_duration: Duration,
    /// Delay between launching consecutive attempts.
    pub pacing_interval: Duration,
    /// Wall-clock budget of one attempt; the write is cancelled when it expires.
    pub attempt_timeout: Duration,
    /// Timeout handed to the store client for each request.
    pub request_timeout: Duration,
    /// Successes slower than this keep full diagnostics.
    pub diagnostics_threshold: Duration,
    /// Endpoint substring marking a non-production account.
    pub environment_marker: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            target_attempts: 1,
            run_duration: RUN_FOREVER,
            pacing_interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(7),
            request_timeout: Duration::from_secs(5),
            diagnostics_threshold: DIAGNOSTICS_LATENCY_THRESHOLD,
            environment_marker: DEFAULT_TEST_MARKER.to_string(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.worker_count > 0, "worker count must be > 0");
        anyhow::ensure!(
            !self.pacing_interval.is_zero(),
            "pacing interval must be > 0"
        );
        anyhow::ensure!(
            !self.attempt_timeout.is_zero(),
            "attempt timeout must be > 0"
        );
        anyhow::ensure!(
            !self.request_timeout.is_zero(),
            "request timeout must be > 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.diagnostics_threshold, Duration::from_millis(115));
        assert_eq!(config.environment_marker, "test");
    }

    #[test]
    fn rejects_zero_workers_and_pacing() {
        let config = HarnessConfig {
            worker_count: 0,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
        let config = HarnessConfig {
            pacing_interval: Duration::ZERO,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
