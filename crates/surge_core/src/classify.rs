//! Maps raw write results onto [`ResultRecord`]s.
//!
//! Full diagnostics are expensive to render and large on disk, so a success
//! keeps them only when the attempt was slower than the threshold. Failures
//! and slow successes always carry diagnostics; when the store gave none, a
//! caller-side summary (attempt, elapsed time, outcome) is attached instead.

use std::time::Duration;

use serde_json::json;

use crate::record::{AttemptContext, Outcome, RecordFields, ResultRecord};
use crate::store::{empty_diagnostics, is_empty_diagnostics, Diagnostics, WriteFailure, WriteResponse};

/// Latency above which a successful attempt keeps its full diagnostics.
pub const DIAGNOSTICS_LATENCY_THRESHOLD: Duration = Duration::from_millis(115);

#[derive(Clone, Copy, Debug)]
pub struct OutcomeClassifier {
    threshold: Duration,
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self::new(DIAGNOSTICS_LATENCY_THRESHOLD)
    }
}

impl OutcomeClassifier {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn classify(
        &self,
        context: AttemptContext,
        latency: Duration,
        result: Result<WriteResponse, WriteFailure>,
    ) -> ResultRecord {
        let fields = match result {
            Ok(response) => {
                let diagnostics = if latency > self.threshold {
                    or_caller_summary(response.diagnostics, context, latency, Outcome::Success)
                } else {
                    empty_diagnostics()
                };
                RecordFields {
                    outcome: Outcome::Success,
                    status_code: response.status,
                    sub_status_code: 0,
                    contacted_regions: response.contacted_regions,
                    request_latency: latency,
                    diagnostics,
                    error_message: String::new(),
                }
            }
            Err(failure) => {
                let error_message = failure.to_string();
                match failure {
                    WriteFailure::Store {
                        status,
                        sub_status,
                        diagnostics,
                    } => RecordFields {
                        outcome: Outcome::StoreError,
                        status_code: status,
                        sub_status_code: sub_status,
                        contacted_regions: regions_from(&diagnostics),
                        request_latency: latency,
                        diagnostics: or_caller_summary(
                            diagnostics,
                            context,
                            latency,
                            Outcome::StoreError,
                        ),
                        error_message,
                    },
                    WriteFailure::Cancelled { diagnostics, .. } => RecordFields {
                        outcome: Outcome::Cancelled,
                        status_code: 0,
                        sub_status_code: 0,
                        contacted_regions: regions_from(&diagnostics),
                        request_latency: latency,
                        diagnostics: or_caller_summary(
                            diagnostics,
                            context,
                            latency,
                            Outcome::Cancelled,
                        ),
                        error_message,
                    },
                    WriteFailure::Other(_) => RecordFields {
                        outcome: Outcome::Unclassified,
                        status_code: 0,
                        sub_status_code: 0,
                        contacted_regions: Vec::new(),
                        request_latency: latency,
                        diagnostics: caller_summary(context, latency, Outcome::Unclassified),
                        error_message,
                    },
                }
            }
        };
        ResultRecord::new(context, fields)
    }
}

/// Contacted regions embedded in failure diagnostics, if the store put them there.
fn regions_from(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics
        .get("contactedRegions")
        .and_then(|v| v.as_array())
        .map(|regions| {
            regions
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn or_caller_summary(
    diagnostics: Diagnostics,
    context: AttemptContext,
    latency: Duration,
    outcome: Outcome,
) -> Diagnostics {
    if is_empty_diagnostics(&diagnostics) {
        caller_summary(context, latency, outcome)
    } else {
        diagnostics
    }
}

fn caller_summary(context: AttemptContext, latency: Duration, outcome: Outcome) -> Diagnostics {
    json!({
        "source": "caller",
        "clientId": context.worker_id,
        "attempt": context.attempt,
        "outcome": outcome,
        "elapsedMs": latency.as_secs_f64() * 1_000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AttemptContext {
        AttemptContext {
            worker_id: 1,
            attempt: 4,
            successes_so_far: 2,
        }
    }

    fn created(diagnostics: Diagnostics) -> Result<WriteResponse, WriteFailure> {
        Ok(WriteResponse {
            status: 201,
            contacted_regions: vec!["West US 2".into()],
            diagnostics,
        })
    }

    #[test]
    fn fast_success_uses_placeholder() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(115),
            created(json!({"trace": "long"})),
        );
        assert_eq!(record.outcome(), Outcome::Success);
        assert_eq!(record.status_code(), 201);
        assert_eq!(record.contacted_regions(), ["West US 2".to_string()]);
        assert!(is_empty_diagnostics(record.diagnostics()));
        assert_eq!(record.error_message(), "");
        assert_eq!(record.successes_so_far(), 2);
    }

    #[test]
    fn slow_success_keeps_full_diagnostics() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(116),
            created(json!({"trace": "long"})),
        );
        assert_eq!(record.diagnostics()["trace"], "long");
    }

    #[test]
    fn slow_success_without_store_diagnostics_gets_summary() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(400),
            created(empty_diagnostics()),
        );
        assert_eq!(record.outcome(), Outcome::Success);
        assert!(!is_empty_diagnostics(record.diagnostics()));
        assert_eq!(record.diagnostics()["source"], "caller");
        assert_eq!(record.diagnostics()["outcome"], "success");

        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(400),
            created(serde_json::Value::Null),
        );
        assert_eq!(record.diagnostics()["attempt"], 4);
    }

    #[test]
    fn store_error_captures_both_codes() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(3),
            Err(WriteFailure::Store {
                status: 429,
                sub_status: 3200,
                diagnostics: json!({"contactedRegions": ["East US 2"]}),
            }),
        );
        assert_eq!(record.outcome(), Outcome::StoreError);
        assert_eq!((record.status_code(), record.sub_status_code()), (429, 3200));
        assert_eq!(record.contacted_regions(), ["East US 2".to_string()]);
        assert!(!is_empty_diagnostics(record.diagnostics()));
        assert!(record.error_message().contains("429"));
        assert!(!record.is_confirmed_success());
    }

    #[test]
    fn cancellation_without_store_diagnostics_gets_summary() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(7),
            Err(WriteFailure::Cancelled {
                message: "cancelled".into(),
                diagnostics: empty_diagnostics(),
            }),
        );
        assert_eq!(record.outcome(), Outcome::Cancelled);
        assert_eq!(record.status_code(), 0);
        assert_eq!(record.error_message(), "cancelled");
        assert_eq!(record.diagnostics()["source"], "caller");
        assert_eq!(record.diagnostics()["outcome"], "cancelled");
    }

    #[test]
    fn unclassified_keeps_codes_zero() {
        let record = OutcomeClassifier::default().classify(
            ctx(),
            Duration::from_millis(1),
            Err(WriteFailure::Other("socket closed".into())),
        );
        assert_eq!(record.outcome(), Outcome::Unclassified);
        assert_eq!((record.status_code(), record.sub_status_code()), (0, 0));
        assert!(record.contacted_regions().is_empty());
        assert_eq!(record.error_message(), "socket closed");
        assert!(!is_empty_diagnostics(record.diagnostics()));
    }
}
