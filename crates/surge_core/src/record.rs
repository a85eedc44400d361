//! Per-attempt outcome records.
//!
//! A [`ResultRecord`] is built once by the classifier when an attempt finishes
//! and is read-only from then on. Sinks receive it by reference and render it
//! with [`ResultRecord::to_line`], a single-line JSON object.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::Diagnostics;

/// Identity of an attempt, fixed before the write is submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptContext {
    pub worker_id: u32,
    /// 1-based issuance order within the worker.
    pub attempt: u64,
    /// Worker success count read when the attempt started.
    pub successes_so_far: u64,
}

/// Coarse outcome category of an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    StoreError,
    Cancelled,
    Unclassified,
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

/// Outcome of one write attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    timestamp: DateTime<Utc>,
    context: AttemptContext,
    outcome: Outcome,
    status_code: u16,
    sub_status_code: u32,
    contacted_regions: Vec<String>,
    request_latency: Duration,
    diagnostics: Diagnostics,
    error_message: String,
}

/// Field values for a new record. Everything not listed here defaults to zero/empty.
#[derive(Clone, Debug)]
pub(crate) struct RecordFields {
    pub outcome: Outcome,
    pub status_code: u16,
    pub sub_status_code: u32,
    pub contacted_regions: Vec<String>,
    pub request_latency: Duration,
    pub diagnostics: Diagnostics,
    pub error_message: String,
}

impl ResultRecord {
    /// Stamps the record with the current time.
    pub(crate) fn new(context: AttemptContext, fields: RecordFields) -> Self {
        Self {
            timestamp: Utc::now(),
            context,
            outcome: fields.outcome,
            status_code: fields.status_code,
            sub_status_code: fields.sub_status_code,
            contacted_regions: fields.contacted_regions,
            request_latency: fields.request_latency,
            diagnostics: fields.diagnostics,
            error_message: fields.error_message,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn worker_id(&self) -> u32 {
        self.context.worker_id
    }

    pub fn attempt_sequence(&self) -> u64 {
        self.context.attempt
    }

    pub fn successes_so_far(&self) -> u64 {
        self.context.successes_so_far
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn sub_status_code(&self) -> u32 {
        self.sub_status_code
    }

    pub fn contacted_regions(&self) -> &[String] {
        &self.contacted_regions
    }

    pub fn request_latency(&self) -> Duration {
        self.request_latency
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// True when the store confirmed the item was created.
    pub fn is_confirmed_success(&self) -> bool {
        self.outcome == Outcome::Success && self.status_code == crate::store::STATUS_CREATED
    }

    /// Renders the record as one line of JSON.
    pub fn to_line(&self) -> String {
        let line = RecordLine {
            timestamp: format_timestamp(self.timestamp),
            client_id: self.context.worker_id,
            attempts: self.context.attempt,
            successes: self.context.successes_so_far,
            status: self.status_code,
            substatus: self.sub_status_code,
            request_latency_ms: self.request_latency.as_millis() as u64,
            contacted_regions: &self.contacted_regions,
            diagnostics: &self.diagnostics,
            error_message: &self.error_message,
        };
        // Every field is a string, integer, or already-valid JSON value.
        serde_json::to_string(&line).unwrap_or_else(|err| {
            format!(
                "{{\"clientId\":{},\"attempts\":{},\"errorMessage\":\"record serialization failed: {}\"}}",
                self.context.worker_id,
                self.context.attempt,
                err.to_string().replace('"', "'")
            )
        })
    }
}

/// Wire shape of a record line. Field order is part of the format.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordLine<'a> {
    timestamp: String,
    client_id: u32,
    attempts: u64,
    successes: u64,
    status: u16,
    substatus: u32,
    #[serde(rename = "RequestLatencyMS")]
    request_latency_ms: u64,
    contacted_regions: &'a [String],
    diagnostics: &'a Diagnostics,
    error_message: &'a str,
}

/// `yyyy-MM-dd HH:mm:ss.fffffff` in UTC (100ns resolution).
fn format_timestamp(ts: DateTime<Utc>) -> String {
    let ticks = (ts.timestamp_subsec_nanos() / 100).min(9_999_999);
    format!("{}.{ticks:07}", ts.format("%Y-%m-%d %H:%M:%S"))
}
