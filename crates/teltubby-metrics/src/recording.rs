// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all teltubby metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("teltubby_messages_total", "Archive units committed");
    describe_counter!("teltubby_ingested_bytes_total", "Bytes uploaded to the bucket");
    describe_counter!("teltubby_dedup_hits_total", "Items resolved as duplicates");
    describe_counter!("teltubby_skipped_items_total", "Items skipped before upload");
    describe_counter!("teltubby_errors_total", "Item or unit aborts by error kind");
    describe_counter!("teltubby_jobs_completed_total", "Queue jobs completed");
    describe_counter!("teltubby_jobs_failed_total", "Queue jobs failed");
    describe_gauge!("teltubby_bucket_used_ratio", "Bucket usage ratio, 0..1");
    describe_gauge!(
        "teltubby_quota_gate_open",
        "1 while ingestion is admitted, 0 while suspended"
    );
    describe_histogram!(
        "teltubby_processing_seconds",
        "Unit processing latency in seconds"
    );
}

/// Record one committed archive unit.
pub fn record_ingested_message() {
    metrics::counter!("teltubby_messages_total").increment(1);
}

/// Record bytes uploaded to the bucket.
pub fn record_ingested_bytes(bytes: u64) {
    metrics::counter!("teltubby_ingested_bytes_total").increment(bytes);
}

/// Record a dedup hit, labelled by reason (`unique_id` | `sha256`).
pub fn record_dedup_hit(reason: &str) {
    metrics::counter!("teltubby_dedup_hits_total", "reason" => reason.to_string()).increment(1);
}

/// Record a skipped item, labelled by reason.
pub fn record_skipped_item(reason: &str) {
    metrics::counter!("teltubby_skipped_items_total", "reason" => reason.to_string()).increment(1);
}

/// Record an item or unit abort, labelled by error kind.
pub fn record_error(kind: &str) {
    metrics::counter!("teltubby_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Record a completed queue job.
pub fn record_job_completed() {
    metrics::counter!("teltubby_jobs_completed_total").increment(1);
}

/// Record a failed queue job.
pub fn record_job_failed() {
    metrics::counter!("teltubby_jobs_failed_total").increment(1);
}

/// Set the bucket usage ratio gauge.
pub fn set_bucket_used_ratio(ratio: f64) {
    metrics::gauge!("teltubby_bucket_used_ratio").set(ratio);
}

/// Set the quota gate state gauge.
pub fn set_quota_gate_open(open: bool) {
    metrics::gauge!("teltubby_quota_gate_open").set(if open { 1.0 } else { 0.0 });
}

/// Record unit processing latency.
pub fn record_processing_seconds(seconds: f64) {
    metrics::histogram!("teltubby_processing_seconds").record(seconds);
}
