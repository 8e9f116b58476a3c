// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the teltubby archiver.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text format via [`MetricsHandle::render`],
//! which is exposed through the health server's /metrics endpoint.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use teltubby_core::ArchiveError;

pub use recording::{
    record_dedup_hit, record_error, record_ingested_bytes, record_ingested_message,
    record_job_completed, record_job_failed, record_processing_seconds, record_skipped_item,
    set_bucket_used_ratio, set_quota_gate_open,
};

/// Installed Prometheus recorder.
///
/// Installs the recorder globally; only one recorder can be installed per
/// process. Returns an error if a recorder is already installed.
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    pub fn install() -> Result<Self, ArchiveError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ArchiveError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        // The metrics facade drops events when no recorder is installed;
        // none of these may panic.
        record_ingested_message();
        record_ingested_bytes(1024);
        record_dedup_hit("unique_id");
        record_skipped_item("oversize_configured");
        record_error("upload_transient");
        record_job_completed();
        record_job_failed();
        set_bucket_used_ratio(0.5);
        set_quota_gate_open(true);
        record_processing_seconds(0.25);
    }
}
