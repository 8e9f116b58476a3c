// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota gate: admission control based on bucket usage.
//!
//! Polls the object store for usage and closes ingestion while the
//! bucket is at 100% of its configured quota. With no quota configured
//! the ratio is unknown and the gate stays open.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teltubby_config::model::QuotaConfig;
use teltubby_core::traits::ObjectStore;
use teltubby_core::ArchiveError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Admission state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Ratio below 1.0 or unknown; ingestion admitted.
    Open,
    /// Ratio at or above 1.0; ingestion suspended.
    Closed,
}

/// Process-wide quota gate. Constructed at startup and passed as an
/// explicit collaborator to the pipeline and the worker.
pub struct QuotaGate {
    store: Arc<dyn ObjectStore>,
    quota_bytes: Option<u64>,
    poll_interval: Duration,
    open: AtomicBool,
    used_bytes: AtomicU64,
    has_measurement: AtomicBool,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn ObjectStore>, config: &QuotaConfig) -> Self {
        Self {
            store,
            quota_bytes: config.bucket_quota_bytes,
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            // Unknown usage starts open.
            open: AtomicBool::new(true),
            used_bytes: AtomicU64::new(0),
            has_measurement: AtomicBool::new(false),
        }
    }

    /// Current admission state, from the last poll.
    pub fn state(&self) -> GateState {
        if self.open.load(Ordering::Acquire) {
            GateState::Open
        } else {
            GateState::Closed
        }
    }

    /// Last measured usage ratio in [0, 1], or `None` when unknown
    /// (no quota configured, or no measurement yet).
    pub fn used_ratio(&self) -> Option<f64> {
        let quota = self.quota_bytes?;
        if quota == 0 || !self.has_measurement.load(Ordering::Acquire) {
            return None;
        }
        let used = self.used_bytes.load(Ordering::Acquire) as f64;
        Some((used / quota as f64).min(1.0))
    }

    /// Poll the store once and update the gate state and gauges.
    pub async fn refresh(&self) -> Result<Option<f64>, ArchiveError> {
        let Some(quota) = self.quota_bytes else {
            // Unbounded bucket: nothing to measure, gate stays open.
            teltubby_metrics::set_quota_gate_open(true);
            return Ok(None);
        };

        let used = self.store.usage_bytes().await?;
        self.used_bytes.store(used, Ordering::Release);
        self.has_measurement.store(true, Ordering::Release);

        let ratio = (used as f64 / quota as f64).min(1.0);
        let was_open = self.open.load(Ordering::Acquire);
        let now_open = ratio < 1.0;
        self.open.store(now_open, Ordering::Release);

        teltubby_metrics::set_bucket_used_ratio(ratio);
        teltubby_metrics::set_quota_gate_open(now_open);

        if was_open && !now_open {
            warn!(used, quota, "bucket at 100% capacity, suspending ingestion");
        } else if !was_open && now_open {
            info!(used, quota, "bucket usage dropped, resuming ingestion");
        }

        Ok(Some(ratio))
    }

    /// Long-lived poller task. One per process.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "quota poll failed; keeping previous gate state");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    info!("quota poller stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use teltubby_test_utils::MemoryStore;

    fn quota_config(quota: Option<u64>) -> QuotaConfig {
        QuotaConfig {
            bucket_quota_bytes: quota,
            poll_interval_seconds: 300,
        }
    }

    #[tokio::test]
    async fn unknown_quota_keeps_gate_open() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let gate = QuotaGate::new(store, &quota_config(None));
        assert_eq!(gate.refresh().await.unwrap(), None);
        assert_eq!(gate.state(), GateState::Open);
        assert_eq!(gate.used_ratio(), None);
    }

    #[tokio::test]
    async fn gate_closes_at_full_and_reopens_when_usage_drops() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let gate = QuotaGate::new(store.clone(), &quota_config(Some(100)));

        store
            .put_bytes("a", Bytes::from(vec![0u8; 40]), None)
            .await
            .unwrap();
        let ratio = gate.refresh().await.unwrap().unwrap();
        assert!((ratio - 0.4).abs() < f64::EPSILON);
        assert_eq!(gate.state(), GateState::Open);

        store
            .put_bytes("b", Bytes::from(vec![0u8; 60]), None)
            .await
            .unwrap();
        let ratio = gate.refresh().await.unwrap().unwrap();
        assert!((ratio - 1.0).abs() < f64::EPSILON);
        assert_eq!(gate.state(), GateState::Closed);
        assert_eq!(gate.used_ratio(), Some(1.0));

        store.delete("b").await.unwrap();
        gate.refresh().await.unwrap();
        assert_eq!(gate.state(), GateState::Open);
    }

    #[tokio::test]
    async fn ratio_is_capped_at_one() {
        let store = Arc::new(MemoryStore::new("bucket"));
        store
            .put_bytes("a", Bytes::from(vec![0u8; 250]), None)
            .await
            .unwrap();
        let gate = QuotaGate::new(store, &quota_config(Some(100)));
        assert_eq!(gate.refresh().await.unwrap(), Some(1.0));
        assert_eq!(gate.state(), GateState::Closed);
    }
}
