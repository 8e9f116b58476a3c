// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-protocol session health monitoring.
//!
//! Periodically probes the session; a detected invalidation raises the
//! hold flag (the worker stops taking jobs) and notifies administrators.
//! Recovery lowers the flag and notifies again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teltubby_core::traits::{Notifier, UserTransport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic session prober owning the worker's hold flag.
pub struct SessionMonitor {
    transport: Arc<dyn UserTransport>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    hold: Arc<AtomicBool>,
}

impl SessionMonitor {
    pub fn new(
        transport: Arc<dyn UserTransport>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            notifier,
            interval,
            hold: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag consulted by the delivery processor.
    pub fn hold_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.hold)
    }

    /// Probe once and update the hold flag; notifications fire on edges.
    pub async fn probe_once(&self) {
        let healthy = matches!(self.transport.is_authorized().await, Ok(true));
        let was_holding = self.hold.load(Ordering::Acquire);

        if !healthy && !was_holding {
            self.hold.store(true, Ordering::Release);
            warn!("user-protocol session invalid, entering hold state");
            let _ = self
                .notifier
                .notify_admins(
                    "⚠️ User-protocol session expired or unauthenticated. \
                     Large-file processing is on hold until the session is restored.",
                )
                .await;
        } else if healthy && was_holding {
            self.hold.store(false, Ordering::Release);
            info!("user-protocol session restored");
            let _ = self
                .notifier
                .notify_admins("✅ User-protocol session restored. Large-file processing resumed.")
                .await;
        }
    }

    /// Long-lived monitor loop.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        // Initial probe so a cold start without a session holds at once.
        self.probe_once().await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.probe_once().await,
                _ = shutdown.cancelled() => {
                    info!("session monitor stopping");
                    return;
                }
            }
        }
    }
}
