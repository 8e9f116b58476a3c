// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `teltubby worker` - the queue worker process.
//!
//! Consumes oversize-media jobs and commits them through the same
//! storage contract as the inline path. The user-protocol client is an
//! external collaborator behind [`UserTransport`]; without a configured
//! session the worker stays in hold and keeps jobs queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teltubby_config::TeltubbyConfig;
use teltubby_core::traits::{DedupIndex, Notifier, ObjectStore, UserTransport};
use teltubby_core::ArchiveError;
use teltubby_db::{Database, SqliteDedupIndex, SqliteJobStore};
use teltubby_metrics::MetricsHandle;
use teltubby_store::{QuotaGate, S3Gateway};
use teltubby_telegram::{TelegramNotifier, TelegramService};
use teltubby_worker::{QueueWorker, SessionMonitor, WorkerContext};
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::serve::install_signal_handler;

/// Placeholder user transport for deployments whose user-protocol
/// session is managed out of process. Reports unauthenticated, which
/// parks the worker in hold until a real session implementation is
/// wired in.
struct UnconfiguredUserTransport;

#[async_trait]
impl UserTransport for UnconfiguredUserTransport {
    async fn is_authorized(&self) -> Result<bool, ArchiveError> {
        Ok(false)
    }

    async fn fetch_message_media(
        &self,
        _chat_id: i64,
        _message_id: i64,
        _dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ArchiveError> {
        Err(ArchiveError::Transport {
            message: "no user-protocol session configured".to_string(),
            transient: false,
            source: None,
        })
    }
}

/// Log-only notifier for worker deployments without a bot token.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_chat(&self, chat_id: i64, text: &str) -> Result<(), ArchiveError> {
        info!(chat_id, text, "notification (no bot token configured)");
        Ok(())
    }

    async fn notify_admins(&self, text: &str) -> Result<(), ArchiveError> {
        info!(text, "admin notification (no bot token configured)");
        Ok(())
    }
}

/// Runs the `teltubby worker` command.
pub async fn run_worker(config: TeltubbyConfig) -> Result<(), ArchiveError> {
    info!("starting teltubby worker");

    let metrics = match MetricsHandle::install() {
        Ok(handle) => Some(Arc::new(handle)),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, continuing without metrics");
            None
        }
    };
    // The worker exposes no HTTP surface of its own; the bot process
    // owns the health port.
    let _ = metrics;

    let database = Database::open(&config.db.path).await?;
    let dedup: Arc<dyn DedupIndex> = Arc::new(SqliteDedupIndex::new(database.clone()));
    let jobs = Arc::new(SqliteJobStore::new(database.clone()));

    let store: Arc<dyn ObjectStore> = Arc::new(S3Gateway::new(&config.s3).await?);
    let quota = Arc::new(QuotaGate::new(Arc::clone(&store), &config.quota));

    let notifier: Arc<dyn Notifier> = if config.telegram.bot_token.is_some() {
        let service = TelegramService::new(config.telegram.clone())?;
        Arc::new(TelegramNotifier::new(
            service.bot(),
            config.telegram.whitelist_ids.clone(),
        ))
    } else {
        warn!("no telegram.bot_token; worker notifications go to the log only");
        Arc::new(LogNotifier)
    };

    // The user-protocol session is an external collaborator; deployments
    // plug a real client in here.
    let transport: Arc<dyn UserTransport> = Arc::new(UnconfiguredUserTransport);

    let shutdown = install_signal_handler();

    let quota_task = tokio::spawn(Arc::clone(&quota).run(shutdown.clone()));

    let monitor = Arc::new(SessionMonitor::new(
        Arc::clone(&transport),
        Arc::clone(&notifier),
        Duration::from_secs(config.worker.session_check_interval_seconds),
    ));
    let hold = monitor.hold_flag();
    let monitor_task = tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));

    let ctx = Arc::new(WorkerContext {
        store,
        dedup,
        jobs,
        transport,
        notifier,
        quota,
        dedup_enable: config.db.dedup_enable,
        io_timeout: Duration::from_secs(config.ingest.io_timeout_seconds),
        retry_delay: Duration::from_secs(config.worker.retry_delay_seconds),
        hold,
    });

    let worker = QueueWorker::new(ctx, config.amqp.clone());
    let result = worker.run(shutdown.clone()).await;

    shutdown.cancel();
    let _ = monitor_task.await;
    let _ = quota_task.await;
    database.close().await?;
    info!("worker shutdown complete");
    result
}
