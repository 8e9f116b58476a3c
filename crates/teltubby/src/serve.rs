// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `teltubby serve` - the bot process.
//!
//! Wires the process-wide singletons (object store, dedup index, quota
//! gate, queue publisher), the album aggregator, and the pipeline worker
//! pool, then runs until a shutdown signal drains in-flight units.

use std::sync::Arc;
use std::time::Duration;

use teltubby_config::TeltubbyConfig;
use teltubby_core::traits::{DedupIndex, JobIntake, JobPublisher, Notifier, ObjectStore};
use teltubby_core::types::MessageUnit;
use teltubby_core::ArchiveError;
use teltubby_db::{Database, SqliteDedupIndex, SqliteJobStore};
use teltubby_ingest::{AlbumAggregator, IngestPipeline};
use teltubby_metrics::MetricsHandle;
use teltubby_queue::{AmqpJobQueue, JobManager};
use teltubby_store::{QuotaGate, S3Gateway};
use teltubby_telegram::fetch::TelegramFetcher;
use teltubby_telegram::{BotDeps, TelegramNotifier, TelegramService};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::web;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal
/// is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Runs the `teltubby serve` command.
pub async fn run_serve(config: TeltubbyConfig) -> Result<(), ArchiveError> {
    info!("starting teltubby serve");

    // Metrics recorder; the process keeps running without one.
    let metrics = match MetricsHandle::install() {
        Ok(handle) => Some(Arc::new(handle)),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, continuing without metrics");
            None
        }
    };

    // Storage singletons, constructed once and passed explicitly.
    let database = Database::open(&config.db.path).await?;
    let dedup: Arc<dyn DedupIndex> = Arc::new(SqliteDedupIndex::new(database.clone()));
    let job_store = Arc::new(SqliteJobStore::new(database.clone()));

    let store: Arc<dyn ObjectStore> = Arc::new(S3Gateway::new(&config.s3).await?);
    let quota = Arc::new(QuotaGate::new(Arc::clone(&store), &config.quota));

    let amqp = Arc::new(AmqpJobQueue::connect(&config.amqp).await?);
    let publisher: Arc<dyn JobPublisher> = amqp.clone();
    let jobs = Arc::new(JobManager::new(
        job_store,
        Arc::clone(&publisher),
        config.worker.max_retries,
    ));
    let intake: Arc<dyn JobIntake> = jobs.clone();

    // Bot surface.
    let service = TelegramService::new(config.telegram.clone())?;
    let transport = Arc::new(TelegramFetcher::new(service.bot()));
    let notifier = Arc::new(TelegramNotifier::new(
        service.bot(),
        config.telegram.whitelist_ids.clone(),
    ));

    // Aggregator feeding the pipeline worker pool.
    let (unit_tx, unit_rx) = mpsc::channel::<MessageUnit>(64);
    let aggregator = Arc::new(AlbumAggregator::new(
        Duration::from_secs(config.ingest.album_window_seconds),
        config.ingest.album_max_items,
        unit_tx,
    ));

    let pipeline = Arc::new(IngestPipeline::new(
        config.ingest.clone(),
        config.db.dedup_enable,
        Arc::clone(&store),
        Arc::clone(&dedup),
        transport,
        intake,
        Arc::clone(&quota),
    ));

    let shutdown = install_signal_handler();

    // Quota poller.
    let quota_task = tokio::spawn(Arc::clone(&quota).run(shutdown.clone()));

    // Health/metrics HTTP surface.
    let web_task = tokio::spawn(web::serve(
        config.health.clone(),
        metrics.clone(),
        Arc::clone(&quota),
        shutdown.clone(),
    ));

    // Pipeline worker pool: shared receiver, N consumers.
    let unit_rx = Arc::new(Mutex::new(unit_rx));
    let mut workers = Vec::new();
    for worker_id in 0..config.ingest.effective_concurrency() {
        let unit_rx = Arc::clone(&unit_rx);
        let pipeline = Arc::clone(&pipeline);
        let notifier = Arc::clone(&notifier);
        workers.push(tokio::spawn(async move {
            loop {
                let unit = {
                    let mut rx = unit_rx.lock().await;
                    rx.recv().await
                };
                let Some(unit) = unit else {
                    debug!(worker_id, "unit channel closed, pipeline worker exiting");
                    break;
                };
                run_unit(&pipeline, notifier.as_ref(), unit).await;
            }
        }));
    }

    // Transport event receiver.
    let deps = Arc::new(BotDeps {
        aggregator: Arc::clone(&aggregator),
        jobs,
        dedup,
        quota,
        publisher,
    });
    let dispatcher = service.spawn_dispatcher(Arc::clone(&deps));

    info!(
        concurrency = config.ingest.effective_concurrency(),
        album_window_s = config.ingest.album_window_seconds,
        "teltubby serving"
    );

    shutdown.cancelled().await;

    // Drain: stop accepting messages, flush open albums, let the worker
    // pool finish buffered units, then close the singletons.
    dispatcher.abort();
    aggregator.flush_all().await;
    drop(aggregator);
    drop(deps);

    let drain_timeout = Duration::from_secs(config.ingest.io_timeout_seconds);
    for worker in workers {
        if tokio::time::timeout(drain_timeout, worker).await.is_err() {
            warn!("pipeline worker did not drain in time, aborting");
        }
    }

    let _ = quota_task.await;
    let _ = web_task.await;
    if let Err(e) = amqp.close().await {
        warn!(error = %e, "AMQP close failed");
    }
    database.close().await?;
    info!("shutdown complete");
    Ok(())
}

/// Process one unit and deliver the ack.
async fn run_unit(pipeline: &IngestPipeline, notifier: &dyn Notifier, unit: MessageUnit) {
    let chat_id = unit.chat.id;
    let ack = match pipeline.process_unit(&unit).await {
        Ok(report) => teltubby_telegram::format::format_report(&report),
        Err(err) => {
            error!(chat_id, message_id = unit.message_id, error = %err, "unit failed");
            teltubby_telegram::format::format_unit_error(&err)
        }
    };
    if let Err(err) = notifier.notify_chat(chat_id, &ack).await {
        warn!(chat_id, error = %err, "failed to deliver ack");
    }
}
