// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-delivery job processing.
//!
//! Pure with respect to the broker: the consumer loop translates the
//! returned [`DeliveryOutcome`] into ack / reject / nack-requeue, which
//! keeps the whole job algorithm testable with in-memory fakes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use teltubby_core::layout;
use teltubby_core::traits::{DedupIndex, FileRecord, JobStore, Notifier, ObjectStore, UserTransport};
use teltubby_core::types::{
    ChatRef, DedupReason, Disposition, ForwardOrigin, ItemOutcome, JobPayload, JobRow, JobState,
    MediaItem, MessageUnit, SenderRef,
};
use teltubby_core::ArchiveError;
use teltubby_ingest::artifact;
use teltubby_ingest::retry::with_retries;
use teltubby_ingest::spool::{spool_download, Spool};
use teltubby_store::{GateState, QuotaGate};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Attempts per retried in-job operation (upload, register, metadata).
const ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

/// What the consumer loop should do with the delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Done (committed, skipped, or terminally recorded in the row).
    Ack,
    /// Reject without requeue: routes to the dead-letter queue.
    Reject,
    /// Leave the job queued: nack with requeue after `delay`.
    Requeue { delay: Duration },
}

/// Collaborators and knobs for one worker process.
pub struct WorkerContext {
    pub store: Arc<dyn ObjectStore>,
    pub dedup: Arc<dyn DedupIndex>,
    pub jobs: Arc<dyn JobStore>,
    pub transport: Arc<dyn UserTransport>,
    pub notifier: Arc<dyn Notifier>,
    pub quota: Arc<QuotaGate>,
    pub dedup_enable: bool,
    pub io_timeout: Duration,
    pub retry_delay: Duration,
    /// Set by the session monitor while the user-protocol session is
    /// invalid. The worker never processes jobs in the hold state.
    pub hold: Arc<AtomicBool>,
}

/// Process one raw delivery body.
pub async fn process_delivery(ctx: &WorkerContext, body: &[u8]) -> DeliveryOutcome {
    let payload: JobPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "unparseable job payload, dead-lettering");
            teltubby_metrics::record_error("payload_invalid");
            return DeliveryOutcome::Reject;
        }
    };
    let job_id = payload.job_id;

    // The local row is the source of truth; a message without one is
    // foreign and goes to the dead-letter queue.
    let row = match ctx.jobs.get(job_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            error!(job_id = %job_id, "no local row for delivered job, dead-lettering");
            teltubby_metrics::record_error("unknown_job");
            return DeliveryOutcome::Reject;
        }
        Err(err) => {
            warn!(job_id = %job_id, error = %err, "job table unavailable, requeueing");
            return DeliveryOutcome::Requeue {
                delay: ctx.retry_delay,
            };
        }
    };

    match row.state {
        JobState::Pending => {}
        // Crash recovery: a redelivered message for a row stuck in
        // PROCESSING re-runs the work; dedup absorbs any prior partial
        // upload that completed.
        JobState::Processing => {
            warn!(job_id = %job_id, "re-running job left in PROCESSING");
        }
        JobState::CancellationRequested => {
            if let Err(err) = ctx
                .jobs
                .transition(job_id, JobState::Cancelled, Some("cancellation_requested"))
                .await
            {
                warn!(job_id = %job_id, error = %err, "failed to finalize cancellation");
            }
            info!(job_id = %job_id, "job cancelled before work started");
            return DeliveryOutcome::Ack;
        }
        state => {
            info!(job_id = %job_id, state = %state, "job not pending, acking without work");
            return DeliveryOutcome::Ack;
        }
    }

    // Admission: while the bucket is full, jobs stay queued.
    if ctx.quota.state() == GateState::Closed {
        info!(job_id = %job_id, "bucket at capacity, leaving job queued");
        teltubby_metrics::record_error("quota_full");
        return DeliveryOutcome::Requeue {
            delay: ctx.retry_delay,
        };
    }

    // Session hold: authentication failures do not consume retries.
    if ctx.hold.load(Ordering::Acquire) {
        info!(job_id = %job_id, "worker in session hold, leaving job queued");
        return DeliveryOutcome::Requeue {
            delay: ctx.retry_delay,
        };
    }
    match ctx.transport.is_authorized().await {
        Ok(true) => {}
        Ok(false) | Err(_) => {
            warn!(job_id = %job_id, "user-protocol session unavailable");
            teltubby_metrics::record_error("auth_required");
            let _ = ctx
                .notifier
                .notify_admins(
                    "⚠️ User-protocol session requires authentication; large-file jobs are on hold.",
                )
                .await;
            return DeliveryOutcome::Requeue {
                delay: ctx.retry_delay,
            };
        }
    }

    if row.state == JobState::Pending
        && let Err(err) = ctx.jobs.transition(job_id, JobState::Processing, None).await
    {
        warn!(job_id = %job_id, error = %err, "failed to mark job processing");
        return DeliveryOutcome::Requeue {
            delay: ctx.retry_delay,
        };
    }

    match run_job(ctx, &payload).await {
        Ok(outcome) => outcome,
        Err(err) => fail_or_requeue(ctx, job_id, &row, err).await,
    }
}

/// The job body: dedup, download, upload, commit, notify.
async fn run_job(
    ctx: &WorkerContext,
    payload: &JobPayload,
) -> Result<DeliveryOutcome, ArchiveError> {
    let job_id = payload.job_id;
    let unit = unit_from_payload(payload);
    let item = &unit.items[0];

    if let Some(outcome) = check_cancellation(ctx, job_id).await? {
        return Ok(outcome);
    }

    // Fast path: known unique id means no download at all.
    let mut resolved: Option<(Option<Spool>, ItemOutcome)> = None;
    if ctx.dedup_enable
        && let Some(existing) = ctx
            .dedup
            .lookup_record_by_unique_id(&item.file_unique_id)
            .await?
    {
        teltubby_metrics::record_dedup_hit("unique_id");
        resolved = Some((
            None,
            ItemOutcome {
                item: item.clone(),
                size_bytes: Some(existing.size_bytes),
                sha256: Some(existing.sha256.clone()),
                key: Some(existing.s3_key.clone()),
                disposition: Disposition::Duplicate {
                    of: existing.s3_key,
                    reason: DedupReason::UniqueId,
                },
            },
        ));
    }

    let (spool, outcome) = match resolved.take() {
        Some(done) => done,
        None => {
            // Stream the binary through the hashing spool.
            let spool = download_job_media(ctx, payload).await?;

            if let Some(outcome) = check_cancellation(ctx, job_id).await? {
                return Ok(outcome);
            }

            // Slow path: the content hash is authoritative.
            if ctx.dedup_enable
                && let Some(existing) = ctx.dedup.lookup_by_hash(&spool.sha256).await?
            {
                teltubby_metrics::record_dedup_hit("sha256");
                let outcome = ItemOutcome {
                    item: item.clone(),
                    size_bytes: Some(spool.size),
                    sha256: Some(spool.sha256.clone()),
                    key: Some(existing.s3_key.clone()),
                    disposition: Disposition::Duplicate {
                        of: existing.s3_key,
                        reason: DedupReason::Sha256,
                    },
                };
                (None, outcome)
            } else {
                let outcome = upload_and_register(ctx, &unit, item, &spool).await?;
                (Some(spool), outcome)
            }
        }
    };
    drop(spool);

    // Single-item unit commit, identical layout to the inline path.
    let chat_slug = layout::chat_slug(&unit);
    let prefix = layout::build_prefix(unit.timestamp, &chat_slug, unit.message_id);
    let total_bytes = if outcome.is_stored() {
        outcome.size_bytes.unwrap_or(0)
    } else {
        0
    };
    let built = artifact::build_artifact(
        ctx.store.bucket(),
        &prefix,
        &unit,
        std::slice::from_ref(&outcome),
        total_bytes,
        Utc::now(),
    );
    let bytes = artifact::to_bytes(&built).map_err(|e| ArchiveError::MetadataWrite {
        message: format!("artifact serialization failed: {e}"),
    })?;
    let artifact_key = artifact::artifact_key(&prefix);
    let payload_bytes = Bytes::from(bytes);
    with_retries("metadata write", ATTEMPTS, RETRY_BASE, || {
        let store = Arc::clone(&ctx.store);
        let key = artifact_key.clone();
        let payload = payload_bytes.clone();
        async move { store.put_bytes(&key, payload, Some("application/json")).await }
    })
    .await
    .map_err(|err| ArchiveError::MetadataWrite {
        message: err.to_string(),
    })?;

    if let Err(err) = ctx
        .dedup
        .record_message(unit.chat.id, unit.message_id, unit.media_group_id.as_deref())
        .await
    {
        warn!(error = %err, "failed to record message audit row");
    }

    ctx.jobs
        .transition(job_id, JobState::Completed, None)
        .await?;
    teltubby_metrics::record_job_completed();
    info!(job_id = %job_id, key = ?outcome.key, "job completed");

    let text = match &outcome.disposition {
        Disposition::Duplicate { of, .. } => {
            format!("♻️ Large file was already archived at `{of}`. Job {job_id} complete.")
        }
        _ => format!("✅ Large file archived successfully. Job {job_id} complete."),
    };
    if let Err(err) = ctx.notifier.notify_chat(payload.chat_id, &text).await {
        warn!(job_id = %job_id, error = %err, "completion notification failed");
    }

    Ok(DeliveryOutcome::Ack)
}

/// Cooperative cancellation checkpoint.
async fn check_cancellation(
    ctx: &WorkerContext,
    job_id: Uuid,
) -> Result<Option<DeliveryOutcome>, ArchiveError> {
    let row = ctx
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| ArchiveError::Internal(format!("job row vanished: {job_id}")))?;
    if row.state == JobState::CancellationRequested {
        ctx.jobs
            .transition(job_id, JobState::Cancelled, Some("cancellation_requested"))
            .await?;
        info!(job_id = %job_id, "job cancelled cooperatively");
        return Ok(Some(DeliveryOutcome::Ack));
    }
    Ok(None)
}

async fn download_job_media(
    ctx: &WorkerContext,
    payload: &JobPayload,
) -> Result<Spool, ArchiveError> {
    let io_timeout = ctx.io_timeout;
    let chat_id = payload.chat_id;
    let message_id = payload.message_id;
    let transport = Arc::clone(&ctx.transport);
    tokio::time::timeout(
        io_timeout,
        spool_download(move |mut writer| async move {
            transport
                .fetch_message_media(chat_id, message_id, &mut writer)
                .await?;
            use tokio::io::AsyncWriteExt;
            writer
                .flush()
                .await
                .map_err(|e| ArchiveError::Internal(format!("spool flush failed: {e}")))?;
            Ok(writer)
        }),
    )
    .await
    .map_err(|_| ArchiveError::Timeout {
        duration: io_timeout,
    })?
}

async fn upload_and_register(
    ctx: &WorkerContext,
    unit: &MessageUnit,
    item: &MediaItem,
    spool: &Spool,
) -> Result<ItemOutcome, ArchiveError> {
    let chat_slug = layout::chat_slug(unit);
    let prefix = layout::build_prefix(unit.timestamp, &chat_slug, unit.message_id);
    let sender = unit
        .sender
        .username
        .clone()
        .unwrap_or_else(|| unit.sender.id.to_string());
    let ext = layout::item_ext(item);
    let filename = layout::build_filename(
        unit.timestamp,
        &chat_slug,
        &sender,
        unit.message_id,
        unit.media_group_id.as_deref(),
        item.ordinal,
        unit.caption.as_deref(),
        &ext,
    );
    let key = layout::build_key(&prefix, &filename);

    with_retries("upload", ATTEMPTS, RETRY_BASE, || {
        let store = Arc::clone(&ctx.store);
        let key = key.clone();
        let path = spool.path.to_path_buf();
        let mime = item.mime_type.clone();
        async move { store.put_file(&key, &path, mime.as_deref()).await }
    })
    .await?;

    let record = FileRecord {
        sha256: spool.sha256.clone(),
        s3_key: key.clone(),
        size_bytes: spool.size,
        mime: item.mime_type.clone(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    match with_retries("register", ATTEMPTS, RETRY_BASE, || {
        let dedup = Arc::clone(&ctx.dedup);
        let record = record.clone();
        let uid = item.file_unique_id.clone();
        async move { dedup.register(record, Some(&uid)).await }
    })
    .await
    {
        Ok(()) => {
            teltubby_metrics::record_ingested_bytes(spool.size);
            Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: Some(spool.size),
                sha256: Some(spool.sha256.clone()),
                key: Some(key),
                disposition: Disposition::Stored,
            })
        }
        Err(ArchiveError::DedupConflict { existing_key, .. }) => {
            warn!(key = %key, existing_key = %existing_key, "dedup conflict, discarding upload");
            teltubby_metrics::record_error("dedup_conflict");
            if let Err(err) = ctx.store.delete(&key).await {
                warn!(key = %key, error = %err, "failed to delete conflicting upload");
            }
            Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: Some(spool.size),
                sha256: Some(spool.sha256.clone()),
                key: Some(existing_key.clone()),
                disposition: Disposition::Duplicate {
                    of: existing_key,
                    reason: DedupReason::Sha256,
                },
            })
        }
        Err(err) => Err(err),
    }
}

/// Retry policy: transient failures re-queue until `max_retries`, then
/// the job fails and dead-letters. Permanent failures fail directly.
async fn fail_or_requeue(
    ctx: &WorkerContext,
    job_id: Uuid,
    row: &JobRow,
    err: ArchiveError,
) -> DeliveryOutcome {
    teltubby_metrics::record_error(err.kind());

    if err.is_transient() {
        let retries = match ctx.jobs.increment_retry(job_id).await {
            Ok(retries) => retries,
            Err(inner) => {
                warn!(job_id = %job_id, error = %inner, "retry bookkeeping failed");
                return DeliveryOutcome::Requeue {
                    delay: ctx.retry_delay,
                };
            }
        };
        if retries < row.max_retries {
            warn!(
                job_id = %job_id,
                retries,
                max_retries = row.max_retries,
                error = %err,
                "transient job failure, re-queueing"
            );
            if let Err(inner) = ctx
                .jobs
                .transition(job_id, JobState::Pending, Some(&err.to_string()))
                .await
            {
                warn!(job_id = %job_id, error = %inner, "failed to mark job pending");
            }
            return DeliveryOutcome::Requeue {
                delay: ctx.retry_delay,
            };
        }
    }

    error!(job_id = %job_id, error = %err, "job failed, dead-lettering");
    if let Err(inner) = ctx
        .jobs
        .transition(job_id, JobState::Failed, Some(&err.to_string()))
        .await
    {
        warn!(job_id = %job_id, error = %inner, "failed to mark job failed");
    }
    teltubby_metrics::record_job_failed();
    let _ = ctx
        .notifier
        .notify_chat(
            row.chat_id,
            &format!("❌ Large-file job {job_id} failed: {}", err.kind()),
        )
        .await;
    DeliveryOutcome::Reject
}

/// Reconstruct the single-item unit a job describes, from the stored
/// telegram context snapshot.
pub fn unit_from_payload(payload: &JobPayload) -> MessageUnit {
    let forward_origin = payload.telegram_context.forward_origin.clone().map(|raw| {
        let chat = raw.get("chat").cloned().unwrap_or(serde_json::Value::Null);
        ForwardOrigin {
            username: chat
                .get("username")
                .and_then(|v| v.as_str())
                .map(String::from),
            title: chat.get("title").and_then(|v| v.as_str()).map(String::from),
            chat_id: chat.get("id").and_then(|v| v.as_i64()),
            raw,
        }
    });

    MessageUnit {
        chat: ChatRef {
            id: payload.chat_id,
            username: None,
            title: None,
        },
        message_id: payload.message_id,
        media_group_id: payload.telegram_context.media_group_id.clone(),
        sender: SenderRef {
            id: payload.user_id,
            username: None,
        },
        timestamp: payload.job_metadata.created_at,
        caption: payload.telegram_context.caption.clone(),
        caption_entities: payload.telegram_context.entities.clone().unwrap_or_default(),
        entities: vec![],
        forward_origin,
        items: vec![MediaItem {
            ordinal: 1,
            source_message_id: payload.message_id,
            kind: payload.file_info.file_type,
            file_id: payload.file_info.file_id.clone(),
            file_unique_id: payload.file_info.file_unique_id.clone(),
            mime_type: payload.file_info.mime_type.clone(),
            size_hint: payload.file_info.file_size,
            width: None,
            height: None,
            duration: None,
            file_name: payload.file_info.file_name.clone(),
        }],
        notes: None,
    }
}
