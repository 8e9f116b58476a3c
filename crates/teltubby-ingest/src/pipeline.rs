// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-unit ingestion pipeline.
//!
//! For each unit: admission, pre-validation, size routing, per-item
//! fetch + hash + dedup + upload, then the `message.json` commit write.
//! Item-level failures do not abort the unit; unit-level failures do not
//! abort the process.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use teltubby_config::model::IngestConfig;
use teltubby_core::layout;
use teltubby_core::traits::{
    BotTransport, DedupIndex, EnqueueRequest, FileRecord, JobIntake, ObjectStore, RemoteFile,
};
use teltubby_core::types::{
    DedupReason, Disposition, ItemOutcome, JobContext, JobFileInfo, MediaItem, MediaKind,
    MessageUnit, SkipReason, UnitReceipt,
};
use teltubby_core::ArchiveError;
use teltubby_store::{GateState, QuotaGate};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact;
use crate::retry::with_retries;
use crate::router::{route_item, Route};
use crate::spool::{spool_download, Spool};

/// Default priority for jobs created by the size router.
pub const DEFAULT_JOB_PRIORITY: u8 = 4;

/// Attempts per retried operation (fetch, upload, register, metadata).
const ATTEMPTS: u32 = 3;

/// Base backoff delay; grows 1 s, 3 s, 9 s.
const RETRY_BASE: Duration = Duration::from_secs(1);

/// One pre-validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRejection {
    pub ordinal: u32,
    pub reason: SkipReason,
}

/// One item handed to the queue path.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub ordinal: u32,
    /// Assigned job id, or `None` when the enqueue itself failed.
    pub job_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Outcome of processing one unit, for the ack formatter.
#[derive(Debug)]
pub enum IngestReport {
    /// The unit carried no media and was dropped.
    Dropped,
    /// Admission refused (quota gate closed).
    Refused { reason: &'static str },
    /// Pre-validation rejected the unit; nothing was uploaded.
    Rejected { failures: Vec<ItemRejection> },
    /// The unit committed; some items may have been queued.
    Archived {
        receipt: UnitReceipt,
        queued: Vec<QueuedItem>,
    },
    /// Every item routed to the queue path; no inline commit happened.
    QueuedOnly { queued: Vec<QueuedItem> },
}

/// The ingestion pipeline. One instance shared by all pipeline workers;
/// collaborators are process-wide singletons passed in at startup.
pub struct IngestPipeline {
    config: IngestConfig,
    dedup_enable: bool,
    store: Arc<dyn ObjectStore>,
    dedup: Arc<dyn DedupIndex>,
    transport: Arc<dyn BotTransport>,
    jobs: Arc<dyn JobIntake>,
    quota: Arc<QuotaGate>,
}

impl IngestPipeline {
    pub fn new(
        config: IngestConfig,
        dedup_enable: bool,
        store: Arc<dyn ObjectStore>,
        dedup: Arc<dyn DedupIndex>,
        transport: Arc<dyn BotTransport>,
        jobs: Arc<dyn JobIntake>,
        quota: Arc<QuotaGate>,
    ) -> Self {
        Self {
            config,
            dedup_enable,
            store,
            dedup,
            transport,
            jobs,
            quota,
        }
    }

    /// Process one unit end to end.
    ///
    /// `Err` is reserved for failures fatal to the whole unit: an
    /// unavailable dedup index, or a failed `message.json` commit (in
    /// which case uploaded objects are NOT rolled back and the ack
    /// reports `metadata_write_failed`).
    pub async fn process_unit(&self, unit: &MessageUnit) -> Result<IngestReport, ArchiveError> {
        let started = std::time::Instant::now();

        if unit.items.is_empty() {
            return Ok(IngestReport::Dropped);
        }

        // Admission.
        if self.quota.state() == GateState::Closed {
            teltubby_metrics::record_error("quota_full");
            info!(
                chat_id = unit.chat.id,
                message_id = unit.message_id,
                "refusing unit, bucket at capacity"
            );
            return Ok(IngestReport::Refused {
                reason: "quota_full",
            });
        }

        // Pre-validation and routing. Nothing is uploaded for a unit with
        // any failing item.
        let mut failures: Vec<ItemRejection> = Vec::new();
        let mut inline: Vec<(&MediaItem, RemoteFile)> = Vec::new();
        let mut oversize: Vec<&MediaItem> = Vec::new();

        for item in &unit.items {
            if let Some(reason) = self.validate_item(item) {
                failures.push(ItemRejection {
                    ordinal: item.ordinal,
                    reason,
                });
                continue;
            }
            match route_item(self.transport.as_ref(), item, self.config.inline_limit_bytes).await {
                Ok(Route::Inline(remote)) => inline.push((item, remote)),
                Ok(Route::Queue) => oversize.push(item),
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(
                        ordinal = item.ordinal,
                        error = %err,
                        "item is not fetchable"
                    );
                    teltubby_metrics::record_error(err.kind());
                    failures.push(ItemRejection {
                        ordinal: item.ordinal,
                        reason: SkipReason::FetchPermanent,
                    });
                }
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                teltubby_metrics::record_skipped_item(&failure.reason.to_string());
            }
            return Ok(IngestReport::Rejected { failures });
        }

        // Oversize items become independent jobs.
        let mut queued = Vec::with_capacity(oversize.len());
        for item in oversize {
            queued.push(self.enqueue_item(unit, item).await);
        }

        if inline.is_empty() {
            return Ok(IngestReport::QueuedOnly { queued });
        }

        // Key prefix, computed once for the unit.
        let chat_slug = layout::chat_slug(unit);
        let prefix = layout::build_prefix(unit.timestamp, &chat_slug, unit.message_id);

        // Items in ordinal order.
        let mut outcomes = Vec::with_capacity(inline.len());
        let mut total_bytes: u64 = 0;
        for (item, remote) in inline {
            let outcome = self
                .process_inline_item(unit, &prefix, &chat_slug, item, remote)
                .await?;
            if outcome.is_stored() {
                total_bytes += outcome.size_bytes.unwrap_or(0);
            }
            outcomes.push(outcome);
        }

        // Commit point: the metadata artifact. Uploaded objects stand even
        // if this fails; the operator reconciles via admin tooling.
        let built = artifact::build_artifact(
            self.store.bucket(),
            &prefix,
            unit,
            &outcomes,
            total_bytes,
            Utc::now(),
        );
        let payload = artifact::to_bytes(&built).map_err(|e| ArchiveError::MetadataWrite {
            message: format!("artifact serialization failed: {e}"),
        })?;
        let key = artifact::artifact_key(&prefix);
        let payload = Bytes::from(payload);
        let write = with_retries("metadata write", ATTEMPTS, RETRY_BASE, || {
            let store = Arc::clone(&self.store);
            let key = key.clone();
            let payload = payload.clone();
            async move {
                store
                    .put_bytes(&key, payload, Some("application/json"))
                    .await
            }
        })
        .await;
        if let Err(err) = write {
            teltubby_metrics::record_error("metadata_write_failed");
            error!(prefix = %prefix, error = %err, "metadata commit failed");
            return Err(ArchiveError::MetadataWrite {
                message: err.to_string(),
            });
        }

        // Audit record; failure is logged, never fatal after commit.
        if let Err(err) = self
            .dedup
            .record_message(unit.chat.id, unit.message_id, unit.media_group_id.as_deref())
            .await
        {
            warn!(error = %err, "failed to record message audit row");
        }

        let elapsed = started.elapsed().as_secs_f64();
        teltubby_metrics::record_ingested_message();
        teltubby_metrics::record_processing_seconds(elapsed);

        let receipt = UnitReceipt {
            bucket: self.store.bucket().to_string(),
            base_path: prefix,
            duplicate_of: built.duplicate_of.clone(),
            dedup_reason: built.dedup_reason,
            notes: unit.notes.clone(),
            outcomes,
            total_bytes_uploaded: total_bytes,
            elapsed_seconds: elapsed,
        };
        Ok(IngestReport::Archived { receipt, queued })
    }

    /// Static pre-validation of one item.
    fn validate_item(&self, item: &MediaItem) -> Option<SkipReason> {
        if item.file_id.is_empty() || item.file_unique_id.is_empty() {
            return Some(SkipReason::MissingMedia);
        }
        if item.kind == MediaKind::Other {
            return Some(SkipReason::UnsupportedKind);
        }
        if let Some(hint) = item.size_hint
            && hint > self.config.max_file_bytes()
        {
            return Some(SkipReason::OversizeConfigured);
        }
        None
    }

    /// Hand one oversize item to the queue path.
    async fn enqueue_item(&self, unit: &MessageUnit, item: &MediaItem) -> QueuedItem {
        let entities = if unit.caption_entities.is_empty() {
            unit.entities.clone()
        } else {
            unit.caption_entities.clone()
        };
        let request = EnqueueRequest {
            user_id: unit.sender.id,
            chat_id: unit.chat.id,
            message_id: item.source_message_id,
            file_info: JobFileInfo {
                file_id: item.file_id.clone(),
                file_unique_id: item.file_unique_id.clone(),
                file_size: item.size_hint,
                file_type: item.kind,
                file_name: item.file_name.clone(),
                mime_type: item.mime_type.clone(),
            },
            context: JobContext {
                forward_origin: unit.forward_origin.as_ref().map(|o| o.raw.clone()),
                caption: unit.caption.clone(),
                entities: if entities.is_empty() {
                    None
                } else {
                    Some(entities)
                },
                media_group_id: unit.media_group_id.clone(),
            },
            priority: DEFAULT_JOB_PRIORITY,
        };

        match self.jobs.enqueue(request).await {
            Ok(job_id) => {
                info!(
                    ordinal = item.ordinal,
                    job_id = %job_id,
                    "oversize item queued"
                );
                QueuedItem {
                    ordinal: item.ordinal,
                    job_id: Some(job_id),
                    error: None,
                }
            }
            Err(err) => {
                error!(ordinal = item.ordinal, error = %err, "enqueue failed");
                teltubby_metrics::record_error("enqueue_failed");
                QueuedItem {
                    ordinal: item.ordinal,
                    job_id: None,
                    error: Some("enqueue_failed".to_string()),
                }
            }
        }
    }

    /// Resolve one inline item: dedup fast path, fetch + hash, dedup slow
    /// path, upload, register.
    async fn process_inline_item(
        &self,
        unit: &MessageUnit,
        prefix: &str,
        chat_slug: &str,
        item: &MediaItem,
        remote: RemoteFile,
    ) -> Result<ItemOutcome, ArchiveError> {
        // Fast path: no download on a unique-id hit.
        if self.dedup_enable
            && let Some(existing) = self
                .dedup
                .lookup_record_by_unique_id(&item.file_unique_id)
                .await?
        {
            teltubby_metrics::record_dedup_hit("unique_id");
            return Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: item.size_hint,
                sha256: None,
                key: Some(existing.s3_key.clone()),
                disposition: Disposition::Duplicate {
                    of: existing.s3_key,
                    reason: DedupReason::UniqueId,
                },
            });
        }

        // Fetch into a hashing spool, with per-transfer timeout and
        // transient retries. Each attempt starts a fresh spool.
        let io_timeout = Duration::from_secs(self.config.io_timeout_seconds);
        let spool = match with_retries("fetch", ATTEMPTS, RETRY_BASE, || {
            let transport = Arc::clone(&self.transport);
            let remote = remote.clone();
            async move {
                tokio::time::timeout(io_timeout, download(transport, remote))
                    .await
                    .map_err(|_| ArchiveError::Timeout {
                        duration: io_timeout,
                    })?
            }
        })
        .await
        {
            Ok(spool) => spool,
            Err(err) => {
                teltubby_metrics::record_error(err.kind());
                warn!(ordinal = item.ordinal, error = %err, "fetch failed");
                let disposition = if matches!(err, ArchiveError::Transport { transient: false, .. }) {
                    teltubby_metrics::record_skipped_item(&SkipReason::FetchPermanent.to_string());
                    Disposition::Skipped {
                        reason: SkipReason::FetchPermanent,
                    }
                } else {
                    Disposition::Failed {
                        kind: err.kind().to_string(),
                    }
                };
                return Ok(ItemOutcome {
                    item: item.clone(),
                    size_bytes: None,
                    sha256: None,
                    key: None,
                    disposition,
                });
            }
        };

        // Enforce the configured cap when the hint was missing or lied.
        if spool.size > self.config.max_file_bytes() {
            teltubby_metrics::record_skipped_item(&SkipReason::OversizeConfigured.to_string());
            return Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: Some(spool.size),
                sha256: Some(spool.sha256),
                key: None,
                disposition: Disposition::Skipped {
                    reason: SkipReason::OversizeConfigured,
                },
            });
        }

        // Slow path: content hash, the authoritative dedup signal.
        if self.dedup_enable
            && let Some(existing) = self.dedup.lookup_by_hash(&spool.sha256).await?
        {
            teltubby_metrics::record_dedup_hit("sha256");
            return Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: Some(spool.size),
                sha256: Some(spool.sha256),
                key: Some(existing.s3_key.clone()),
                disposition: Disposition::Duplicate {
                    of: existing.s3_key,
                    reason: DedupReason::Sha256,
                },
            });
        }

        // Upload under the deterministic key.
        let sender = unit
            .sender
            .username
            .clone()
            .unwrap_or_else(|| unit.sender.id.to_string());
        let ext = layout::item_ext(item);
        let filename = layout::build_filename(
            unit.timestamp,
            chat_slug,
            &sender,
            unit.message_id,
            unit.media_group_id.as_deref(),
            item.ordinal,
            unit.caption.as_deref(),
            &ext,
        );
        let key = layout::build_key(prefix, &filename);

        let upload = with_retries("upload", ATTEMPTS, RETRY_BASE, || {
            let store = Arc::clone(&self.store);
            let key = key.clone();
            let path = spool.path.to_path_buf();
            let mime = item.mime_type.clone();
            async move { store.put_file(&key, &path, mime.as_deref()).await }
        })
        .await;
        if let Err(err) = upload {
            teltubby_metrics::record_error(err.kind());
            warn!(ordinal = item.ordinal, key = %key, error = %err, "upload failed");
            return Ok(ItemOutcome {
                item: item.clone(),
                size_bytes: Some(spool.size),
                sha256: Some(spool.sha256),
                key: None,
                disposition: Disposition::Failed {
                    kind: err.kind().to_string(),
                },
            });
        }

        // Register under both the hash and the transport-unique-id.
        let record = FileRecord {
            sha256: spool.sha256.clone(),
            s3_key: key.clone(),
            size_bytes: spool.size,
            mime: item.mime_type.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let registered = with_retries("register", ATTEMPTS, RETRY_BASE, || {
            let dedup = Arc::clone(&self.dedup);
            let record = record.clone();
            let uid = item.file_unique_id.clone();
            async move { dedup.register(record, Some(&uid)).await }
        })
        .await;
        match registered {
            Ok(()) => {
                teltubby_metrics::record_ingested_bytes(spool.size);
                Ok(ItemOutcome {
                    item: item.clone(),
                    size_bytes: Some(spool.size),
                    sha256: Some(spool.sha256),
                    key: Some(key),
                    disposition: Disposition::Stored,
                })
            }
            Err(ArchiveError::DedupConflict { existing_key, .. }) => {
                // Another writer won the hash; their entry is canonical.
                // Drop the just-uploaded blob, best effort.
                teltubby_metrics::record_error("dedup_conflict");
                warn!(
                    key = %key,
                    existing_key = %existing_key,
                    "dedup conflict, discarding fresh upload"
                );
                if let Err(err) = self.store.delete(&key).await {
                    warn!(key = %key, error = %err, "failed to delete conflicting upload");
                }
                Ok(ItemOutcome {
                    item: item.clone(),
                    size_bytes: Some(spool.size),
                    sha256: Some(spool.sha256),
                    key: Some(existing_key.clone()),
                    disposition: Disposition::Duplicate {
                        of: existing_key,
                        reason: DedupReason::Sha256,
                    },
                })
            }
            // An unavailable index is fatal for the unit.
            Err(err) => Err(err),
        }
    }

}

/// Fetch one remote file into a fresh hashing spool.
async fn download(
    transport: Arc<dyn BotTransport>,
    remote: RemoteFile,
) -> Result<Spool, ArchiveError> {
    spool_download(move |mut writer| async move {
        transport.fetch(&remote, &mut writer).await?;
        use tokio::io::AsyncWriteExt;
        writer
            .flush()
            .await
            .map_err(|e| ArchiveError::Internal(format!("spool flush failed: {e}")))?;
        Ok(writer)
    })
    .await
}
