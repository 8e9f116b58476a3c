// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job manager: pairs the broker with the local job table.
//!
//! Invariant: every enqueued job has a local row before the broker sees
//! the message, and the row stores the exact published payload so retries
//! reconstruct identical work.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use teltubby_core::traits::{EnqueueRequest, JobIntake, JobPublisher, JobStore};
use teltubby_core::types::{JobMetadata, JobPayload, JobRow, JobState};
use teltubby_core::ArchiveError;
use tracing::{error, info};
use uuid::Uuid;

/// Orchestrates enqueue, retry, and cancel across the local job table
/// and the durable broker.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    publisher: Arc<dyn JobPublisher>,
    max_retries: u32,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, publisher: Arc<dyn JobPublisher>, max_retries: u32) -> Self {
        Self {
            store,
            publisher,
            max_retries,
        }
    }

    /// Admin read: one job row.
    pub async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, ArchiveError> {
        self.store.get(job_id).await
    }

    /// Admin read: most recent jobs.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<JobRow>, ArchiveError> {
        self.store.list_recent(limit).await
    }

    /// Re-publish a FAILED or CANCELLED job with its stored payload.
    pub async fn retry(&self, job_id: Uuid) -> Result<JobRow, ArchiveError> {
        let row = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;

        if !matches!(row.state, JobState::Failed | JobState::Cancelled) {
            return Err(ArchiveError::InvalidJobTransition {
                from: row.state,
                to: JobState::Pending,
            });
        }

        let payload: JobPayload = serde_json::from_str(&row.payload_json)
            .map_err(|e| ArchiveError::Internal(format!("stored payload is invalid: {e}")))?;

        let row = self.store.transition(job_id, JobState::Pending, None).await?;
        if let Err(err) = self.publisher.publish(&payload).await {
            error!(job_id = %job_id, error = %err, "retry publish failed");
            self.store
                .transition(job_id, JobState::Failed, Some("enqueue_failed"))
                .await?;
            return Err(err);
        }
        info!(job_id = %job_id, "job re-queued");
        Ok(row)
    }

    /// Cancel a job. PENDING jobs cancel immediately; PROCESSING jobs get
    /// an advisory CANCELLATION_REQUESTED flag the worker checks
    /// cooperatively.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobRow, ArchiveError> {
        let row = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;

        match row.state {
            JobState::Pending => {
                let row = self
                    .store
                    .transition(job_id, JobState::Cancelled, None)
                    .await?;
                info!(job_id = %job_id, "pending job cancelled");
                Ok(row)
            }
            JobState::Processing => {
                let row = self
                    .store
                    .transition(job_id, JobState::CancellationRequested, None)
                    .await?;
                info!(job_id = %job_id, "cancellation requested");
                Ok(row)
            }
            state => Err(ArchiveError::InvalidJobTransition {
                from: state,
                to: JobState::Cancelled,
            }),
        }
    }
}

#[async_trait]
impl JobIntake for JobManager {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, ArchiveError> {
        let job_id = Uuid::new_v4();
        let payload = JobPayload {
            job_id,
            user_id: request.user_id,
            chat_id: request.chat_id,
            message_id: request.message_id,
            file_info: request.file_info,
            telegram_context: request.context,
            job_metadata: JobMetadata {
                created_at: Utc::now(),
                priority: request.priority,
                retry_count: 0,
                max_retries: self.max_retries,
            },
        };
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| ArchiveError::Internal(format!("job payload serialization failed: {e}")))?;

        // Local row first: no queue message may exist whose job id is
        // unknown locally.
        let row = JobRow {
            job_id,
            user_id: payload.user_id,
            chat_id: payload.chat_id,
            message_id: payload.message_id,
            state: JobState::Pending,
            payload_json,
            last_error: None,
            retry_count: 0,
            max_retries: self.max_retries,
            created_at: String::new(),
            updated_at: String::new(),
        };
        self.store.insert(&row).await?;

        if let Err(err) = self.publisher.publish(&payload).await {
            error!(job_id = %job_id, error = %err, "publish failed after insert");
            self.store
                .transition(job_id, JobState::Failed, Some("enqueue_failed"))
                .await?;
            return Err(err);
        }

        info!(job_id = %job_id, chat_id = payload.chat_id, "job enqueued");
        Ok(job_id)
    }
}
