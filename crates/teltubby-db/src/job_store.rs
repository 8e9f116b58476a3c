// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`JobStore`] trait.

use async_trait::async_trait;
use teltubby_core::types::{JobRow, JobState};
use teltubby_core::traits::JobStore;
use teltubby_core::ArchiveError;
use uuid::Uuid;

use crate::database::Database;
use crate::queries;

/// SQLite-backed local job table, the source of truth for job state.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, row: &JobRow) -> Result<(), ArchiveError> {
        queries::jobs::insert(&self.db, row.clone()).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, ArchiveError> {
        queries::jobs::get(&self.db, job_id).await
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<JobRow>, ArchiveError> {
        queries::jobs::list_recent(&self.db, limit).await
    }

    async fn transition(
        &self,
        job_id: Uuid,
        next: JobState,
        error: Option<&str>,
    ) -> Result<JobRow, ArchiveError> {
        let current = queries::jobs::get(&self.db, job_id)
            .await?
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;

        if !current.state.can_transition_to(next) {
            return Err(ArchiveError::InvalidJobTransition {
                from: current.state,
                to: next,
            });
        }

        let updated = queries::jobs::update_state_guarded(
            &self.db,
            job_id,
            current.state,
            next,
            error.map(String::from),
        )
        .await?;
        if !updated {
            // Another process won the row in between; report the edge as
            // invalid from whatever state it is in now.
            let now = queries::jobs::get(&self.db, job_id)
                .await?
                .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;
            return Err(ArchiveError::InvalidJobTransition {
                from: now.state,
                to: next,
            });
        }

        queries::jobs::get(&self.db, job_id)
            .await?
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))
    }

    async fn increment_retry(&self, job_id: Uuid) -> Result<u32, ArchiveError> {
        queries::jobs::increment_retry(&self.db, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_row(job_id: Uuid) -> JobRow {
        JobRow {
            job_id,
            user_id: 1,
            chat_id: 2,
            message_id: 3,
            state: JobState::Pending,
            payload_json: "{}".to_string(),
            last_error: None,
            retry_count: 0,
            max_retries: 3,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    async fn store() -> (SqliteJobStore, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("js.db").to_str().unwrap())
            .await
            .unwrap();
        (SqliteJobStore::new(db.clone()), db, dir)
    }

    #[tokio::test]
    async fn lifecycle_pending_processing_completed() {
        let (store, db, _dir) = store().await;
        let id = Uuid::new_v4();
        store.insert(&fresh_row(id)).await.unwrap();

        let row = store.transition(id, JobState::Processing, None).await.unwrap();
        assert_eq!(row.state, JobState::Processing);

        let row = store.transition(id, JobState::Completed, None).await.unwrap();
        assert_eq!(row.state, JobState::Completed);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_states_never_spontaneously_change() {
        let (store, db, _dir) = store().await;
        let id = Uuid::new_v4();
        store.insert(&fresh_row(id)).await.unwrap();
        store.transition(id, JobState::Processing, None).await.unwrap();
        store.transition(id, JobState::Completed, None).await.unwrap();

        let err = store
            .transition(id, JobState::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidJobTransition { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_jobs_can_be_retried_back_to_pending() {
        let (store, db, _dir) = store().await;
        let id = Uuid::new_v4();
        store.insert(&fresh_row(id)).await.unwrap();
        store.transition(id, JobState::Processing, None).await.unwrap();
        store
            .transition(id, JobState::Failed, Some("download failed"))
            .await
            .unwrap();

        let row = store.transition(id, JobState::Pending, None).await.unwrap();
        assert_eq!(row.state, JobState::Pending);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_request_flow() {
        let (store, db, _dir) = store().await;
        let id = Uuid::new_v4();
        store.insert(&fresh_row(id)).await.unwrap();
        store.transition(id, JobState::Processing, None).await.unwrap();
        store
            .transition(id, JobState::CancellationRequested, None)
            .await
            .unwrap();
        let row = store.transition(id, JobState::Cancelled, None).await.unwrap();
        assert_eq!(row.state, JobState::Cancelled);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_job_is_an_error() {
        let (store, db, _dir) = store().await;
        let err = store
            .transition(Uuid::new_v4(), JobState::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Internal(_)));
        db.close().await.unwrap();
    }
}
