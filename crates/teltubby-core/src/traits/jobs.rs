// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local job table trait: the source of truth for job state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ArchiveError;
use crate::types::{JobRow, JobState};

/// Transactional store of job rows. One row per enqueued job (I5);
/// transitions are validated against the job state graph (I6).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new row in state PENDING.
    async fn insert(&self, row: &JobRow) -> Result<(), ArchiveError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, ArchiveError>;

    /// Most recent jobs first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<JobRow>, ArchiveError>;

    /// Apply a state transition, rejecting edges the state graph forbids
    /// with [`ArchiveError::InvalidJobTransition`]. Returns the updated row.
    async fn transition(
        &self,
        job_id: Uuid,
        next: JobState,
        error: Option<&str>,
    ) -> Result<JobRow, ArchiveError>;

    /// Bump the retry counter, returning the new count.
    async fn increment_retry(&self, job_id: Uuid) -> Result<u32, ArchiveError>;
}
