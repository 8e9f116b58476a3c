// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`JobStore`] and [`JobPublisher`] fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use teltubby_core::traits::{EnqueueRequest, JobIntake, JobPublisher, JobStore};
use teltubby_core::types::{JobPayload, JobRow, JobState};
use teltubby_core::ArchiveError;
use uuid::Uuid;

/// In-memory job table enforcing the job state graph.
#[derive(Default)]
pub struct MemoryJobStore {
    rows: Mutex<HashMap<Uuid, JobRow>>,
    order: Mutex<Vec<Uuid>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, row: &JobRow) -> Result<(), ArchiveError> {
        self.rows.lock().unwrap().insert(row.job_id, row.clone());
        self.order.lock().unwrap().push(row.job_id);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRow>, ArchiveError> {
        Ok(self.rows.lock().unwrap().get(&job_id).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<JobRow>, ArchiveError> {
        let order = self.order.lock().unwrap();
        let rows = self.rows.lock().unwrap();
        Ok(order
            .iter()
            .rev()
            .take(limit as usize)
            .filter_map(|id| rows.get(id).cloned())
            .collect())
    }

    async fn transition(
        &self,
        job_id: Uuid,
        next: JobState,
        error: Option<&str>,
    ) -> Result<JobRow, ArchiveError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&job_id)
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;
        if !row.state.can_transition_to(next) {
            return Err(ArchiveError::InvalidJobTransition {
                from: row.state,
                to: next,
            });
        }
        row.state = next;
        row.last_error = error.map(String::from);
        Ok(row.clone())
    }

    async fn increment_retry(&self, job_id: Uuid) -> Result<u32, ArchiveError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&job_id)
            .ok_or_else(|| ArchiveError::Internal(format!("unknown job {job_id}")))?;
        row.retry_count += 1;
        Ok(row.retry_count)
    }
}

/// In-memory publisher recording everything it is asked to publish.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<JobPayload>>,
    fail_publish: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<JobPayload> {
        self.published.lock().unwrap().clone()
    }
}

/// In-memory enqueue seam recording every request the pipeline hands to
/// the queue path.
#[derive(Default)]
pub struct MemoryIntake {
    requests: Mutex<Vec<(Uuid, EnqueueRequest)>>,
    fail_enqueue: AtomicBool,
}

impl MemoryIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_enqueues(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(Uuid, EnqueueRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobIntake for MemoryIntake {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, ArchiveError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(ArchiveError::Queue {
                message: "scripted enqueue failure".to_string(),
                source: None,
            });
        }
        let job_id = Uuid::new_v4();
        self.requests.lock().unwrap().push((job_id, request));
        Ok(job_id)
    }
}

#[async_trait]
impl JobPublisher for MemoryPublisher {
    async fn publish(&self, payload: &JobPayload) -> Result<(), ArchiveError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ArchiveError::Queue {
                message: "scripted publish failure".to_string(),
                source: None,
            });
        }
        self.published.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u32, ArchiveError> {
        Ok(self.published.lock().unwrap().len() as u32)
    }
}
