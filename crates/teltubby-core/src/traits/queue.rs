// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue publisher trait: the durable broker side of the job queue.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ArchiveError;
use crate::types::{JobContext, JobFileInfo, JobPayload};

/// Publishes persistent job messages to the durable work queue.
///
/// The broker is treated as a durable FIFO with dead-letter routing;
/// topology management is an implementation concern.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish a job payload as a persistent message.
    async fn publish(&self, payload: &JobPayload) -> Result<(), ArchiveError>;

    /// Approximate number of ready messages in the main queue.
    async fn queue_depth(&self) -> Result<u32, ArchiveError>;
}

/// A request to hand one oversize item to the queue path.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub user_id: i64,
    pub chat_id: i64,
    /// Id of the message the item arrived in.
    pub message_id: i64,
    pub file_info: JobFileInfo,
    pub context: JobContext,
    pub priority: u8,
}

/// The enqueue side of the job queue as seen by the pipeline: assigns a
/// job id, records the local row, publishes the persistent message.
#[async_trait]
pub trait JobIntake: Send + Sync {
    /// Enqueue a job, returning its id.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, ArchiveError>;
}
