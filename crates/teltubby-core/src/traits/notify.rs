// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification trait: how background processes reach curators and admins.

use async_trait::async_trait;

use crate::error::ArchiveError;

/// Bot-surface notification channel used by the queue worker for job
/// outcomes and session-health alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to a specific chat.
    async fn notify_chat(&self, chat_id: i64, text: &str) -> Result<(), ArchiveError>;

    /// Broadcast a message to all whitelisted administrators.
    async fn notify_admins(&self, text: &str) -> Result<(), ArchiveError>;
}
