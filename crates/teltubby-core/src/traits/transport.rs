// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport traits: the bot-protocol fetcher and the user-protocol
//! fetcher used by the queue worker.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::ArchiveError;

/// A fetchable file handle resolved by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Transport-side path used for the actual download.
    pub path: String,
    /// Size as reported by the transport.
    pub size: u64,
}

/// Byte-stream file fetcher over the bot protocol, bounded by the inline
/// size limit.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Resolve a file handle to a fetchable descriptor. Cheap
    /// (metadata-only) and idempotent; the authoritative signal for size
    /// routing. Fails with [`ArchiveError::FetchTooBig`] when the
    /// transport refuses oversize files.
    async fn probe(&self, file_id: &str) -> Result<RemoteFile, ArchiveError>;

    /// Stream the file's bytes into `dest`.
    async fn fetch(
        &self,
        remote: &RemoteFile,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ArchiveError>;
}

/// Byte-stream file fetcher over the user protocol, used by the queue
/// worker for media above the inline limit. Session establishment and
/// authentication flows live behind this trait.
#[async_trait]
pub trait UserTransport: Send + Sync {
    /// Whether an authenticated session is currently available.
    async fn is_authorized(&self) -> Result<bool, ArchiveError>;

    /// Stream the media of a message into `dest`, returning the byte count.
    async fn fetch_message_media(
        &self,
        chat_id: i64,
        message_id: i64,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ArchiveError>;
}
