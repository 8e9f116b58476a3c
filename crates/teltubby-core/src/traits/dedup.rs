// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup index trait: the canonical content-hash to stored-key mapping.

use async_trait::async_trait;

use crate::error::ArchiveError;

/// One dedup record. Created at first successful upload, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub sha256: String,
    pub s3_key: String,
    pub size_bytes: u64,
    pub mime: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// Persistent map from content hash (and transport-unique-id) to stored
/// key. Writes are serialized through a single logical writer; readers
/// may be concurrent. Repeated identical registrations are idempotent.
#[async_trait]
pub trait DedupIndex: Send + Sync {
    /// Fast path: resolve a transport-unique-id to a SHA-256 without
    /// downloading anything.
    async fn lookup_by_unique_id(
        &self,
        file_unique_id: &str,
    ) -> Result<Option<String>, ArchiveError>;

    /// Authoritative path: resolve a SHA-256 to its record.
    async fn lookup_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, ArchiveError>;

    /// Resolve a transport-unique-id straight to the canonical record.
    async fn lookup_record_by_unique_id(
        &self,
        file_unique_id: &str,
    ) -> Result<Option<FileRecord>, ArchiveError> {
        match self.lookup_by_unique_id(file_unique_id).await? {
            Some(sha256) => self.lookup_by_hash(&sha256).await,
            None => Ok(None),
        }
    }

    /// Atomic insert-or-ignore on both tables. Registering an existing
    /// SHA-256 under the same key is a no-op; registering it under a
    /// *different* key fails with [`ArchiveError::DedupConflict`] and the
    /// existing entry stays canonical.
    async fn register(
        &self,
        record: FileRecord,
        file_unique_id: Option<&str>,
    ) -> Result<(), ArchiveError>;

    /// Idempotent audit record of an archived message.
    async fn record_message(
        &self,
        chat_id: i64,
        message_id: i64,
        media_group_id: Option<&str>,
    ) -> Result<(), ArchiveError>;

    /// Admin-triggered compaction.
    async fn vacuum(&self) -> Result<(), ArchiveError>;
}
