// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`DedupIndex`] trait.

use async_trait::async_trait;
use teltubby_core::traits::{DedupIndex, FileRecord};
use teltubby_core::ArchiveError;
use tracing::debug;

use crate::database::Database;
use crate::queries;
use crate::queries::files::RegisterOutcome;

/// SQLite-backed dedup index.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// Shared between the inline pipeline and (as a separate process against
/// the same file) the queue worker.
#[derive(Clone)]
pub struct SqliteDedupIndex {
    db: Database,
}

impl SqliteDedupIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DedupIndex for SqliteDedupIndex {
    async fn lookup_by_unique_id(
        &self,
        file_unique_id: &str,
    ) -> Result<Option<String>, ArchiveError> {
        queries::files::lookup_by_unique_id(&self.db, file_unique_id).await
    }

    async fn lookup_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, ArchiveError> {
        queries::files::lookup_by_hash(&self.db, sha256).await
    }

    async fn register(
        &self,
        record: FileRecord,
        file_unique_id: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let sha256 = record.sha256.clone();
        let outcome =
            queries::files::register(&self.db, record, file_unique_id.map(String::from)).await?;
        match outcome {
            RegisterOutcome::Registered => Ok(()),
            RegisterOutcome::AlreadyRegistered => {
                debug!(sha256 = %sha256, "dedup record already present");
                Ok(())
            }
            RegisterOutcome::Conflict { existing_key } => Err(ArchiveError::DedupConflict {
                sha256,
                existing_key,
            }),
        }
    }

    async fn record_message(
        &self,
        chat_id: i64,
        message_id: i64,
        media_group_id: Option<&str>,
    ) -> Result<(), ArchiveError> {
        queries::messages::record_message(
            &self.db,
            chat_id,
            message_id,
            media_group_id.map(String::from),
        )
        .await
    }

    async fn vacuum(&self) -> Result<(), ArchiveError> {
        queries::files::vacuum(&self.db).await
    }
}
