// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup index queries: content hash and transport-unique-id lookups.

use rusqlite::{params, OptionalExtension};
use teltubby_core::traits::FileRecord;
use teltubby_core::ArchiveError;

use crate::database::{map_tr_err, Database};

/// What `register` did with the new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Fresh record inserted.
    Registered,
    /// The exact same sha256 -> key mapping already existed.
    AlreadyRegistered,
    /// The sha256 maps to a different key; the existing entry is canonical.
    Conflict { existing_key: String },
}

/// Fast path: resolve a transport-unique-id to its SHA-256.
pub async fn lookup_by_unique_id(
    db: &Database,
    file_unique_id: &str,
) -> Result<Option<String>, ArchiveError> {
    let file_unique_id = file_unique_id.to_string();
    db.connection()
        .call(move |conn| {
            let sha = conn
                .query_row(
                    "SELECT sha256 FROM tg_map WHERE file_unique_id = ?1",
                    params![file_unique_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(sha)
        })
        .await
        .map_err(map_tr_err)
}

/// Authoritative path: resolve a SHA-256 to its full record.
pub async fn lookup_by_hash(
    db: &Database,
    sha256: &str,
) -> Result<Option<FileRecord>, ArchiveError> {
    let sha256 = sha256.to_string();
    db.connection()
        .call(move |conn| {
            let record = conn
                .query_row(
                    "SELECT sha256, s3_key, size_bytes, mime, created_at
                     FROM files WHERE sha256 = ?1",
                    params![sha256],
                    |row| {
                        Ok(FileRecord {
                            sha256: row.get(0)?,
                            s3_key: row.get(1)?,
                            size_bytes: row.get::<_, i64>(2)? as u64,
                            mime: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomic insert-or-ignore on `files` and `tg_map`.
///
/// Re-registering an identical mapping is a no-op; a different key for an
/// existing sha256 reports a conflict without touching the tables.
pub async fn register(
    db: &Database,
    record: FileRecord,
    file_unique_id: Option<String>,
) -> Result<RegisterOutcome, ArchiveError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT s3_key FROM files WHERE sha256 = ?1",
                    params![record.sha256],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(key) if key != record.s3_key => RegisterOutcome::Conflict { existing_key: key },
                Some(_) => {
                    // Same mapping; still make sure the unique-id alias exists.
                    if let Some(uid) = &file_unique_id {
                        tx.execute(
                            "INSERT OR IGNORE INTO tg_map(file_unique_id, sha256) VALUES(?1, ?2)",
                            params![uid, record.sha256],
                        )?;
                    }
                    RegisterOutcome::AlreadyRegistered
                }
                None => {
                    tx.execute(
                        "INSERT OR IGNORE INTO files(sha256, s3_key, size_bytes, mime, created_at)
                         VALUES(?1, ?2, ?3, ?4, ?5)",
                        params![
                            record.sha256,
                            record.s3_key,
                            record.size_bytes as i64,
                            record.mime,
                            record.created_at
                        ],
                    )?;
                    if let Some(uid) = &file_unique_id {
                        tx.execute(
                            "INSERT OR IGNORE INTO tg_map(file_unique_id, sha256) VALUES(?1, ?2)",
                            params![uid, record.sha256],
                        )?;
                    }
                    RegisterOutcome::Registered
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Admin-triggered compaction.
pub async fn vacuum(db: &Database) -> Result<(), ArchiveError> {
    db.connection()
        .call(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
