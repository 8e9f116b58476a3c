// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local job table queries.
//!
//! State transitions use a guarded UPDATE (`WHERE state = <expected>`),
//! which gives optimistic per-row locking between the bot process and
//! the worker process.

use std::str::FromStr;

use rusqlite::{params, OptionalExtension};
use teltubby_core::types::{JobRow, JobState};
use teltubby_core::ArchiveError;
use uuid::Uuid;

use crate::database::{map_tr_err, Database};

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    let job_id: String = row.get(0)?;
    let state: String = row.get(4)?;
    Ok(JobRow {
        job_id: Uuid::from_str(&job_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        message_id: row.get(3)?,
        state: JobState::from_str(&state).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        payload_json: row.get(5)?,
        last_error: row.get(6)?,
        retry_count: row.get::<_, i64>(7)? as u32,
        max_retries: row.get::<_, i64>(8)? as u32,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const JOB_COLUMNS: &str = "job_id, user_id, chat_id, message_id, state, payload_json,
                           last_error, retry_count, max_retries, created_at, updated_at";

/// Insert a fresh job row.
pub async fn insert(db: &Database, row: JobRow) -> Result<(), ArchiveError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO jobs(job_id, user_id, chat_id, message_id, state, payload_json,
                                  last_error, retry_count, max_retries, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                        strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                        strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![
                    row.job_id.to_string(),
                    row.user_id,
                    row.chat_id,
                    row.message_id,
                    row.state.to_string(),
                    row.payload_json,
                    row.last_error,
                    row.retry_count as i64,
                    row.max_retries as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one job row by id.
pub async fn get(db: &Database, job_id: Uuid) -> Result<Option<JobRow>, ArchiveError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let job = conn
                .query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
                    params![job_id],
                    row_to_job,
                )
                .optional()?;
            Ok(job)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently created jobs first.
pub async fn list_recent(db: &Database, limit: u32) -> Result<Vec<JobRow>, ArchiveError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, job_id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_job)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Guarded state update: succeeds only while the row is still in
/// `expected`. Returns whether a row was updated.
pub async fn update_state_guarded(
    db: &Database,
    job_id: Uuid,
    expected: JobState,
    next: JobState,
    error: Option<String>,
) -> Result<bool, ArchiveError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE jobs SET state = ?2, last_error = ?3,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1 AND state = ?4",
                params![job_id, next.to_string(), error, expected.to_string()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the retry counter, returning the new value.
pub async fn increment_retry(db: &Database, job_id: Uuid) -> Result<u32, ArchiveError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET retry_count = retry_count + 1,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1",
                params![job_id],
            )?;
            let count: i64 = conn.query_row(
                "SELECT retry_count FROM jobs WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
        .await
        .map_err(map_tr_err)
}
