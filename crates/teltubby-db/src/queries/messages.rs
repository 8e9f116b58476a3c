// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archived-message audit records.

use rusqlite::params;
use teltubby_core::ArchiveError;

use crate::database::{map_tr_err, Database};

/// Record that a message was archived. Idempotent on (message_id, chat_id).
pub async fn record_message(
    db: &Database,
    chat_id: i64,
    message_id: i64,
    media_group_id: Option<String>,
) -> Result<(), ArchiveError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO messages(message_id, chat_id, media_group_id, created_at)
                 VALUES(?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![message_id.to_string(), chat_id.to_string(), media_group_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
