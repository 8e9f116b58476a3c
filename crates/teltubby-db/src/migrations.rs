// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations.
//!
//! SQL migration files are compiled into the binary and applied in order
//! on database open. Applied versions are tracked via `PRAGMA
//! user_version`, so re-opening an up-to-date database is a no-op. The
//! migration runner must stay callable from the single-writer connection,
//! which is why it works directly on `rusqlite::Connection`.

/// Ordered migration scripts. Append only; never edit a shipped entry.
const MIGRATIONS: &[&str] = &[include_str!("../migrations/V1__initial_schema.sql")];

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::debug!(version, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_and_track_version() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        // Re-running applies nothing and keeps the version.
        run_migrations(&mut conn).unwrap();
        let version_again: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, version_again);
    }
}
