// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the teltubby archiver.
//!
//! Holds the dedup index (content hash to stored key) and the local job
//! table (the source of truth for queue jobs). All writes are serialized
//! through tokio-rusqlite's single background thread; the [`Database`]
//! struct IS the single writer. Query modules accept `&Database` and call
//! through `connection().call()`.
//!
//! **Do NOT create additional Connection instances for writes within one
//! process.** The bot and the worker run as separate processes against
//! the same file; WAL mode and a busy timeout arbitrate between them.

pub mod database;
pub mod index;
pub mod job_store;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use index::SqliteDedupIndex;
pub use job_store::SqliteJobStore;
