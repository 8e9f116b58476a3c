// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the teltubby media archiver.
//!
//! This crate provides the foundational trait definitions, error types,
//! domain types, and the deterministic bucket layout builder used
//! throughout the teltubby workspace. The ingestion pipeline, the queue
//! worker, and the transport adapters all program against the capability
//! traits defined here.

pub mod error;
pub mod layout;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ArchiveError;
pub use types::{
    DedupReason, Disposition, ItemOutcome, JobPayload, JobRow, JobState, MediaItem, MediaKind,
    MessageUnit, SkipReason, UnitReceipt,
};

// Re-export all capability traits at crate root.
pub use traits::{
    BotTransport, DedupIndex, JobPublisher, JobStore, Notifier, ObjectStore, UserTransport,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable_labels() {
        // Metric labels must never drift; they are part of the dashboards.
        assert_eq!(ArchiveError::QuotaFull.kind(), "quota_full");
        assert_eq!(
            ArchiveError::Config("x".into()).kind(),
            "config"
        );
    }

    #[test]
    fn all_trait_modules_are_exported() {
        // If any capability trait module is missing or has a compile
        // error, this test won't compile.
        fn _assert_object_store<T: ObjectStore>() {}
        fn _assert_dedup_index<T: DedupIndex>() {}
        fn _assert_job_store<T: JobStore>() {}
        fn _assert_job_publisher<T: JobPublisher>() {}
        fn _assert_bot_transport<T: BotTransport>() {}
        fn _assert_user_transport<T: UserTransport>() {}
        fn _assert_notifier<T: Notifier>() {}
    }
}
