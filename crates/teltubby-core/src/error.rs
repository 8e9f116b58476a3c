// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the teltubby media archiver.

use thiserror::Error;

use crate::types::JobState;

/// The primary error type used across all teltubby capability traits and
/// core operations.
///
/// Store and transport variants carry a `transient` flag: transient
/// failures (network, 5xx, timeouts, throttling) are retried by the
/// caller, permanent ones are not.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Dedup index errors (database connection, query failure).
    #[error("dedup index error: {source}")]
    Index {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The same SHA-256 is already registered under a different key.
    /// The existing entry is canonical; the caller discards its upload.
    #[error("dedup conflict: sha256 {sha256} already maps to {existing_key}")]
    DedupConflict {
        sha256: String,
        existing_key: String,
    },

    /// Object store errors (upload, head, list, delete).
    #[error("object store error: {message}")]
    Store {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport errors while probing or fetching a file.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport refused to hand out a fetchable handle because the
    /// file exceeds the inline limit. Signals rerouting to the queue path.
    #[error("file exceeds the inline transport limit")]
    FetchTooBig,

    /// Queue broker errors (connect, declare, publish, consume).
    #[error("queue error: {message}")]
    Queue {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The `message.json` commit write failed. Uploaded objects are not
    /// rolled back; the operator reconciles via admin tooling.
    #[error("metadata write failed: {message}")]
    MetadataWrite { message: String },

    /// Admission refused because bucket usage is at 100%.
    #[error("bucket quota exhausted, ingestion suspended")]
    QuotaFull,

    /// A job state transition that the state graph forbids.
    #[error("invalid job state transition: {from} -> {to}")]
    InvalidJobTransition { from: JobState, to: JobState },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::Store { transient, .. } | ArchiveError::Transport { transient, .. } => {
                *transient
            }
            ArchiveError::Queue { .. } | ArchiveError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Stable snake_case label for logs and metric increments.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::Config(_) => "config",
            ArchiveError::Index { .. } => "dedup_unavailable",
            ArchiveError::DedupConflict { .. } => "dedup_conflict",
            ArchiveError::Store {
                transient: true, ..
            } => "upload_transient",
            ArchiveError::Store {
                transient: false, ..
            } => "upload_permanent",
            ArchiveError::Transport {
                transient: true, ..
            } => "fetch_transient",
            ArchiveError::Transport {
                transient: false, ..
            } => "fetch_permanent",
            ArchiveError::FetchTooBig => "fetch_too_big",
            ArchiveError::Queue { .. } => "queue",
            ArchiveError::MetadataWrite { .. } => "metadata_write_failed",
            ArchiveError::QuotaFull => "quota_full",
            ArchiveError::InvalidJobTransition { .. } => "invalid_job_transition",
            ArchiveError::Timeout { .. } => "timeout",
            ArchiveError::Internal(_) => "internal",
        }
    }

    /// Transient store error with a source.
    pub fn store_transient(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArchiveError::Store {
            message: message.into(),
            transient: true,
            source: Some(Box::new(source)),
        }
    }

    /// Permanent store error with a source.
    pub fn store_permanent(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArchiveError::Store {
            message: message.into(),
            transient: false,
            source: Some(Box::new(source)),
        }
    }

    /// Transient transport error with a source.
    pub fn transport_transient(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArchiveError::Transport {
            message: message.into(),
            transient: true,
            source: Some(Box::new(source)),
        }
    }

    /// Permanent transport error with a source.
    pub fn transport_permanent(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArchiveError::Transport {
            message: message.into(),
            transient: false,
            source: Some(Box::new(source)),
        }
    }

    /// Queue error with a source.
    pub fn queue(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArchiveError::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            ArchiveError::store_transient("503", std::io::Error::other("x")).is_transient()
        );
        assert!(
            !ArchiveError::store_permanent("403", std::io::Error::other("x")).is_transient()
        );
        assert!(
            ArchiveError::transport_transient("reset", std::io::Error::other("x")).is_transient()
        );
        assert!(!ArchiveError::QuotaFull.is_transient());
        assert!(!ArchiveError::FetchTooBig.is_transient());
        assert!(
            ArchiveError::Timeout {
                duration: std::time::Duration::from_secs(60)
            }
            .is_transient()
        );
    }

    #[test]
    fn kinds_match_error_taxonomy() {
        assert_eq!(
            ArchiveError::transport_permanent("gone", std::io::Error::other("x")).kind(),
            "fetch_permanent"
        );
        assert_eq!(ArchiveError::FetchTooBig.kind(), "fetch_too_big");
        assert_eq!(
            ArchiveError::DedupConflict {
                sha256: "ab".into(),
                existing_key: "k".into()
            }
            .kind(),
            "dedup_conflict"
        );
        assert_eq!(
            ArchiveError::MetadataWrite {
                message: "put failed".into()
            }
            .kind(),
            "metadata_write_failed"
        );
    }
}
