// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the teltubby workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Media kind of a single item within a unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Animation,
    VideoNote,
    Sticker,
    Other,
}

impl MediaKind {
    /// Fallback file extension when the transport supplies no filename.
    pub fn default_ext(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Document => "bin",
            MediaKind::Audio => "mp3",
            MediaKind::Voice => "ogg",
            MediaKind::Animation => "mp4",
            MediaKind::VideoNote => "mp4",
            MediaKind::Sticker => "webp",
            MediaKind::Other => "bin",
        }
    }
}

/// Why an item was recorded as a duplicate instead of uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DedupReason {
    UniqueId,
    Sha256,
}

/// Why an item was skipped or a unit rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OversizeConfigured,
    UnsupportedKind,
    MissingMedia,
    FetchPermanent,
    UploadFailed,
}

/// Reference to the chat a message arrived in (or was forwarded from).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

/// Reference to the curator who submitted the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    pub id: i64,
    pub username: Option<String>,
}

/// Forward-origin descriptor, kept both resolved (for slugging) and raw
/// (for the metadata artifact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    /// Username of the origin chat, when visible.
    pub username: Option<String>,
    /// Title of the origin chat, when visible.
    pub title: Option<String>,
    /// Numeric id of the origin chat, when visible.
    pub chat_id: Option<i64>,
    /// Opaque structured snapshot as received from the transport.
    pub raw: serde_json::Value,
}

/// One binary payload within a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// 1-based, stable within the unit. Assigned when the unit is sealed.
    pub ordinal: u32,
    /// Id of the message this item arrived in. Equals the unit's
    /// `message_id` except for album members, which keep their own.
    pub source_message_id: i64,
    pub kind: MediaKind,
    /// Transport file handle used for fetching.
    pub file_id: String,
    /// Stable per-content id across messages and chats.
    pub file_unique_id: String,
    /// Declared MIME, untrusted.
    pub mime_type: Option<String>,
    /// Declared size, untrusted.
    pub size_hint: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    /// Original filename as supplied by the transport, verbatim.
    pub file_name: Option<String>,
}

/// The atomic archival object: one message or one sealed album.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUnit {
    pub chat: ChatRef,
    /// Message id of the unit's first message.
    pub message_id: i64,
    pub media_group_id: Option<String>,
    pub sender: SenderRef,
    pub timestamp: DateTime<Utc>,
    pub caption: Option<String>,
    pub caption_entities: Vec<serde_json::Value>,
    pub entities: Vec<serde_json::Value>,
    pub forward_origin: Option<ForwardOrigin>,
    pub items: Vec<MediaItem>,
    /// Set by the aggregator, e.g. for late album fragments.
    pub notes: Option<String>,
}

/// What happened to a single item during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Disposition {
    /// A fresh binary was uploaded.
    Stored,
    /// The content already exists in the bucket.
    Duplicate { of: String, reason: DedupReason },
    /// The item was skipped before upload.
    Skipped { reason: SkipReason },
    /// All upload attempts failed; the unit committed without this item.
    Failed { kind: String },
}

/// Per-item outcome within a committed unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item: MediaItem,
    /// Actual size after download, when known.
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    /// Stored key for fresh uploads; the canonical key for duplicates.
    pub key: Option<String>,
    pub disposition: Disposition,
}

impl ItemOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self.disposition, Disposition::Stored)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.disposition, Disposition::Duplicate { .. })
    }
}

/// Structured summary of a committed unit, returned to the ack formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReceipt {
    pub bucket: String,
    /// The unit's key prefix.
    pub base_path: String,
    pub outcomes: Vec<ItemOutcome>,
    pub total_bytes_uploaded: u64,
    /// Unit-level duplicate marker: set only when every item duplicates
    /// the same prior unit.
    pub duplicate_of: Option<String>,
    pub dedup_reason: Option<DedupReason>,
    pub notes: Option<String>,
    pub elapsed_seconds: f64,
}

// --- Job types ---

/// State of a durable oversize-media job.
///
/// Legal transitions:
/// PENDING -> PROCESSING -> {COMPLETED, FAILED};
/// PENDING -> FAILED (publish failed after the row was inserted);
/// PENDING -> CANCELLED; PROCESSING -> CANCELLATION_REQUESTED -> CANCELLED;
/// {FAILED, CANCELLED} -> PENDING (admin retry only);
/// PROCESSING -> PENDING (transient re-queue).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    CancellationRequested,
}

impl JobState {
    /// Whether the state graph permits `self -> next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Processing, CancellationRequested)
                | (CancellationRequested, Cancelled)
                | (CancellationRequested, Failed)
                | (Failed, Pending)
                | (Cancelled, Pending)
        )
    }

    /// Terminal states never change except via an explicit admin retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// File descriptor carried inside a job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFileInfo {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: Option<u64>,
    pub file_type: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Telegram context snapshot carried inside a job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_origin: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_group_id: Option<String>,
}

/// Job bookkeeping carried inside a job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub created_at: DateTime<Utc>,
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
}

/// The exact message delivered to the broker. The local job row stores
/// this verbatim so retries reconstruct identical work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub file_info: JobFileInfo,
    pub telegram_context: JobContext,
    pub job_metadata: JobMetadata,
}

/// Local job row, the source of truth for UI and admin commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub job_id: Uuid,
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub state: JobState,
    /// Serialized [`JobPayload`] as published.
    pub payload_json: String,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}
