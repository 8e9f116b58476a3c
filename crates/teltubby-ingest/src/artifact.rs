// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `message.json` metadata artifact, schema v1.0.
//!
//! Written at `{prefix}/message.json` as the unit's commit point. The
//! inline pipeline and the queue worker build it through the same code so
//! both paths produce identical artifacts for the same unit.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use teltubby_core::types::{DedupReason, Disposition, ItemOutcome, MediaKind, MessageUnit};

pub const SCHEMA_VERSION: &str = "1.0";

/// Object key of a unit's metadata artifact.
pub fn artifact_key(prefix: &str) -> String {
    format!("{prefix}message.json")
}

/// Top-level artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageArtifact {
    pub schema_version: String,
    pub archive_timestamp_utc: String,
    pub message_timestamp_utc: String,
    pub bucket: String,
    /// The unit's key prefix.
    pub base_path: String,
    pub files_count: u32,
    pub total_bytes_uploaded: u64,
    /// Keys belonging to this unit's items, in ordinal order.
    pub keys: Vec<String>,
    /// Unit-level duplicate marker; null unless the entire unit mirrors
    /// another.
    pub duplicate_of: Option<String>,
    pub dedup_reason: Option<DedupReason>,
    pub notes: Option<String>,
    pub telegram: TelegramArtifact,
}

/// Transport context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramArtifact {
    pub message_id: String,
    pub media_group_id: Option<String>,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_username: Option<String>,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_origin: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_plain: Option<String>,
    pub caption_entities: Vec<serde_json::Value>,
    pub entities: Vec<serde_json::Value>,
    pub items: Vec<ItemArtifact>,
}

/// Per-item entry, in ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemArtifact {
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub sha256: Option<String>,
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_reason: Option<DedupReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Build the artifact for a resolved unit.
///
/// The unit-level `duplicate_of` is set only when every item is a
/// duplicate and all canonical keys live under one prefix; mixed and
/// partial duplication stays per-item.
pub fn build_artifact(
    bucket: &str,
    base_path: &str,
    unit: &MessageUnit,
    outcomes: &[ItemOutcome],
    total_bytes_uploaded: u64,
    archived_at: DateTime<Utc>,
) -> MessageArtifact {
    let keys: Vec<String> = outcomes.iter().filter_map(|o| o.key.clone()).collect();
    let files_count = keys.len() as u32;
    let (duplicate_of, dedup_reason) = unit_level_duplicate(outcomes);

    let items = outcomes
        .iter()
        .map(|outcome| {
            let (duplicate_of, dedup_reason, skipped_reason) = match &outcome.disposition {
                Disposition::Duplicate { of, reason } => {
                    (Some(of.clone()), Some(*reason), None)
                }
                Disposition::Skipped { reason } => (None, None, Some(reason.to_string())),
                Disposition::Failed { kind } => (None, None, Some(kind.clone())),
                Disposition::Stored => (None, None, None),
            };
            ItemArtifact {
                ordinal: outcome.item.ordinal,
                kind: outcome.item.kind,
                mime_type: outcome.item.mime_type.clone(),
                size_bytes: outcome.size_bytes.or(outcome.item.size_hint),
                width: outcome.item.width,
                height: outcome.item.height,
                duration: outcome.item.duration,
                file_id: outcome.item.file_id.clone(),
                file_unique_id: outcome.item.file_unique_id.clone(),
                original_filename: outcome.item.file_name.clone(),
                sha256: outcome.sha256.clone(),
                s3_key: outcome.key.clone(),
                duplicate_of,
                dedup_reason,
                skipped_reason,
            }
        })
        .collect();

    MessageArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        archive_timestamp_utc: format_ts(archived_at),
        message_timestamp_utc: format_ts(unit.timestamp),
        bucket: bucket.to_string(),
        base_path: base_path.to_string(),
        files_count,
        total_bytes_uploaded,
        keys,
        duplicate_of,
        dedup_reason,
        notes: unit.notes.clone(),
        telegram: TelegramArtifact {
            message_id: unit.message_id.to_string(),
            media_group_id: unit.media_group_id.clone(),
            chat_id: unit.chat.id.to_string(),
            chat_title: unit.chat.title.clone(),
            chat_username: unit.chat.username.clone(),
            sender_id: unit.sender.id.to_string(),
            sender_username: unit.sender.username.clone(),
            forward_origin: unit.forward_origin.as_ref().map(|o| o.raw.clone()),
            caption_plain: unit.caption.clone(),
            caption_entities: unit.caption_entities.clone(),
            entities: unit.entities.clone(),
            items,
        },
    }
}

/// Compact JSON encoding, the exact bytes written to the bucket.
pub fn to_bytes(artifact: &MessageArtifact) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(artifact)
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Unit-level duplication: every item a duplicate, all canonical keys
/// under one prefix.
fn unit_level_duplicate(outcomes: &[ItemOutcome]) -> (Option<String>, Option<DedupReason>) {
    if outcomes.is_empty() || !outcomes.iter().all(|o| o.is_duplicate()) {
        return (None, None);
    }

    let mut canonical_prefixes = Vec::new();
    let mut reasons = Vec::new();
    for outcome in outcomes {
        if let Disposition::Duplicate { of, reason } = &outcome.disposition {
            canonical_prefixes.push(key_prefix(of));
            reasons.push(*reason);
        }
    }
    canonical_prefixes.dedup();
    if canonical_prefixes.len() != 1 {
        return (None, None);
    }

    let duplicate_of = if outcomes.len() == 1 {
        match &outcomes[0].disposition {
            Disposition::Duplicate { of, .. } => of.clone(),
            _ => return (None, None),
        }
    } else {
        canonical_prefixes.remove(0)
    };

    // sha256 is authoritative when the items disagree on the reason.
    let reason = if reasons.iter().all(|r| *r == reasons[0]) {
        reasons[0]
    } else {
        DedupReason::Sha256
    };

    (Some(duplicate_of), Some(reason))
}

fn key_prefix(key: &str) -> String {
    match key.rfind('/') {
        Some(pos) => key[..=pos].to_string(),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teltubby_core::types::{ChatRef, MediaItem, SenderRef, SkipReason};

    fn unit() -> MessageUnit {
        MessageUnit {
            chat: ChatRef {
                id: 7,
                username: Some("curator".into()),
                title: None,
            },
            message_id: 42,
            media_group_id: Some("G".into()),
            sender: SenderRef {
                id: 9,
                username: Some("kurt".into()),
            },
            timestamp: DateTime::from_timestamp(1_722_470_400, 0).unwrap(),
            caption: Some("hello".into()),
            caption_entities: vec![],
            entities: vec![],
            forward_origin: None,
            items: vec![],
            notes: None,
        }
    }

    fn item(ordinal: u32) -> MediaItem {
        MediaItem {
            ordinal,
            source_message_id: 42,
            kind: MediaKind::Photo,
            file_id: format!("f{ordinal}"),
            file_unique_id: format!("u{ordinal}"),
            mime_type: Some("image/jpeg".into()),
            size_hint: Some(100),
            width: Some(640),
            height: Some(480),
            duration: None,
            file_name: None,
        }
    }

    fn stored(ordinal: u32, key: &str) -> ItemOutcome {
        ItemOutcome {
            item: item(ordinal),
            size_bytes: Some(100),
            sha256: Some(format!("sha{ordinal}")),
            key: Some(key.to_string()),
            disposition: Disposition::Stored,
        }
    }

    fn duplicate(ordinal: u32, of: &str, reason: DedupReason) -> ItemOutcome {
        ItemOutcome {
            item: item(ordinal),
            size_bytes: Some(100),
            sha256: Some(format!("sha{ordinal}")),
            key: Some(of.to_string()),
            disposition: Disposition::Duplicate {
                of: of.to_string(),
                reason,
            },
        }
    }

    #[test]
    fn artifact_lists_keys_in_ordinal_order() {
        let unit = unit();
        let outcomes = vec![stored(1, "p/a.jpg"), stored(2, "p/b.jpg")];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 200, Utc::now());

        assert_eq!(artifact.schema_version, "1.0");
        assert_eq!(artifact.files_count, 2);
        assert_eq!(artifact.keys, vec!["p/a.jpg", "p/b.jpg"]);
        assert_eq!(artifact.total_bytes_uploaded, 200);
        assert!(artifact.duplicate_of.is_none());
        assert_eq!(artifact.telegram.message_id, "42");
        assert_eq!(artifact.telegram.items.len(), 2);
        assert_eq!(artifact.telegram.items[0].ordinal, 1);
        assert_eq!(artifact.message_timestamp_utc, "2024-08-01T00:00:00Z");
    }

    #[test]
    fn single_duplicate_item_sets_unit_level_marker() {
        let unit = unit();
        let outcomes = vec![duplicate(1, "other/prefix/x.jpg", DedupReason::Sha256)];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 0, Utc::now());

        assert_eq!(artifact.duplicate_of.as_deref(), Some("other/prefix/x.jpg"));
        assert_eq!(artifact.dedup_reason, Some(DedupReason::Sha256));
        assert_eq!(
            artifact.telegram.items[0].duplicate_of.as_deref(),
            Some("other/prefix/x.jpg")
        );
    }

    #[test]
    fn partial_duplication_stays_per_item() {
        let unit = unit();
        let outcomes = vec![
            stored(1, "p/a.jpg"),
            duplicate(2, "other/x.jpg", DedupReason::UniqueId),
        ];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 100, Utc::now());

        assert!(artifact.duplicate_of.is_none());
        assert!(artifact.dedup_reason.is_none());
        assert_eq!(
            artifact.telegram.items[1].dedup_reason,
            Some(DedupReason::UniqueId)
        );
    }

    #[test]
    fn duplicates_across_different_units_are_not_unit_level() {
        let unit = unit();
        let outcomes = vec![
            duplicate(1, "one/prefix/a.jpg", DedupReason::Sha256),
            duplicate(2, "another/prefix/b.jpg", DedupReason::Sha256),
        ];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 0, Utc::now());
        assert!(artifact.duplicate_of.is_none());
    }

    #[test]
    fn whole_album_mirroring_one_prefix_is_unit_level() {
        let unit = unit();
        let outcomes = vec![
            duplicate(1, "one/prefix/a.jpg", DedupReason::UniqueId),
            duplicate(2, "one/prefix/b.jpg", DedupReason::Sha256),
        ];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 0, Utc::now());
        assert_eq!(artifact.duplicate_of.as_deref(), Some("one/prefix/"));
        // Mixed reasons fall back to the authoritative hash.
        assert_eq!(artifact.dedup_reason, Some(DedupReason::Sha256));
    }

    #[test]
    fn skipped_items_carry_their_reason_and_no_key() {
        let unit = unit();
        let outcomes = vec![ItemOutcome {
            item: item(1),
            size_bytes: None,
            sha256: None,
            key: None,
            disposition: Disposition::Skipped {
                reason: SkipReason::OversizeConfigured,
            },
        }];
        let artifact = build_artifact("bucket", "p/", &unit, &outcomes, 0, Utc::now());
        assert!(artifact.keys.is_empty());
        assert_eq!(artifact.files_count, 0);
        assert_eq!(
            artifact.telegram.items[0].skipped_reason.as_deref(),
            Some("oversize_configured")
        );
    }

    #[test]
    fn serialized_shape_has_null_fields_where_required() {
        let unit = unit();
        let artifact = build_artifact("bucket", "p/", &unit, &[stored(1, "p/a.jpg")], 100, Utc::now());
        let value: serde_json::Value = serde_json::from_slice(&to_bytes(&artifact).unwrap()).unwrap();

        // Nullable top-level fields are present as explicit nulls.
        assert!(value.get("duplicate_of").unwrap().is_null());
        assert!(value.get("dedup_reason").unwrap().is_null());
        assert!(value.get("notes").unwrap().is_null());
        assert_eq!(value["telegram"]["items"][0]["type"], "photo");
        assert_eq!(value["schema_version"], "1.0");
    }
}
