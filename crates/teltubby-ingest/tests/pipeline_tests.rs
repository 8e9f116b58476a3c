// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests against in-memory collaborators.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use teltubby_config::model::{IngestConfig, QuotaConfig};
use teltubby_core::traits::ObjectStore;
use teltubby_core::types::{
    ChatRef, DedupReason, Disposition, MediaItem, MediaKind, MessageUnit, SenderRef, SkipReason,
};
use teltubby_core::ArchiveError;
use teltubby_ingest::{IngestPipeline, IngestReport};
use teltubby_store::QuotaGate;
use teltubby_test_utils::{MemoryDedup, MemoryIntake, MemoryStore, ScriptedBotTransport};

struct Harness {
    store: Arc<MemoryStore>,
    dedup: Arc<MemoryDedup>,
    transport: Arc<ScriptedBotTransport>,
    intake: Arc<MemoryIntake>,
    quota: Arc<QuotaGate>,
    pipeline: IngestPipeline,
}

fn harness_with(dedup_enable: bool, quota_bytes: Option<u64>) -> Harness {
    let store = Arc::new(MemoryStore::new("teltubby"));
    let dedup = Arc::new(MemoryDedup::new());
    let transport = Arc::new(ScriptedBotTransport::new());
    let intake = Arc::new(MemoryIntake::new());
    let quota = Arc::new(QuotaGate::new(
        store.clone(),
        &QuotaConfig {
            bucket_quota_bytes: quota_bytes,
            poll_interval_seconds: 300,
        },
    ));
    let pipeline = IngestPipeline::new(
        IngestConfig::default(),
        dedup_enable,
        store.clone(),
        dedup.clone(),
        transport.clone(),
        intake.clone(),
        quota.clone(),
    );
    Harness {
        store,
        dedup,
        transport,
        intake,
        quota,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(true, None)
}

fn ts() -> DateTime<Utc> {
    DateTime::from_timestamp(1_722_470_400, 0).unwrap() // 2024-08-01T00:00:00Z
}

fn photo_item(ordinal: u32, message_id: i64, file_id: &str, uid: &str, size: u64) -> MediaItem {
    MediaItem {
        ordinal,
        source_message_id: message_id,
        kind: MediaKind::Photo,
        file_id: file_id.to_string(),
        file_unique_id: uid.to_string(),
        mime_type: Some("image/jpeg".to_string()),
        size_hint: Some(size),
        width: Some(1280),
        height: Some(960),
        duration: None,
        file_name: None,
    }
}

fn unit(chat_id: i64, message_id: i64, items: Vec<MediaItem>) -> MessageUnit {
    MessageUnit {
        chat: ChatRef {
            id: chat_id,
            username: Some("curator".to_string()),
            title: None,
        },
        message_id,
        media_group_id: None,
        sender: SenderRef {
            id: 9,
            username: Some("kurt".to_string()),
        },
        timestamp: ts(),
        caption: None,
        caption_entities: vec![],
        entities: vec![],
        forward_origin: None,
        items,
        notes: None,
    }
}

fn artifact_json(store: &MemoryStore, prefix: &str) -> serde_json::Value {
    let raw = store
        .object(&format!("{prefix}message.json"))
        .expect("message.json should exist");
    serde_json::from_slice(&raw).unwrap()
}

// Scenario 1: single photo, inline.
#[tokio::test]
async fn single_photo_inline() {
    let h = harness();
    let payload = vec![7u8; 1_258_291]; // ~1.2 MiB
    h.transport.add_file("f1", payload.clone());

    let report = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 1_258_291)]))
        .await
        .unwrap();

    let receipt = match report {
        IngestReport::Archived { receipt, queued } => {
            assert!(queued.is_empty());
            receipt
        }
        other => panic!("expected Archived, got {other:?}"),
    };

    assert_eq!(receipt.base_path, "teltubby/2024/08/curator/42/");
    assert_eq!(receipt.total_bytes_uploaded, payload.len() as u64);
    assert_eq!(receipt.outcomes.len(), 1);
    assert!(receipt.outcomes[0].is_stored());
    assert!(receipt.duplicate_of.is_none());

    // One binary plus the artifact.
    assert_eq!(h.store.object_count(), 2);
    let json = artifact_json(&h.store, &receipt.base_path);
    assert_eq!(json["files_count"], 1);
    assert_eq!(json["total_bytes_uploaded"], payload.len() as u64);
    assert!(json["duplicate_of"].is_null());
    assert_eq!(json["keys"].as_array().unwrap().len(), 1);

    // The binary carries its declared MIME.
    let key = receipt.outcomes[0].key.as_deref().unwrap();
    assert_eq!(h.store.content_type(key).as_deref(), Some("image/jpeg"));
    assert!(key.starts_with(&receipt.base_path));
    assert!(key.ends_with(".jpg"));
}

// Scenario 2: album of three, inline, one artifact.
#[tokio::test]
async fn album_of_three_commits_as_one_unit() {
    let h = harness();
    for i in 1..=3u8 {
        h.transport.add_file(&format!("f{i}"), vec![i; 100 + i as usize]);
    }
    let mut album = unit(
        7,
        42,
        vec![
            photo_item(1, 42, "f1", "u1", 101),
            photo_item(2, 43, "f2", "u2", 102),
            photo_item(3, 44, "f3", "u3", 103),
        ],
    );
    album.media_group_id = Some("G".to_string());

    let report = h.pipeline.process_unit(&album).await.unwrap();
    let receipt = match report {
        IngestReport::Archived { receipt, .. } => receipt,
        other => panic!("expected Archived, got {other:?}"),
    };

    assert_eq!(receipt.outcomes.len(), 3);
    assert!(receipt.outcomes.iter().all(|o| o.is_stored()));

    let json = artifact_json(&h.store, &receipt.base_path);
    let keys: Vec<String> = json["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k.as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().all(|k| k.starts_with(&receipt.base_path)));
    // Zero-padded ordinals in filename order.
    assert!(keys[0].contains("_001"));
    assert!(keys[1].contains("_002"));
    assert!(keys[2].contains("_003"));
    // 3 binaries + 1 artifact.
    assert_eq!(h.store.object_count(), 4);
}

// Scenario 3: duplicate by content across chats.
#[tokio::test]
async fn duplicate_by_content_is_stored_once() {
    let h = harness();
    let doc = vec![42u8; 4096];
    h.transport.add_file("f1", doc.clone());
    h.transport.add_file("f2", doc.clone());

    let first = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 4096)]))
        .await
        .unwrap();
    let first_key = match first {
        IngestReport::Archived { receipt, .. } => receipt.outcomes[0].key.clone().unwrap(),
        other => panic!("expected Archived, got {other:?}"),
    };

    // Different chat, different unique id, same bytes.
    let second = h
        .pipeline
        .process_unit(&unit(8, 43, vec![photo_item(1, 43, "f2", "u2", 4096)]))
        .await
        .unwrap();
    let receipt = match second {
        IngestReport::Archived { receipt, .. } => receipt,
        other => panic!("expected Archived, got {other:?}"),
    };

    match &receipt.outcomes[0].disposition {
        Disposition::Duplicate { of, reason } => {
            assert_eq!(of, &first_key);
            assert_eq!(*reason, DedupReason::Sha256);
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }
    assert_eq!(receipt.total_bytes_uploaded, 0);
    assert_eq!(receipt.duplicate_of.as_deref(), Some(first_key.as_str()));

    // One stored binary, two artifacts.
    assert_eq!(h.dedup.record_count(), 1);
    let binaries = h
        .store
        .keys()
        .into_iter()
        .filter(|k| !k.ends_with("message.json"))
        .count();
    assert_eq!(binaries, 1);
}

// P1 fast path: same unique id resolves without a download.
#[tokio::test]
async fn duplicate_by_unique_id_skips_download() {
    let h = harness();
    h.transport.add_file("f1", vec![1u8; 64]);

    let first = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 64)]))
        .await
        .unwrap();
    let first_key = match first {
        IngestReport::Archived { receipt, .. } => receipt.outcomes[0].key.clone().unwrap(),
        other => panic!("expected Archived, got {other:?}"),
    };

    // The second submission's file id is unknown to the transport: a
    // download attempt would fail, proving the fast path never fetches.
    let mut resend = unit(7, 50, vec![photo_item(1, 50, "f-unknown", "u1", 64)]);
    resend.items[0].size_hint = Some(64);
    h.transport.add_file("f-unknown", vec![9u8; 64]);

    let second = h.pipeline.process_unit(&resend).await.unwrap();
    let receipt = match second {
        IngestReport::Archived { receipt, .. } => receipt,
        other => panic!("expected Archived, got {other:?}"),
    };
    match &receipt.outcomes[0].disposition {
        Disposition::Duplicate { of, reason } => {
            assert_eq!(of, &first_key);
            assert_eq!(*reason, DedupReason::UniqueId);
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }
    assert!(receipt.outcomes[0].sha256.is_none());
}

// Scenario 4: oversize item routes to the queue.
#[tokio::test]
async fn oversize_item_is_queued_not_uploaded() {
    let h = harness();
    let mut video = photo_item(1, 42, "f1", "u1", 80 * 1024 * 1024);
    video.kind = MediaKind::Video;
    video.mime_type = Some("video/mp4".to_string());

    let report = h.pipeline.process_unit(&unit(7, 42, vec![video])).await.unwrap();
    match report {
        IngestReport::QueuedOnly { queued } => {
            assert_eq!(queued.len(), 1);
            assert!(queued[0].job_id.is_some());
            assert!(queued[0].error.is_none());
        }
        other => panic!("expected QueuedOnly, got {other:?}"),
    }

    let requests = h.intake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.file_info.file_unique_id, "u1");
    assert_eq!(requests[0].1.file_info.file_size, Some(80 * 1024 * 1024));
    // No binary, no artifact.
    assert_eq!(h.store.object_count(), 0);
}

// Mixed unit: inline item commits, oversize item queues.
#[tokio::test]
async fn mixed_unit_splits_between_paths() {
    let h = harness();
    h.transport.add_file("f1", vec![5u8; 256]);
    let mut big = photo_item(2, 43, "f2", "u2", 80 * 1024 * 1024);
    big.kind = MediaKind::Video;

    let mut mixed = unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 256), big]);
    mixed.media_group_id = Some("G".to_string());

    let report = h.pipeline.process_unit(&mixed).await.unwrap();
    match report {
        IngestReport::Archived { receipt, queued } => {
            assert_eq!(receipt.outcomes.len(), 1);
            assert!(receipt.outcomes[0].is_stored());
            assert_eq!(queued.len(), 1);
            assert_eq!(queued[0].ordinal, 2);
        }
        other => panic!("expected Archived, got {other:?}"),
    }
    // The queued job references the album member's own message id.
    assert_eq!(h.intake.requests()[0].1.message_id, 43);
}

// Scenario 5 / P6: pre-validation rejects the whole unit.
#[tokio::test]
async fn prevalidation_failure_uploads_nothing() {
    let h = harness();
    h.transport.add_file("f1", vec![1u8; 64]);
    h.transport.add_file("f3", vec![3u8; 64]);
    let over_cap = IngestConfig::default().max_file_bytes() + 1;

    let album = unit(
        7,
        42,
        vec![
            photo_item(1, 42, "f1", "u1", 64),
            photo_item(2, 43, "f2", "u2", over_cap),
            photo_item(3, 44, "f3", "u3", 64),
        ],
    );
    let report = h.pipeline.process_unit(&album).await.unwrap();
    match report {
        IngestReport::Rejected { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].ordinal, 2);
            assert_eq!(failures[0].reason, SkipReason::OversizeConfigured);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    // No uploads, no artifact.
    assert_eq!(h.store.object_count(), 0);
}

// Scenario 6 / P5: quota gate refuses admission.
#[tokio::test]
async fn quota_full_refuses_everything() {
    let h = harness_with(true, Some(100));
    h.store
        .put_bytes("existing", bytes::Bytes::from(vec![0u8; 100]), None)
        .await
        .unwrap();
    h.quota.refresh().await.unwrap();

    h.transport.add_file("f1", vec![1u8; 64]);
    let report = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 64)]))
        .await
        .unwrap();
    match report {
        IngestReport::Refused { reason } => assert_eq!(reason, "quota_full"),
        other => panic!("expected Refused, got {other:?}"),
    }
    // Only the pre-existing object remains.
    assert_eq!(h.store.object_count(), 1);
}

// Transient upload failures retry and then succeed.
#[tokio::test(start_paused = true)]
async fn transient_upload_failure_is_retried() {
    let h = harness();
    h.transport.add_file("f1", vec![1u8; 64]);
    h.store.fail_next_puts(2);

    let report = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 64)]))
        .await
        .unwrap();
    match report {
        IngestReport::Archived { receipt, .. } => {
            assert!(receipt.outcomes[0].is_stored());
        }
        other => panic!("expected Archived, got {other:?}"),
    }
}

// Upload failing every attempt marks the item failed but commits the rest.
#[tokio::test(start_paused = true)]
async fn exhausted_upload_retries_fail_item_not_unit() {
    let h = harness();
    h.transport.add_file("f1", vec![1u8; 64]);
    h.transport.add_file("f2", vec![2u8; 64]);
    // First item's three attempts all fail; second item succeeds.
    h.store.fail_next_puts(3);

    let mut album = unit(
        7,
        42,
        vec![
            photo_item(1, 42, "f1", "u1", 64),
            photo_item(2, 43, "f2", "u2", 64),
        ],
    );
    album.media_group_id = Some("G".to_string());

    let report = h.pipeline.process_unit(&album).await.unwrap();
    let receipt = match report {
        IngestReport::Archived { receipt, .. } => receipt,
        other => panic!("expected Archived, got {other:?}"),
    };
    assert!(matches!(
        receipt.outcomes[0].disposition,
        Disposition::Failed { .. }
    ));
    assert!(receipt.outcomes[1].is_stored());

    // The artifact lists only the stored key.
    let json = artifact_json(&h.store, &receipt.base_path);
    assert_eq!(json["keys"].as_array().unwrap().len(), 1);
}

// Dedup conflict: existing record wins, fresh upload is discarded.
#[tokio::test]
async fn dedup_conflict_discards_fresh_upload() {
    let h = harness_with(false, None); // lookups off, registration on
    let payload = vec![9u8; 128];
    h.transport.add_file("f1", payload.clone());

    // Seed the index with the same content under another key.
    let sha = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(&payload))
    };
    use teltubby_core::traits::DedupIndex;
    h.dedup
        .register(
            teltubby_core::traits::FileRecord {
                sha256: sha,
                s3_key: "teltubby/earlier/key.jpg".to_string(),
                size_bytes: 128,
                mime: None,
                created_at: "2026-01-01T00:00:00Z".to_string(),
            },
            None,
        )
        .await
        .unwrap();

    let report = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 128)]))
        .await
        .unwrap();
    let receipt = match report {
        IngestReport::Archived { receipt, .. } => receipt,
        other => panic!("expected Archived, got {other:?}"),
    };
    match &receipt.outcomes[0].disposition {
        Disposition::Duplicate { of, reason } => {
            assert_eq!(of, "teltubby/earlier/key.jpg");
            assert_eq!(*reason, DedupReason::Sha256);
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }
    // The conflicting fresh upload was deleted; only message.json remains.
    let binaries = h
        .store
        .keys()
        .into_iter()
        .filter(|k| !k.ends_with("message.json"))
        .count();
    assert_eq!(binaries, 0);
}

// Metadata write failure is fatal for the unit; uploads stand.
#[tokio::test(start_paused = true)]
async fn metadata_write_failure_keeps_uploads() {
    let h = harness();
    h.transport.add_file("f1", vec![1u8; 64]);
    h.store.fail_next_bytes_puts(3);

    let err = h
        .pipeline
        .process_unit(&unit(7, 42, vec![photo_item(1, 42, "f1", "u1", 64)]))
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::MetadataWrite { .. }));

    // The uploaded binary is not rolled back and its dedup record stands.
    assert_eq!(h.store.object_count(), 1);
    assert_eq!(h.dedup.record_count(), 1);
    assert!(h.store.keys()[0].ends_with(".jpg"));
}

// Units without media are dropped.
#[tokio::test]
async fn unit_without_media_is_dropped() {
    let h = harness();
    let report = h.pipeline.process_unit(&unit(7, 42, vec![])).await.unwrap();
    assert!(matches!(report, IngestReport::Dropped));
}

// Enqueue failure surfaces per item without failing the unit.
#[tokio::test]
async fn enqueue_failure_is_reported_per_item() {
    let h = harness();
    h.intake.fail_enqueues(true);
    let mut big = photo_item(1, 42, "f1", "u1", 80 * 1024 * 1024);
    big.kind = MediaKind::Video;

    let report = h.pipeline.process_unit(&unit(7, 42, vec![big])).await.unwrap();
    match report {
        IngestReport::QueuedOnly { queued } => {
            assert_eq!(queued[0].job_id, None);
            assert_eq!(queued[0].error.as_deref(), Some("enqueue_failed"));
        }
        other => panic!("expected QueuedOnly, got {other:?}"),
    }
}
