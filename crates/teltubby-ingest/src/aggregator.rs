// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Album aggregation with a per-group timeout window.
//!
//! Items of a media group arrive as separate messages within a narrow
//! time window and must be committed as a single unit with stable
//! ordinals, without waiting indefinitely. Each open group owns a timer
//! task; a bucket seals when the window elapses or the sentinel maximum
//! is reached. Late arrivals after close form a new unit whose `notes`
//! records the fragmentation; buckets are never merged after the fact.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use teltubby_core::types::MessageUnit;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a closed group key is remembered for late-fragment detection,
/// as a multiple of the window.
const RECENT_CLOSE_TTL_WINDOWS: u32 = 5;

type GroupKey = (i64, String);

struct Bucket {
    fragments: Vec<MessageUnit>,
    /// Monotonic arrival counter per fragment, the ordering tie-breaker.
    arrivals: Vec<u64>,
    late_fragment: bool,
}

struct Inner {
    buckets: HashMap<GroupKey, Bucket>,
    recently_closed: HashMap<GroupKey, Instant>,
    arrival_counter: u64,
}

/// Groups message fragments of one media group into a single unit.
///
/// Fragments without a group id pass through immediately as their own
/// unit. Multiple groups aggregate in parallel; within one group,
/// mutations are serialized by the inner lock.
pub struct AlbumAggregator {
    window: Duration,
    max_items: usize,
    inner: Arc<Mutex<Inner>>,
    out: mpsc::Sender<MessageUnit>,
}

impl AlbumAggregator {
    pub fn new(window: Duration, max_items: usize, out: mpsc::Sender<MessageUnit>) -> Self {
        Self {
            window,
            max_items: max_items.max(1),
            inner: Arc::new(Mutex::new(Inner {
                buckets: HashMap::new(),
                recently_closed: HashMap::new(),
                arrival_counter: 0,
            })),
            out,
        }
    }

    /// Feed one incoming fragment (a single message, carrying at most one
    /// media item). Units ready for processing are emitted downstream.
    pub async fn submit(&self, fragment: MessageUnit) {
        let Some(group_id) = fragment.media_group_id.clone() else {
            self.emit(fragment).await;
            return;
        };
        let key: GroupKey = (fragment.chat.id, group_id);

        let sealed = {
            let mut inner = self.inner.lock().await;
            inner.arrival_counter += 1;
            let arrival = inner.arrival_counter;

            // Purge stale close markers so the map stays bounded.
            let ttl = self.window * RECENT_CLOSE_TTL_WINDOWS;
            let now = Instant::now();
            inner
                .recently_closed
                .retain(|_, closed_at| now.duration_since(*closed_at) < ttl);

            let is_new = !inner.buckets.contains_key(&key);
            if is_new {
                let late = inner.recently_closed.contains_key(&key);
                if late {
                    info!(
                        chat_id = key.0,
                        group_id = %key.1,
                        "late album fragment after close, starting a fresh unit"
                    );
                }
                inner.buckets.insert(
                    key.clone(),
                    Bucket {
                        fragments: Vec::new(),
                        arrivals: Vec::new(),
                        late_fragment: late,
                    },
                );
                self.spawn_timer(key.clone());
            }

            let Some(bucket) = inner.buckets.get_mut(&key) else {
                return;
            };
            bucket.fragments.push(fragment);
            bucket.arrivals.push(arrival);
            debug!(
                chat_id = key.0,
                group_id = %key.1,
                items = bucket.fragments.len(),
                "album fragment buffered"
            );

            if bucket.fragments.len() >= self.max_items {
                debug!(group_id = %key.1, "album reached sentinel size, sealing early");
                Self::take_sealed(&mut inner, &key)
            } else {
                None
            }
        };

        if let Some(unit) = sealed {
            self.emit(unit).await;
        }
    }

    /// Seal and emit every open bucket. Called on shutdown so buffered
    /// albums are not lost.
    pub async fn flush_all(&self) {
        let sealed: Vec<MessageUnit> = {
            let mut inner = self.inner.lock().await;
            let keys: Vec<GroupKey> = inner.buckets.keys().cloned().collect();
            keys.iter()
                .filter_map(|key| Self::take_sealed(&mut inner, key))
                .collect()
        };
        for unit in sealed {
            self.emit(unit).await;
        }
    }

    fn spawn_timer(&self, key: GroupKey) {
        let inner = Arc::clone(&self.inner);
        let out = self.out.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let sealed = {
                let mut guard = inner.lock().await;
                Self::take_sealed(&mut guard, &key)
            };
            if let Some(unit) = sealed {
                if out.send(unit).await.is_err() {
                    warn!("unit channel closed, dropping sealed album");
                }
            }
        });
    }

    /// Remove the bucket for `key` and seal it into a unit, recording the
    /// close time for late-fragment detection.
    fn take_sealed(inner: &mut Inner, key: &GroupKey) -> Option<MessageUnit> {
        let bucket = inner.buckets.remove(key)?;
        inner.recently_closed.insert(key.clone(), Instant::now());
        seal(bucket)
    }

    async fn emit(&self, mut unit: MessageUnit) {
        // Ordinals for single-message units.
        for (idx, item) in unit.items.iter_mut().enumerate() {
            item.ordinal = (idx + 1) as u32;
        }
        if self.out.send(unit).await.is_err() {
            warn!("unit channel closed, dropping unit");
        }
    }
}

/// Merge a bucket's fragments into one unit.
///
/// Ordinals reflect transport sequence (message id) within the group;
/// ties are broken by the arrival counter.
fn seal(bucket: Bucket) -> Option<MessageUnit> {
    let Bucket {
        fragments,
        arrivals,
        late_fragment,
    } = bucket;
    if fragments.is_empty() {
        return None;
    }

    let mut ordered: Vec<(MessageUnit, u64)> = fragments.into_iter().zip(arrivals).collect();
    ordered.sort_by_key(|(fragment, arrival)| (fragment.message_id, *arrival));

    let mut iter = ordered.into_iter();
    let (mut head, _) = iter.next()?;

    for (fragment, _) in iter {
        if head.caption.is_none() {
            head.caption = fragment.caption.clone();
            head.caption_entities = fragment.caption_entities.clone();
        }
        head.items.extend(fragment.items);
    }

    for (idx, item) in head.items.iter_mut().enumerate() {
        item.ordinal = (idx + 1) as u32;
    }

    if late_fragment {
        head.notes = Some(
            "album fragment arrived after the aggregation window closed; archived as a separate unit"
                .to_string(),
        );
    }

    Some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use teltubby_core::types::{ChatRef, MediaItem, MediaKind, SenderRef};
    use tokio::time::{advance, Duration};

    fn fragment(message_id: i64, group: Option<&str>, uid: &str) -> MessageUnit {
        MessageUnit {
            chat: ChatRef {
                id: 7,
                username: Some("curator".into()),
                title: None,
            },
            message_id,
            media_group_id: group.map(String::from),
            sender: SenderRef {
                id: 9,
                username: None,
            },
            timestamp: Utc::now(),
            caption: None,
            caption_entities: vec![],
            entities: vec![],
            forward_origin: None,
            items: vec![MediaItem {
                ordinal: 0,
                source_message_id: message_id,
                kind: MediaKind::Photo,
                file_id: format!("file-{uid}"),
                file_unique_id: uid.to_string(),
                mime_type: Some("image/jpeg".into()),
                size_hint: Some(1024),
                width: None,
                height: None,
                duration: None,
                file_name: None,
            }],
            notes: None,
        }
    }

    fn aggregator(window_secs: u64, max_items: usize) -> (AlbumAggregator, mpsc::Receiver<MessageUnit>) {
        let (tx, rx) = mpsc::channel(16);
        (
            AlbumAggregator::new(Duration::from_secs(window_secs), max_items, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn groupless_message_is_its_own_unit() {
        let (agg, mut rx) = aggregator(2, 10);
        agg.submit(fragment(1, None, "u1")).await;
        let unit = rx.recv().await.unwrap();
        assert_eq!(unit.message_id, 1);
        assert_eq!(unit.items.len(), 1);
        assert_eq!(unit.items[0].ordinal, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn album_seals_when_the_window_elapses() {
        let (agg, mut rx) = aggregator(2, 10);
        agg.submit(fragment(10, Some("G"), "u1")).await;
        agg.submit(fragment(11, Some("G"), "u2")).await;
        agg.submit(fragment(12, Some("G"), "u3")).await;

        // Nothing before the window.
        assert!(rx.try_recv().is_err());

        // Exactly at the window boundary the timer fires.
        advance(Duration::from_secs(2)).await;
        let unit = rx.recv().await.unwrap();
        assert_eq!(unit.message_id, 10);
        assert_eq!(unit.items.len(), 3);
        assert_eq!(
            unit.items.iter().map(|i| i.ordinal).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // Transport sequence, not arrival order.
        assert_eq!(unit.items[0].file_unique_id, "u1");
        assert_eq!(unit.items[2].file_unique_id, "u3");
        assert!(unit.notes.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ordinals_follow_message_ids_despite_arrival_order() {
        let (agg, mut rx) = aggregator(2, 10);
        agg.submit(fragment(12, Some("G"), "u3")).await;
        agg.submit(fragment(10, Some("G"), "u1")).await;
        agg.submit(fragment(11, Some("G"), "u2")).await;

        advance(Duration::from_secs(2)).await;
        let unit = rx.recv().await.unwrap();
        assert_eq!(
            unit.items
                .iter()
                .map(|i| i.file_unique_id.as_str())
                .collect::<Vec<_>>(),
            vec!["u1", "u2", "u3"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sentinel_maximum_seals_early() {
        let (agg, mut rx) = aggregator(60, 2);
        agg.submit(fragment(10, Some("G"), "u1")).await;
        agg.submit(fragment(11, Some("G"), "u2")).await;

        // Sealed without advancing time.
        let unit = rx.recv().await.unwrap();
        assert_eq!(unit.items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_fragment_forms_a_fresh_unit_with_notes() {
        let (agg, mut rx) = aggregator(2, 10);
        agg.submit(fragment(10, Some("G"), "u1")).await;
        advance(Duration::from_secs(2)).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.items.len(), 1);

        // Arrives after the bucket closed.
        agg.submit(fragment(11, Some("G"), "u2")).await;
        advance(Duration::from_secs(2)).await;
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message_id, 11);
        assert_eq!(second.items.len(), 1);
        assert!(second.notes.as_deref().unwrap().contains("separate unit"));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_groups_aggregate_in_parallel() {
        let (agg, mut rx) = aggregator(2, 10);
        agg.submit(fragment(10, Some("G1"), "a1")).await;
        agg.submit(fragment(20, Some("G2"), "b1")).await;
        agg.submit(fragment(11, Some("G1"), "a2")).await;

        advance(Duration::from_secs(2)).await;
        let mut units = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        units.sort_by_key(|u| u.message_id);
        assert_eq!(units[0].items.len(), 2);
        assert_eq!(units[1].items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_all_drains_open_buckets() {
        let (agg, mut rx) = aggregator(60, 10);
        agg.submit(fragment(10, Some("G"), "u1")).await;
        agg.flush_all().await;
        let unit = rx.recv().await.unwrap();
        assert_eq!(unit.items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caption_is_taken_from_first_captioned_fragment() {
        let (agg, mut rx) = aggregator(2, 10);
        let mut first = fragment(10, Some("G"), "u1");
        first.caption = None;
        let mut second = fragment(11, Some("G"), "u2");
        second.caption = Some("album caption".into());
        agg.submit(first).await;
        agg.submit(second).await;

        advance(Duration::from_secs(2)).await;
        let unit = rx.recv().await.unwrap();
        assert_eq!(unit.caption.as_deref(), Some("album caption"));
    }
}
