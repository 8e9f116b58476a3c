// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Size router: classify an item as inline (bot path) or oversize
//! (queue path).
//!
//! The declared size hint is untrusted; probing the transport is the
//! authoritative signal. Probes are metadata-only and idempotent.

use teltubby_core::traits::{BotTransport, RemoteFile};
use teltubby_core::types::MediaItem;
use teltubby_core::ArchiveError;
use tracing::debug;

/// Routing decision for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fetchable over the bot path; carries the probed descriptor so the
    /// pipeline does not probe twice.
    Inline(RemoteFile),
    /// Above the inline limit; handed to the durable job queue.
    Queue,
}

/// Route one item.
///
/// The hint short-circuits obvious oversize items; everything else is
/// probed, and a transport "too big" refusal reroutes to the queue.
pub async fn route_item(
    transport: &dyn BotTransport,
    item: &MediaItem,
    inline_limit_bytes: u64,
) -> Result<Route, ArchiveError> {
    if let Some(hint) = item.size_hint
        && hint > inline_limit_bytes
    {
        debug!(
            ordinal = item.ordinal,
            hint, inline_limit_bytes, "size hint above inline limit, routing to queue"
        );
        return Ok(Route::Queue);
    }

    match transport.probe(&item.file_id).await {
        Ok(remote) => Ok(Route::Inline(remote)),
        Err(ArchiveError::FetchTooBig) => {
            debug!(ordinal = item.ordinal, "transport refused handle, routing to queue");
            Ok(Route::Queue)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teltubby_core::types::MediaKind;
    use teltubby_test_utils::ScriptedBotTransport;

    const INLINE_LIMIT: u64 = 50 * 1024 * 1024;

    fn item(file_id: &str, size_hint: Option<u64>) -> MediaItem {
        MediaItem {
            ordinal: 1,
            source_message_id: 42,
            kind: MediaKind::Video,
            file_id: file_id.to_string(),
            file_unique_id: format!("uid-{file_id}"),
            mime_type: Some("video/mp4".into()),
            size_hint,
            width: None,
            height: None,
            duration: None,
            file_name: None,
        }
    }

    #[tokio::test]
    async fn hint_above_limit_routes_to_queue_without_probing() {
        let transport = ScriptedBotTransport::new();
        // Deliberately unknown to the transport: the hint decides alone.
        let route = route_item(&transport, &item("f", Some(INLINE_LIMIT + 1)), INLINE_LIMIT)
            .await
            .unwrap();
        assert_eq!(route, Route::Queue);
    }

    #[tokio::test]
    async fn hint_exactly_at_limit_stays_inline() {
        let transport = ScriptedBotTransport::new();
        transport.add_file("f", vec![0u8; 16]);
        let route = route_item(&transport, &item("f", Some(INLINE_LIMIT)), INLINE_LIMIT)
            .await
            .unwrap();
        assert!(matches!(route, Route::Inline(_)));
    }

    #[tokio::test]
    async fn transport_refusal_overrides_small_hint() {
        let transport = ScriptedBotTransport::new();
        transport.add_too_big("f", 1024);
        // The hint lies below the limit; the probe is authoritative.
        let route = route_item(&transport, &item("f", Some(1024)), INLINE_LIMIT)
            .await
            .unwrap();
        assert_eq!(route, Route::Queue);
    }

    #[tokio::test]
    async fn missing_hint_probes_and_stays_inline() {
        let transport = ScriptedBotTransport::new();
        transport.add_file("f", vec![0u8; 16]);
        let route = route_item(&transport, &item("f", None), INLINE_LIMIT).await.unwrap();
        match route {
            Route::Inline(remote) => assert_eq!(remote.size, 16),
            other => panic!("expected inline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_errors_propagate() {
        let transport = ScriptedBotTransport::new();
        let err = route_item(&transport, &item("missing", None), INLINE_LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Transport { .. }));
    }
}
