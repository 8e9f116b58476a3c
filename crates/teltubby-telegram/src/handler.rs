// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message filtering and fragment extraction.
//!
//! Determines whether an incoming Telegram message should be processed
//! (whitelisted curator, DM only), then converts it into a transport-
//! agnostic [`MessageUnit`] fragment for the album aggregator.

use teloxide::prelude::*;
use teloxide::types::{ChatKind, MessageOrigin};
use teltubby_core::types::{ChatRef, ForwardOrigin, MessageUnit, SenderRef};
use tracing::warn;

use crate::media;

/// Whether the sender is a whitelisted curator.
///
/// An empty whitelist rejects everyone (secure default). Messages
/// without a sender (channel posts) always return `false`.
pub fn is_whitelisted(msg: &Message, whitelist_ids: &[i64]) -> bool {
    if whitelist_ids.is_empty() {
        return false;
    }
    match msg.from.as_ref() {
        Some(user) => whitelist_ids.contains(&(user.id.0 as i64)),
        None => false,
    }
}

/// Whether the message is from a private (DM) chat.
///
/// Group, supergroup, and channel messages return `false`.
pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

/// Convert a Telegram message into an aggregator fragment.
///
/// Returns `None` when the message carries nothing archivable (plain
/// text, service messages). A fragment holds at most one media item;
/// albums are merged downstream.
pub fn to_fragment(msg: &Message) -> Option<MessageUnit> {
    let item = media::extract_item(msg)?;

    let sender = msg
        .from
        .as_ref()
        .map(|user| SenderRef {
            id: user.id.0 as i64,
            username: user.username.clone(),
        })
        .unwrap_or(SenderRef {
            id: 0,
            username: None,
        });

    let caption_entities = msg
        .caption_entities()
        .map(entities_to_values)
        .unwrap_or_default();
    let entities = msg.entities().map(entities_to_values).unwrap_or_default();

    Some(MessageUnit {
        chat: ChatRef {
            id: msg.chat.id.0,
            username: msg.chat.username().map(String::from),
            title: msg.chat.title().map(String::from),
        },
        message_id: msg.id.0 as i64,
        media_group_id: msg.media_group_id().map(String::from),
        sender,
        timestamp: msg.date,
        caption: msg.caption().map(String::from),
        caption_entities,
        entities,
        forward_origin: msg.forward_origin().map(to_forward_origin),
        items: vec![item],
        notes: None,
    })
}

/// Resolve the forward origin into slugging fields plus the raw snapshot.
fn to_forward_origin(origin: &MessageOrigin) -> ForwardOrigin {
    let raw = serde_json::to_value(origin).unwrap_or_else(|e| {
        warn!(error = %e, "forward origin serialization failed");
        serde_json::Value::Null
    });

    match origin {
        MessageOrigin::Channel { chat, .. } => ForwardOrigin {
            username: chat.username().map(String::from),
            title: chat.title().map(String::from),
            chat_id: Some(chat.id.0),
            raw,
        },
        MessageOrigin::Chat { sender_chat, .. } => ForwardOrigin {
            username: sender_chat.username().map(String::from),
            title: sender_chat.title().map(String::from),
            chat_id: Some(sender_chat.id.0),
            raw,
        },
        MessageOrigin::User { sender_user, .. } => ForwardOrigin {
            username: sender_user.username.clone(),
            title: None,
            chat_id: Some(sender_user.id.0 as i64),
            raw,
        },
        MessageOrigin::HiddenUser {
            sender_user_name, ..
        } => ForwardOrigin {
            username: None,
            title: Some(sender_user_name.clone()),
            chat_id: None,
            raw,
        },
    }
}

fn entities_to_values(entities: &[teloxide::types::MessageEntity]) -> Vec<serde_json::Value> {
    entities
        .iter()
        .filter_map(|entity| serde_json::to_value(entity).ok())
        .collect()
}
