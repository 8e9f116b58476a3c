// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media item extraction from Telegram messages.
//!
//! Maps each supported attachment type onto a [`MediaItem`], keeping the
//! transport file handles for later fetching. Nothing is downloaded here.

use teloxide::types::{Message, PhotoSize, StickerFormat};
use teltubby_core::types::{MediaItem, MediaKind};

/// Pick the media payload out of a message, if any.
///
/// Photos come in several sizes; the largest wins. Returns `None` for
/// text and service messages.
pub fn extract_item(msg: &Message) -> Option<MediaItem> {
    let message_id = msg.id.0 as i64;

    if let Some(photos) = msg.photo() {
        let largest = pick_largest_photo(photos)?;
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Photo,
            file_id: largest.file.id.clone(),
            file_unique_id: largest.file.unique_id.clone(),
            mime_type: Some("image/jpeg".to_string()),
            size_hint: Some(largest.file.size as u64),
            width: Some(largest.width),
            height: Some(largest.height),
            duration: None,
            file_name: None,
        });
    }

    if let Some(doc) = msg.document() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Document,
            file_id: doc.file.id.clone(),
            file_unique_id: doc.file.unique_id.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
            size_hint: Some(doc.file.size as u64),
            width: None,
            height: None,
            duration: None,
            file_name: doc.file_name.clone(),
        });
    }

    if let Some(video) = msg.video() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Video,
            file_id: video.file.id.clone(),
            file_unique_id: video.file.unique_id.clone(),
            mime_type: video.mime_type.as_ref().map(|m| m.to_string()),
            size_hint: Some(video.file.size as u64),
            width: Some(video.width),
            height: Some(video.height),
            duration: Some(video.duration.seconds() as f64),
            file_name: video.file_name.clone(),
        });
    }

    if let Some(audio) = msg.audio() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Audio,
            file_id: audio.file.id.clone(),
            file_unique_id: audio.file.unique_id.clone(),
            mime_type: audio.mime_type.as_ref().map(|m| m.to_string()),
            size_hint: Some(audio.file.size as u64),
            width: None,
            height: None,
            duration: Some(audio.duration.seconds() as f64),
            file_name: audio.file_name.clone(),
        });
    }

    if let Some(voice) = msg.voice() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Voice,
            file_id: voice.file.id.clone(),
            file_unique_id: voice.file.unique_id.clone(),
            mime_type: voice.mime_type.as_ref().map(|m| m.to_string()),
            size_hint: Some(voice.file.size as u64),
            width: None,
            height: None,
            duration: Some(voice.duration.seconds() as f64),
            file_name: None,
        });
    }

    if let Some(animation) = msg.animation() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Animation,
            file_id: animation.file.id.clone(),
            file_unique_id: animation.file.unique_id.clone(),
            mime_type: animation.mime_type.as_ref().map(|m| m.to_string()),
            size_hint: Some(animation.file.size as u64),
            width: Some(animation.width),
            height: Some(animation.height),
            duration: Some(animation.duration.seconds() as f64),
            file_name: animation.file_name.clone(),
        });
    }

    if let Some(note) = msg.video_note() {
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::VideoNote,
            file_id: note.file.id.clone(),
            file_unique_id: note.file.unique_id.clone(),
            mime_type: None,
            size_hint: Some(note.file.size as u64),
            width: Some(note.length),
            height: Some(note.length),
            duration: Some(note.duration.seconds() as f64),
            file_name: None,
        });
    }

    if let Some(sticker) = msg.sticker() {
        // Static stickers are webp; video stickers are webm.
        let file_name = match sticker.format() {
            StickerFormat::Video => Some("sticker.webm".to_string()),
            _ => Some("sticker.webp".to_string()),
        };
        return Some(MediaItem {
            ordinal: 0,
            source_message_id: message_id,
            kind: MediaKind::Sticker,
            file_id: sticker.file.id.clone(),
            file_unique_id: sticker.file.unique_id.clone(),
            mime_type: None,
            size_hint: Some(sticker.file.size as u64),
            width: Some(sticker.width as u32),
            height: Some(sticker.height as u32),
            duration: None,
            file_name,
        });
    }

    None
}

/// Telegram provides multiple photo sizes; take the one with the largest
/// pixel area.
fn pick_largest_photo(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| p.width as u64 * p.height as u64)
}
