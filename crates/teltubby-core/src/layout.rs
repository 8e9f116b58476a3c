// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic bucket layout: key prefixes, filenames, and slugging.
//!
//! Everything here is a pure function of the message context, so the
//! inline pipeline and the queue worker produce identical keys for the
//! same unit (across runs and across processes).

use chrono::{DateTime, Utc};

use crate::types::{MediaItem, MessageUnit};

/// Maximum filename length, in characters.
pub const MAX_FILENAME_LEN: usize = 120;

/// Maximum full key length, in characters.
pub const MAX_KEY_LEN: usize = 512;

/// Number of caption words included in the filename snippet.
const CAPTION_SNIPPET_WORDS: usize = 6;

/// Top-level bucket directory all archive keys live under.
const ARCHIVE_ROOT: &str = "teltubby";

/// Transliterate to ASCII and reduce to the safe charset `[a-z0-9._-]`.
///
/// Spaces and any other character become `-`; runs of `-` collapse;
/// leading and trailing `-` are trimmed.
pub fn safe_slug(text: &str) -> String {
    let translit = deunicode::deunicode(text);
    let mut out = String::with_capacity(translit.len());
    let mut last_dash = true; // trims leading dashes
    for ch in translit.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' || ch == '_' {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// First `CAPTION_SNIPPET_WORDS` words of the transliterated caption,
/// joined with `-` and slugged. Empty when there is no caption.
pub fn caption_snippet(caption: Option<&str>) -> String {
    let Some(caption) = caption else {
        return String::new();
    };
    let translit = deunicode::deunicode(caption);
    let words: Vec<&str> = translit
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .take(CAPTION_SNIPPET_WORDS)
        .collect();
    if words.is_empty() {
        return String::new();
    }
    safe_slug(&words.join("-"))
}

/// Slug source for the unit: forward-origin chat username or title,
/// falling back to the curator's username or numeric chat id when the
/// origin is hidden.
pub fn chat_slug(unit: &MessageUnit) -> String {
    let source = unit
        .forward_origin
        .as_ref()
        .and_then(|origin| {
            origin
                .username
                .clone()
                .or_else(|| origin.title.clone())
                .or_else(|| origin.chat_id.map(|id| id.to_string()))
        })
        .or_else(|| unit.chat.username.clone())
        .unwrap_or_else(|| unit.chat.id.to_string());
    safe_slug(&source)
}

/// Key prefix for a unit: `teltubby/{YYYY}/{MM}/{chat_slug}/{message_id}/`.
pub fn build_prefix(ts: DateTime<Utc>, chat_slug: &str, message_id: i64) -> String {
    format!(
        "{ARCHIVE_ROOT}/{}/{}/{chat_slug}/{message_id}/",
        ts.format("%Y"),
        ts.format("%m"),
    )
}

/// Per-item filename:
/// `YYYYMMDD-HHMMSS_{chat}_{sender}_m{message_id}[-g{group_id}]_{NNN}_{snippet}.{ext}`
/// truncated from the end of the base to fit [`MAX_FILENAME_LEN`].
#[allow(clippy::too_many_arguments)]
pub fn build_filename(
    ts: DateTime<Utc>,
    chat_or_source: &str,
    sender: &str,
    message_id: i64,
    media_group_id: Option<&str>,
    ordinal: u32,
    caption: Option<&str>,
    ext: &str,
) -> String {
    let stamp = ts.format("%Y%m%d-%H%M%S");
    let chat_part = safe_slug(chat_or_source);
    let sender_part = if sender.is_empty() {
        "unknown".to_string()
    } else {
        safe_slug(sender)
    };
    let group_part = media_group_id
        .map(|g| format!("-g{g}"))
        .unwrap_or_default();
    let mut base = format!("{stamp}_{chat_part}_{sender_part}_m{message_id}{group_part}_{ordinal:03}");
    let snippet = caption_snippet(caption);
    if !snippet.is_empty() {
        base.push('_');
        base.push_str(&snippet);
    }
    clamp_name(base, ext, MAX_FILENAME_LEN)
}

/// Full key for an item, truncating the filename base further if the key
/// would exceed [`MAX_KEY_LEN`].
pub fn build_key(prefix: &str, filename: &str) -> String {
    let key = format!("{prefix}{filename}");
    if key.chars().count() <= MAX_KEY_LEN {
        return key;
    }
    let budget = MAX_KEY_LEN.saturating_sub(prefix.chars().count());
    let (base, ext) = match filename.rsplit_once('.') {
        Some((base, ext)) => (base.to_string(), ext),
        None => (filename.to_string(), ""),
    };
    format!("{prefix}{}", clamp_name(base, ext, budget))
}

/// File extension for an item: taken verbatim from the transport filename
/// when present (even if inconsistent with the declared MIME), otherwise
/// the kind's default.
pub fn item_ext(item: &MediaItem) -> String {
    item.file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_string()))
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| item.kind.default_ext().to_string())
}

/// Truncate `base` so `{base}.{ext}` fits in `limit` characters.
fn clamp_name(mut base: String, ext: &str, limit: usize) -> String {
    let suffix_len = 1 + ext.chars().count();
    let name_len = base.chars().count() + suffix_len;
    if name_len > limit {
        let keep = limit.saturating_sub(suffix_len);
        base = base.chars().take(keep).collect();
    }
    format!("{base}.{ext}")
}
