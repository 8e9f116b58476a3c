// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Curator-facing message formatting.
//!
//! Renders ingest reports, status, and quota responses as emoji-rich
//! Telegram messages, plus the MarkdownV2 escaping they need.

use std::collections::BTreeSet;

use teltubby_core::types::Disposition;
use teltubby_core::ArchiveError;
use teltubby_ingest::IngestReport;

/// Characters Telegram requires escaped in MarkdownV2 outside code spans.
const SPECIAL_CHARS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text for MarkdownV2, leaving inline code spans (`` ` ``)
/// untouched so object keys render verbatim.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut in_code = false;
    for ch in text.chars() {
        if ch == '`' {
            in_code = !in_code;
            out.push(ch);
        } else if !in_code && SPECIAL_CHARS.contains(&ch) {
            out.push('\\');
            out.push(ch);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Human-readable byte size.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < MIB {
        format!("{:.1} KB", b / KIB)
    } else if b < GIB {
        format!("{:.1} MB", b / MIB)
    } else {
        format!("{:.1} GB", b / GIB)
    }
}

/// Render an ingest report as the curator ack.
pub fn format_report(report: &IngestReport) -> String {
    match report {
        IngestReport::Dropped => "ℹ️ Nothing to archive in that message.".to_string(),
        IngestReport::Refused { .. } => format_quota_pause(),
        IngestReport::Rejected { failures } => {
            let mut lines = vec![
                "❌ *Submission rejected* ⚠️".to_string(),
                String::new(),
                "No files were uploaded:".to_string(),
            ];
            for failure in failures {
                lines.push(format!("• item {}: {}", failure.ordinal, failure.reason));
            }
            lines.join("\n")
        }
        IngestReport::QueuedOnly { queued } => {
            let mut lines = vec![
                "⏳ *Queued for background archiving* 📦".to_string(),
                String::new(),
            ];
            for entry in queued {
                match (&entry.job_id, &entry.error) {
                    (Some(job_id), _) => {
                        lines.push(format!("• item {}: job `{}`", entry.ordinal, job_id));
                    }
                    (None, Some(error)) => {
                        lines.push(format!("• item {}: ❌ {}", entry.ordinal, error));
                    }
                    (None, None) => {}
                }
            }
            lines.push(String::new());
            lines.push("You will be notified when each job completes.".to_string());
            lines.join("\n")
        }
        IngestReport::Archived { receipt, queued } => {
            let stored = receipt.outcomes.iter().filter(|o| o.is_stored()).count();
            let dedup_count = receipt.outcomes.iter().filter(|o| o.is_duplicate()).count();
            let skipped = receipt
                .outcomes
                .iter()
                .filter(|o| {
                    matches!(
                        o.disposition,
                        Disposition::Skipped { .. } | Disposition::Failed { .. }
                    )
                })
                .count();
            let media_types: BTreeSet<String> = receipt
                .outcomes
                .iter()
                .filter(|o| o.key.is_some())
                .map(|o| o.item.kind.to_string())
                .collect();

            let mut lines = vec![
                "✅ *Archive complete!* 📦".to_string(),
                String::new(),
                format!("📁 Files stored: {stored}"),
                format!(
                    "💾 Media types: {}",
                    media_types.into_iter().collect::<Vec<_>>().join(", ")
                ),
                format!("💾 Total size: {}", format_bytes(receipt.total_bytes_uploaded)),
                format!("☁️ Storage path: `{}`", receipt.base_path),
            ];
            if dedup_count > 0 {
                lines.push(format!("🔄 Duplicates skipped: {dedup_count}"));
            }
            if skipped > 0 {
                lines.push(format!("⏭️ Items skipped: {skipped}"));
            }
            if !queued.is_empty() {
                lines.push(format!("⏳ Items queued for background archiving: {}", queued.len()));
                for entry in queued {
                    if let Some(job_id) = &entry.job_id {
                        lines.push(format!("    • item {}: job `{}`", entry.ordinal, job_id));
                    }
                }
            }
            if let Some(notes) = &receipt.notes {
                lines.push(format!("ℹ️ {notes}"));
            }
            lines.push(format!("⏱️ Processing time: {:.2}s", receipt.elapsed_seconds));
            lines.join("\n")
        }
    }
}

/// Render a unit-level processing error.
pub fn format_unit_error(err: &ArchiveError) -> String {
    match err {
        ArchiveError::MetadataWrite { .. } => "❌ *Ingestion partially failed* ⚠️\n\n\
             Files were uploaded but the metadata commit failed (metadata_write_failed). \
             An operator needs to reconcile this unit."
            .to_string(),
        _ => format!(
            "❌ *Ingestion failed* ⚠️\n\nError kind: {}. Please try again.",
            err.kind()
        ),
    }
}

/// `/start` and `/help` response.
pub fn format_start() -> String {
    "🤖 *Welcome to teltubby!* 📦\n\n\
     Forward or copy messages to me in DM and I will archive the media \
     with deterministic filenames, JSON metadata, and deduplication.\n\n\
     Commands:\n\
     • /status — bot status and storage usage\n\
     • /quota — storage quota usage\n\
     • /jobs — recent large-file jobs\n\
     • /job <id> — job details\n\
     • /retry <id> — retry a failed job\n\
     • /cancel <id> — cancel a job\n\
     • /db_maint — database maintenance"
        .to_string()
}

/// `/status` response.
pub fn format_status(used_ratio: Option<f64>, queue_depth: Option<u32>) -> String {
    let usage = match used_ratio {
        Some(ratio) => {
            let pct = ratio * 100.0;
            let (emoji, label) = usage_severity(pct);
            format!("{emoji} {pct:.1}% ({label})")
        }
        None => "Unknown".to_string(),
    };
    let depth = match queue_depth {
        Some(depth) => depth.to_string(),
        None => "unavailable".to_string(),
    };
    format!(
        "🤖 *Teltubby status* ℹ️\n\n☁️ Storage usage: {usage}\n📊 Queued large-file jobs: {depth}"
    )
}

/// `/quota` response.
pub fn format_quota(used_ratio: Option<f64>) -> String {
    match used_ratio {
        None => "📊 Quota unknown (no bucket quota configured).".to_string(),
        Some(ratio) => {
            let pct = ratio * 100.0;
            let (emoji, label) = if pct >= 100.0 {
                ("❌", "FULL - ingestion paused")
            } else {
                usage_severity(pct)
            };
            format!(
                "📊 *Storage quota* {emoji}\n\n☁️ Bucket usage: {pct:.1}%\nℹ️ Status: {label}"
            )
        }
    }
}

/// Quota-pause refusal shown on submissions while the gate is closed.
pub fn format_quota_pause() -> String {
    "⚠️ *Ingestion paused* 💾\n\n\
     ❌ The storage bucket is at 100% capacity.\n\
     ℹ️ Free up space or raise the quota to resume archiving."
        .to_string()
}

/// `/db_maint` response.
pub fn format_db_maint() -> String {
    "🗄️ *Database maintenance* ✅\n\nVACUUM completed; the dedup index is compacted.".to_string()
}

fn usage_severity(pct: f64) -> (&'static str, &'static str) {
    if pct >= 90.0 {
        ("⚠️", "Critical")
    } else if pct >= 80.0 {
        ("⚠️", "High")
    } else if pct >= 60.0 {
        ("ℹ️", "Moderate")
    } else {
        ("✅", "Good")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teltubby_core::types::{
        DedupReason, ItemOutcome, MediaItem, MediaKind, SkipReason, UnitReceipt,
    };
    use teltubby_ingest::{ItemRejection, QueuedItem};

    fn outcome(ordinal: u32, disposition: Disposition, key: Option<&str>) -> ItemOutcome {
        ItemOutcome {
            item: MediaItem {
                ordinal,
                source_message_id: 42,
                kind: MediaKind::Photo,
                file_id: "f".into(),
                file_unique_id: "u".into(),
                mime_type: None,
                size_hint: None,
                width: None,
                height: None,
                duration: None,
                file_name: None,
            },
            size_bytes: Some(1024),
            sha256: None,
            key: key.map(String::from),
            disposition,
        }
    }

    fn receipt(outcomes: Vec<ItemOutcome>) -> UnitReceipt {
        UnitReceipt {
            bucket: "teltubby".into(),
            base_path: "teltubby/2024/08/chan/42/".into(),
            outcomes,
            total_bytes_uploaded: 1024,
            duplicate_of: None,
            dedup_reason: None,
            notes: None,
            elapsed_seconds: 0.42,
        }
    }

    #[test]
    fn escape_leaves_code_spans_alone() {
        let escaped = escape_markdown("path `a/b_c.jpg` done.");
        assert_eq!(escaped, "path `a/b_c.jpg` done\\.");
    }

    #[test]
    fn bytes_render_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(1_258_291), "1.2 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn archived_ack_lists_counts_and_path() {
        let ack = format_report(&IngestReport::Archived {
            receipt: receipt(vec![
                outcome(1, Disposition::Stored, Some("k1")),
                outcome(
                    2,
                    Disposition::Duplicate {
                        of: "k0".into(),
                        reason: DedupReason::Sha256,
                    },
                    Some("k0"),
                ),
            ]),
            queued: vec![],
        });
        assert!(ack.contains("Files stored: 1"));
        assert!(ack.contains("Duplicates skipped: 1"));
        assert!(ack.contains("`teltubby/2024/08/chan/42/`"));
        assert!(ack.contains("1.0 KB"));
    }

    #[test]
    fn rejection_lists_each_item_reason() {
        let ack = format_report(&IngestReport::Rejected {
            failures: vec![ItemRejection {
                ordinal: 2,
                reason: SkipReason::OversizeConfigured,
            }],
        });
        assert!(ack.contains("item 2: oversize_configured"));
        assert!(ack.contains("No files were uploaded"));
    }

    #[test]
    fn queued_ack_carries_job_ids() {
        let id = uuid::Uuid::new_v4();
        let ack = format_report(&IngestReport::QueuedOnly {
            queued: vec![QueuedItem {
                ordinal: 1,
                job_id: Some(id),
                error: None,
            }],
        });
        assert!(ack.contains(&id.to_string()));
    }

    #[test]
    fn quota_states_have_distinct_severities() {
        assert!(format_quota(None).contains("unknown"));
        assert!(format_quota(Some(0.5)).contains("Good"));
        assert!(format_quota(Some(0.85)).contains("High"));
        assert!(format_quota(Some(1.0)).contains("FULL"));
    }
}
