// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Curator and admin commands.
//!
//! Only `/retry`, `/cancel`, and `/db_maint` alter core state; the rest
//! are read-only views over the job table and the quota gate.

use std::str::FromStr;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teltubby_core::traits::{DedupIndex, JobPublisher};
use teltubby_core::ArchiveError;
use tracing::info;
use uuid::Uuid;

use crate::format;
use crate::BotDeps;

/// Recognized commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Quota,
    DbMaint,
    Jobs,
    Job(String),
    Retry(String),
    Cancel(String),
}

/// Parse a message text into a command, if it is one.
pub fn parse(text: Option<&str>) -> Option<Command> {
    let text = text?.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    // Strip a bot mention suffix like /status@teltubby_bot.
    let name = head.trim_start_matches('/').split('@').next()?;
    let arg = parts.next().map(String::from);

    match (name, arg) {
        ("start" | "help", _) => Some(Command::Start),
        ("status", _) => Some(Command::Status),
        ("quota", _) => Some(Command::Quota),
        ("db_maint", _) => Some(Command::DbMaint),
        ("jobs", _) => Some(Command::Jobs),
        ("job", Some(id)) => Some(Command::Job(id)),
        ("retry", Some(id)) => Some(Command::Retry(id)),
        ("cancel", Some(id)) => Some(Command::Cancel(id)),
        _ => None,
    }
}

/// Execute a command and reply in the originating chat.
pub async fn handle(
    bot: &Bot,
    msg: &Message,
    command: Command,
    deps: &BotDeps,
) -> Result<(), ArchiveError> {
    let text = match command {
        Command::Start => format::format_start(),
        Command::Status => {
            let depth = deps.publisher.queue_depth().await.ok();
            format::format_status(deps.quota.used_ratio(), depth)
        }
        Command::Quota => format::format_quota(deps.quota.used_ratio()),
        Command::DbMaint => {
            deps.dedup.vacuum().await?;
            info!("dedup index vacuumed by admin command");
            format::format_db_maint()
        }
        Command::Jobs => {
            let rows = deps.jobs.list_recent(10).await?;
            if rows.is_empty() {
                "📊 No large-file jobs recorded.".to_string()
            } else {
                let mut lines = vec!["📊 *Recent large-file jobs*".to_string(), String::new()];
                for row in rows {
                    lines.push(format!("• `{}` — {}", row.job_id, row.state));
                }
                lines.join("\n")
            }
        }
        Command::Job(id) => match parse_job_id(&id) {
            Err(reply) => reply,
            Ok(job_id) => match deps.jobs.get(job_id).await? {
                None => format!("❓ Unknown job `{job_id}`."),
                Some(row) => {
                    let mut lines = vec![
                        format!("📦 *Job* `{}`", row.job_id),
                        String::new(),
                        format!("• state: {}", row.state),
                        format!("• retries: {}/{}", row.retry_count, row.max_retries),
                        format!("• created: {}", row.created_at),
                        format!("• updated: {}", row.updated_at),
                    ];
                    if let Some(error) = row.last_error {
                        lines.push(format!("• last error: {error}"));
                    }
                    lines.join("\n")
                }
            },
        },
        Command::Retry(id) => match parse_job_id(&id) {
            Err(reply) => reply,
            Ok(job_id) => match deps.jobs.retry(job_id).await {
                Ok(row) => format!("🔄 Job `{}` re-queued (state: {}).", row.job_id, row.state),
                Err(ArchiveError::InvalidJobTransition { from, .. }) => {
                    format!("❌ Job `{job_id}` cannot be retried from state {from}.")
                }
                Err(e) => return Err(e),
            },
        },
        Command::Cancel(id) => match parse_job_id(&id) {
            Err(reply) => reply,
            Ok(job_id) => match deps.jobs.cancel(job_id).await {
                Ok(row) => format!("🛑 Job `{}` is now {}.", row.job_id, row.state),
                Err(ArchiveError::InvalidJobTransition { from, .. }) => {
                    format!("❌ Job `{job_id}` cannot be cancelled from state {from}.")
                }
                Err(e) => return Err(e),
            },
        },
    };

    reply(bot, msg, &text).await
}

fn parse_job_id(raw: &str) -> Result<Uuid, String> {
    Uuid::from_str(raw).map_err(|_| format!("❓ `{raw}` is not a valid job id."))
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> Result<(), ArchiveError> {
    let escaped = format::escape_markdown(text);
    let sent = bot
        .send_message(msg.chat.id, &escaped)
        .parse_mode(ParseMode::MarkdownV2)
        .await;
    if sent.is_err() {
        bot.send_message(msg.chat.id, text)
            .await
            .map_err(|e| ArchiveError::Transport {
                message: format!("failed to send reply: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse(Some("/start")), Some(Command::Start));
        assert_eq!(parse(Some("/help")), Some(Command::Start));
        assert_eq!(parse(Some("/status")), Some(Command::Status));
        assert_eq!(parse(Some("/quota")), Some(Command::Quota));
        assert_eq!(parse(Some("/db_maint")), Some(Command::DbMaint));
        assert_eq!(parse(Some("/jobs")), Some(Command::Jobs));
        assert_eq!(
            parse(Some("/retry 0193e07c-0000-7000-8000-000000000000")),
            Some(Command::Retry("0193e07c-0000-7000-8000-000000000000".into()))
        );
        assert_eq!(parse(Some("/cancel abc")), Some(Command::Cancel("abc".into())));
    }

    #[test]
    fn strips_bot_mention_suffix() {
        assert_eq!(parse(Some("/status@teltubby_bot")), Some(Command::Status));
    }

    #[test]
    fn non_commands_pass_through() {
        assert_eq!(parse(Some("hello")), None);
        assert_eq!(parse(None), None);
        assert_eq!(parse(Some("/retry")), None); // missing argument
        assert_eq!(parse(Some("/unknown")), None);
    }

    #[test]
    fn job_id_parsing_reports_bad_input() {
        assert!(parse_job_id("not-a-uuid").is_err());
        assert!(parse_job_id("0193e07c-0000-7000-8000-000000000000").is_ok());
    }
}
