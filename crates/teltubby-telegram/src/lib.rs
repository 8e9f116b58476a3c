// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram bot surface for the teltubby archiver.
//!
//! Connects via long polling through teloxide, filters messages by
//! whitelist and chat type, extracts media fragments for the album
//! aggregator, answers curator and admin commands, and delivers acks
//! with MarkdownV2 formatting.

pub mod commands;
pub mod fetch;
pub mod format;
pub mod handler;
pub mod media;

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, Recipient};
use teltubby_config::model::TelegramConfig;
use teltubby_core::traits::{DedupIndex, JobPublisher, Notifier};
use teltubby_core::ArchiveError;
use teltubby_ingest::AlbumAggregator;
use teltubby_queue::JobManager;
use teltubby_store::QuotaGate;
use tracing::{debug, error, info, warn};

/// Collaborators the bot surface needs.
pub struct BotDeps {
    pub aggregator: Arc<AlbumAggregator>,
    pub jobs: Arc<JobManager>,
    pub dedup: Arc<dyn DedupIndex>,
    pub quota: Arc<QuotaGate>,
    pub publisher: Arc<dyn JobPublisher>,
}

/// The Telegram bot service.
///
/// Owns the teloxide [`Bot`] handle; the dispatcher task feeds media
/// fragments into the aggregator and answers commands inline.
pub struct TelegramService {
    bot: Bot,
    config: TelegramConfig,
}

impl TelegramService {
    /// Requires `config.bot_token` to be set and non-empty.
    pub fn new(config: TelegramConfig) -> Result<Self, ArchiveError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ArchiveError::Config("telegram.bot_token is required for the bot surface".into())
        })?;
        if token.is_empty() {
            return Err(ArchiveError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(token),
            config,
        })
    }

    /// Returns a clone of the underlying teloxide Bot.
    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Start long polling. The returned task runs until the process
    /// shuts down.
    pub fn spawn_dispatcher(&self, deps: Arc<BotDeps>) -> tokio::task::JoinHandle<()> {
        let bot = self.bot.clone();
        let whitelist = Arc::new(self.config.whitelist_ids.clone());

        info!("starting Telegram long polling");

        tokio::spawn(async move {
            let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
                let deps = Arc::clone(&deps);
                let whitelist = Arc::clone(&whitelist);
                async move {
                    // Silent drops: non-DM and unauthorized senders.
                    if !handler::is_dm(&msg) {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                        return respond(());
                    }
                    if !handler::is_whitelisted(&msg, &whitelist) {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-curator message");
                        return respond(());
                    }

                    if let Some(command) = commands::parse(msg.text()) {
                        if let Err(e) = commands::handle(&bot, &msg, command, &deps).await {
                            error!(error = %e, "command handling failed");
                        }
                        return respond(());
                    }

                    match handler::to_fragment(&msg) {
                        Some(fragment) => deps.aggregator.submit(fragment).await,
                        None => {
                            debug!(msg_id = msg.id.0, "message carries no archivable media");
                        }
                    }

                    respond(())
                }
            });

            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {}) // Silently ignore non-message updates
                .build()
                .dispatch()
                .await;
        })
    }
}

/// Bot-surface notifier used for acks and worker notifications.
///
/// Messages go out as MarkdownV2 with a plain-text fallback, the same
/// two-step delivery the ack formatter expects.
pub struct TelegramNotifier {
    bot: Bot,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, admin_ids: Vec<i64>) -> Self {
        Self { bot, admin_ids }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), ArchiveError> {
        let escaped = format::escape_markdown(text);
        match self
            .bot
            .send_message(Recipient::Id(ChatId(chat_id)), &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "MarkdownV2 send failed, retrying as plain text");
                self.bot
                    .send_message(Recipient::Id(ChatId(chat_id)), text)
                    .await
                    .map_err(|e| ArchiveError::Transport {
                        message: format!("failed to send message: {e}"),
                        transient: false,
                        source: Some(Box::new(e)),
                    })?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_chat(&self, chat_id: i64, text: &str) -> Result<(), ArchiveError> {
        self.send(chat_id, text).await
    }

    async fn notify_admins(&self, text: &str) -> Result<(), ArchiveError> {
        for admin_id in &self.admin_ids {
            if let Err(e) = self.send(*admin_id, text).await {
                warn!(admin_id, error = %e, "failed to notify admin");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_bot_token() {
        let config = TelegramConfig {
            bot_token: None,
            whitelist_ids: vec![],
        };
        assert!(TelegramService::new(config).is_err());
    }

    #[test]
    fn new_rejects_empty_token() {
        let config = TelegramConfig {
            bot_token: Some(String::new()),
            whitelist_ids: vec![],
        };
        assert!(TelegramService::new(config).is_err());
    }

    #[test]
    fn new_accepts_valid_token() {
        let config = TelegramConfig {
            bot_token: Some("123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11".into()),
            whitelist_ids: vec![111],
        };
        assert!(TelegramService::new(config).is_ok());
    }
}
