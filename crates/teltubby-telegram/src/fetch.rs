// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot-protocol file fetcher.
//!
//! Implements [`BotTransport`] over the Bot API: `getFile` resolves the
//! handle (and is the authoritative "too big" signal for the size
//! router), then the file content streams into the caller's writer.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teltubby_core::traits::{BotTransport, RemoteFile};
use teltubby_core::ArchiveError;
use tokio::io::AsyncWrite;
use tracing::debug;

/// Bot API responses that mean the file exceeds the inline limit.
const TOO_BIG_MARKER: &str = "file is too big";

/// Bot API fetcher.
pub struct TelegramFetcher {
    bot: Bot,
}

impl TelegramFetcher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn map_request_error(context: &str, err: teloxide::RequestError) -> ArchiveError {
    use teloxide::RequestError;

    if err.to_string().contains(TOO_BIG_MARKER) {
        return ArchiveError::FetchTooBig;
    }
    let transient = matches!(
        err,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    );
    ArchiveError::Transport {
        message: format!("{context}: {err}"),
        transient,
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl BotTransport for TelegramFetcher {
    async fn probe(&self, file_id: &str) -> Result<RemoteFile, ArchiveError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(|e| map_request_error("getFile failed", e))?;

        debug!(file_id, size = file.meta.size, "probed file handle");
        Ok(RemoteFile {
            path: file.path.clone(),
            size: file.meta.size as u64,
        })
    }

    async fn fetch(
        &self,
        remote: &RemoteFile,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ArchiveError> {
        self.bot
            .download_file(&remote.path, dest)
            .await
            .map_err(|e| ArchiveError::Transport {
                message: format!("download failed: {e}"),
                transient: true,
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}
