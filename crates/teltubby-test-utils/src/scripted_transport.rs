// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted transport and notifier fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use teltubby_core::traits::{BotTransport, Notifier, RemoteFile, UserTransport};
use teltubby_core::ArchiveError;
use tokio::io::{AsyncWrite, AsyncWriteExt};

struct ScriptedFile {
    data: Bytes,
    too_big: bool,
    fail_fetches: usize,
}

/// Bot transport fake serving scripted file contents per file id.
#[derive(Default)]
pub struct ScriptedBotTransport {
    files: Mutex<HashMap<String, ScriptedFile>>,
}

impl ScriptedBotTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` for `file_id`.
    pub fn add_file(&self, file_id: &str, data: impl Into<Bytes>) {
        self.files.lock().unwrap().insert(
            file_id.to_string(),
            ScriptedFile {
                data: data.into(),
                too_big: false,
                fail_fetches: 0,
            },
        );
    }

    /// Make probes for `file_id` refuse with "too big".
    pub fn add_too_big(&self, file_id: &str, size: u64) {
        self.files.lock().unwrap().insert(
            file_id.to_string(),
            ScriptedFile {
                data: Bytes::from(vec![0u8; size.min(8) as usize]),
                too_big: true,
                fail_fetches: 0,
            },
        );
    }

    /// Make the next `n` fetches of `file_id` fail transiently.
    pub fn fail_next_fetches(&self, file_id: &str, n: usize) {
        if let Some(file) = self.files.lock().unwrap().get_mut(file_id) {
            file.fail_fetches = n;
        }
    }
}

#[async_trait]
impl BotTransport for ScriptedBotTransport {
    async fn probe(&self, file_id: &str) -> Result<RemoteFile, ArchiveError> {
        let files = self.files.lock().unwrap();
        let file = files.get(file_id).ok_or_else(|| ArchiveError::Transport {
            message: format!("unknown file id {file_id}"),
            transient: false,
            source: None,
        })?;
        if file.too_big {
            return Err(ArchiveError::FetchTooBig);
        }
        Ok(RemoteFile {
            path: file_id.to_string(),
            size: file.data.len() as u64,
        })
    }

    async fn fetch(
        &self,
        remote: &RemoteFile,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ArchiveError> {
        let data = {
            let mut files = self.files.lock().unwrap();
            let file = files.get_mut(&remote.path).ok_or_else(|| {
                ArchiveError::Transport {
                    message: format!("unknown file path {}", remote.path),
                    transient: false,
                    source: None,
                }
            })?;
            if file.fail_fetches > 0 {
                file.fail_fetches -= 1;
                return Err(ArchiveError::Transport {
                    message: "scripted transient fetch failure".to_string(),
                    transient: true,
                    source: None,
                });
            }
            file.data.clone()
        };
        dest.write_all(&data).await.map_err(|e| ArchiveError::Transport {
            message: format!("write to spool failed: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;
        Ok(())
    }
}

/// User transport fake with a switchable authorization flag.
pub struct ScriptedUserTransport {
    authorized: AtomicBool,
    media: Mutex<HashMap<(i64, i64), Bytes>>,
    fail_fetches: Mutex<usize>,
}

impl ScriptedUserTransport {
    pub fn new(authorized: bool) -> Self {
        Self {
            authorized: AtomicBool::new(authorized),
            media: Mutex::new(HashMap::new()),
            fail_fetches: Mutex::new(0),
        }
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub fn add_media(&self, chat_id: i64, message_id: i64, data: impl Into<Bytes>) {
        self.media
            .lock()
            .unwrap()
            .insert((chat_id, message_id), data.into());
    }

    /// Make the next `n` fetches fail with a transient transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        *self.fail_fetches.lock().unwrap() = n;
    }
}

#[async_trait]
impl UserTransport for ScriptedUserTransport {
    async fn is_authorized(&self) -> Result<bool, ArchiveError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn fetch_message_media(
        &self,
        chat_id: i64,
        message_id: i64,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ArchiveError> {
        {
            let mut remaining = self.fail_fetches.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ArchiveError::Transport {
                    message: "scripted transient fetch failure".to_string(),
                    transient: true,
                    source: None,
                });
            }
        }
        let data = self
            .media
            .lock()
            .unwrap()
            .get(&(chat_id, message_id))
            .cloned()
            .ok_or_else(|| ArchiveError::Transport {
                message: format!("no media for chat {chat_id} message {message_id}"),
                transient: false,
                source: None,
            })?;
        dest.write_all(&data).await.map_err(|e| ArchiveError::Transport {
            message: format!("write to spool failed: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;
        Ok(data.len() as u64)
    }
}

/// Notifier fake recording every message it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    /// `(chat_id, text)`; admin broadcasts have `chat_id = None`.
    messages: Mutex<Vec<(Option<i64>, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Option<i64>, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn admin_messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| chat.is_none())
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_chat(&self, chat_id: i64, text: &str) -> Result<(), ArchiveError> {
        self.messages
            .lock()
            .unwrap()
            .push((Some(chat_id), text.to_string()));
        Ok(())
    }

    async fn notify_admins(&self, text: &str) -> Result<(), ArchiveError> {
        self.messages.lock().unwrap().push((None, text.to_string()));
        Ok(())
    }
}
