// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`DedupIndex`] fake.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use teltubby_core::traits::{DedupIndex, FileRecord};
use teltubby_core::ArchiveError;

#[derive(Default)]
struct Inner {
    files: HashMap<String, FileRecord>,
    tg_map: HashMap<String, String>,
    messages: Vec<(i64, i64, Option<String>)>,
    vacuum_calls: usize,
}

/// In-memory dedup index with the same conflict semantics as the SQLite
/// implementation.
#[derive(Default)]
pub struct MemoryDedup {
    inner: Mutex<Inner>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }

    pub fn recorded_messages(&self) -> Vec<(i64, i64, Option<String>)> {
        self.inner.lock().unwrap().messages.clone()
    }

    pub fn vacuum_calls(&self) -> usize {
        self.inner.lock().unwrap().vacuum_calls
    }
}

#[async_trait]
impl DedupIndex for MemoryDedup {
    async fn lookup_by_unique_id(
        &self,
        file_unique_id: &str,
    ) -> Result<Option<String>, ArchiveError> {
        Ok(self.inner.lock().unwrap().tg_map.get(file_unique_id).cloned())
    }

    async fn lookup_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, ArchiveError> {
        Ok(self.inner.lock().unwrap().files.get(sha256).cloned())
    }

    async fn register(
        &self,
        record: FileRecord,
        file_unique_id: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.files.get(&record.sha256) {
            if existing.s3_key != record.s3_key {
                return Err(ArchiveError::DedupConflict {
                    sha256: record.sha256.clone(),
                    existing_key: existing.s3_key.clone(),
                });
            }
        } else {
            inner.files.insert(record.sha256.clone(), record.clone());
        }
        if let Some(uid) = file_unique_id {
            inner
                .tg_map
                .entry(uid.to_string())
                .or_insert_with(|| record.sha256.clone());
        }
        Ok(())
    }

    async fn record_message(
        &self,
        chat_id: i64,
        message_id: i64,
        media_group_id: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = (chat_id, message_id, media_group_id.map(String::from));
        if !inner.messages.contains(&entry) {
            inner.messages.push(entry);
        }
        Ok(())
    }

    async fn vacuum(&self) -> Result<(), ArchiveError> {
        self.inner.lock().unwrap().vacuum_calls += 1;
        Ok(())
    }
}
