// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`ObjectStore`] fake.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use teltubby_core::traits::{ByteStream, ObjectMeta, ObjectStore, ObjectSummary};
use teltubby_core::ArchiveError;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

/// In-memory bucket with optional scripted put failures.
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    /// Upcoming puts that fail transiently before one succeeds.
    fail_puts: AtomicUsize,
    /// Upcoming `put_bytes` calls that fail transiently (metadata writes).
    fail_bytes_puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            fail_puts: AtomicUsize::new(0),
            fail_bytes_puts: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` puts fail with a transient store error.
    pub fn fail_next_puts(&self, n: usize) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `put_bytes` calls fail with a transient store
    /// error, leaving `put_file` untouched.
    pub fn fail_next_bytes_puts(&self, n: usize) {
        self.fail_bytes_puts.store(n, Ordering::SeqCst);
    }

    /// Stored payload for a key, if present.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    /// Recorded content type for a key, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn check_put_failure(&self) -> Result<(), ArchiveError> {
        let remaining = self.fail_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(ArchiveError::Store {
                message: "scripted transient put failure".to_string(),
                transient: true,
                source: None,
            });
        }
        Ok(())
    }

    fn insert(&self, key: &str, data: Bytes, content_type: Option<&str>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(String::from),
            },
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError> {
        self.check_put_failure()?;
        let data = tokio::fs::read(path).await.map_err(|e| ArchiveError::Store {
            message: format!("failed to read spool file: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;
        self.insert(key, Bytes::from(data), content_type);
        Ok(())
    }

    async fn put_bytes(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let remaining = self.fail_bytes_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_bytes_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(ArchiveError::Store {
                message: "scripted transient put_bytes failure".to_string(),
                transient: true,
                source: None,
            });
        }
        self.check_put_failure()?;
        self.insert(key, data, content_type);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ArchiveError> {
        Ok(self.objects.lock().unwrap().get(key).map(|o| ObjectMeta {
            size: o.data.len() as u64,
            content_type: o.content_type.clone(),
        }))
    }

    async fn get_stream(&self, key: &str) -> Result<ByteStream, ArchiveError> {
        let data = self
            .object(key)
            .ok_or_else(|| ArchiveError::Store {
                message: format!("no such key: {key}"),
                transient: false,
                source: None,
            })?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ArchiveError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, o)| ObjectSummary {
                key: key.clone(),
                size: o.data.len() as u64,
            })
            .collect())
    }

    async fn usage_bytes(&self) -> Result<u64, ArchiveError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .map(|o| o.data.len() as u64)
            .sum())
    }

    async fn health_check(&self) -> Result<(), ArchiveError> {
        Ok(())
    }
}
