// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object store gateway trait: keyed blob I/O against the archive bucket.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::ArchiveError;

/// Metadata returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// Streaming object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ArchiveError>> + Send>>;

/// Keyed blob store with usage queries.
///
/// Every put enforces a private ACL; objects are never publicly
/// reachable. Uploads stream their payload and must not buffer it whole
/// in memory.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the archive bucket.
    fn bucket(&self) -> &str;

    /// Upload a file from disk, streaming its contents.
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError>;

    /// Upload a small in-memory payload (metadata artifacts).
    async fn put_bytes(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError>;

    /// Object metadata, or `None` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ArchiveError>;

    /// Stream an object's contents.
    async fn get_stream(&self, key: &str) -> Result<ByteStream, ArchiveError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ArchiveError>;

    /// All objects under a key prefix.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ArchiveError>;

    /// Total bytes stored in the bucket.
    async fn usage_bytes(&self) -> Result<u64, ArchiveError>;

    /// Round-trip check against the bucket.
    async fn health_check(&self) -> Result<(), ArchiveError>;
}
