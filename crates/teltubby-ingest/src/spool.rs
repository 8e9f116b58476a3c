// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hashing spool: stream a download to a temp file while computing its
//! SHA-256.
//!
//! Hashing happens chunk-by-chunk inside `poll_write`, so no whole
//! payload is ever buffered in memory and the event loop is never blocked
//! on a full-file digest.

use std::pin::Pin;
use std::task::{Context, Poll};

use sha2::{Digest, Sha256};
use teltubby_core::ArchiveError;
use tokio::io::AsyncWrite;

/// AsyncWrite adapter feeding every written chunk into a SHA-256 hasher.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: AsyncWrite + Unpin> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Finish hashing, returning the hex digest and the byte count.
    pub fn finalize(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.bytes)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.hasher.update(&buf[..written]);
                this.bytes += written as u64;
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// A spooled download: temp file on disk plus its digest and size.
///
/// The temp file is removed when the spool is dropped.
pub struct Spool {
    pub path: tempfile::TempPath,
    pub sha256: String,
    pub size: u64,
}

/// Create a fresh spool file and run `fill` against a hashing writer over
/// it. Returns the completed [`Spool`].
pub async fn spool_download<F, Fut>(fill: F) -> Result<Spool, ArchiveError>
where
    F: FnOnce(HashingWriter<tokio::fs::File>) -> Fut,
    Fut: Future<Output = Result<HashingWriter<tokio::fs::File>, ArchiveError>>,
{
    let temp = tempfile::Builder::new()
        .prefix("teltubby_")
        .tempfile()
        .map_err(|e| ArchiveError::Internal(format!("failed to create spool file: {e}")))?
        .into_temp_path();

    let file = tokio::fs::File::create(&temp)
        .await
        .map_err(|e| ArchiveError::Internal(format!("failed to open spool file: {e}")))?;

    let writer = fill(HashingWriter::new(file)).await?;
    let (sha256, size) = writer.finalize();

    Ok(Spool {
        path: temp,
        sha256,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn spool_hashes_while_writing() {
        let spool = spool_download(|mut writer| async move {
            writer.write_all(b"hello ").await.unwrap();
            writer.write_all(b"world").await.unwrap();
            writer.flush().await.unwrap();
            Ok(writer)
        })
        .await
        .unwrap();

        assert_eq!(spool.size, 11);
        // sha256("hello world")
        assert_eq!(
            spool.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        let on_disk = std::fs::read(&spool.path).unwrap();
        assert_eq!(on_disk, b"hello world");
    }

    #[tokio::test]
    async fn spool_file_is_removed_on_drop() {
        let path_buf;
        {
            let spool = spool_download(|mut writer| async move {
                writer.write_all(b"x").await.unwrap();
                Ok(writer)
            })
            .await
            .unwrap();
            path_buf = spool.path.to_path_buf();
            assert!(path_buf.exists());
        }
        assert!(!path_buf.exists());
    }

    #[tokio::test]
    async fn empty_spool_has_empty_digest() {
        let spool = spool_download(|writer| async move { Ok(writer) }).await.unwrap();
        assert_eq!(spool.size, 0);
        assert_eq!(
            spool.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
