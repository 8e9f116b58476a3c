// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! S3-compatible object store gateway using the AWS SDK.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use teltubby_config::model::S3Config;
use teltubby_core::traits::{ByteStream, ObjectMeta, ObjectStore, ObjectSummary};
use teltubby_core::ArchiveError;
use tokio_util::io::ReaderStream;
use tracing::{instrument, warn};

/// Content type used when the declared MIME is absent.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// S3-compatible object store gateway.
///
/// Every put carries a private canned ACL; the archive never exposes
/// public URLs.
pub struct S3Gateway {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Gateway")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Gateway {
    /// Create a gateway from configuration.
    ///
    /// Static credentials must come as a pair; otherwise the ambient AWS
    /// credential chain is used. Bare `host:port` endpoints (local MinIO)
    /// get an `http://` scheme prepended.
    pub async fn new(config: &S3Config) -> Result<Self, ArchiveError> {
        if config.access_key_id.is_some() ^ config.secret_access_key.is_some() {
            return Err(ArchiveError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }
        if config.bucket.is_empty() {
            return Err(ArchiveError::Config("s3.bucket must be set".to_string()));
        }

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()));

        if let (Some(key_id), Some(secret)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) {
            builder = builder.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "teltubby-config",
            ));
        } else {
            let chain =
                aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                    .region(Region::new(region))
                    .build()
                    .await;
            builder = builder.credentials_provider(chain);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

/// Handle bare `host:port` endpoints by prepending `http://`.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Whether an HTTP status from the service is worth retrying.
fn status_is_transient(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

/// Map an SDK error to the workspace error type, classifying it as
/// transient (network, 5xx, throttling, timeout) or permanent (other 4xx).
fn map_sdk_error<E>(operation: &str, err: SdkError<E>) -> ArchiveError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::ServiceError(service_err) => {
            status_is_transient(service_err.raw().status().as_u16())
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        _ => false,
    };
    ArchiveError::Store {
        message: format!("{operation} failed: {err}"),
        transient,
        source: Some(Box::new(err)),
    }
}

/// Extract the HTTP status of a service error, if any.
fn service_status<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for S3Gateway {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, path), fields(bucket = %self.bucket))]
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let body = SdkByteStream::from_path(path).await.map_err(|e| {
            ArchiveError::Store {
                message: format!("failed to open spool file for {key}: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            }
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .content_type(content_type.unwrap_or(FALLBACK_CONTENT_TYPE))
            .body(body)
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", e))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket, size = data.len()))]
    async fn put_bytes(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), ArchiveError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .content_type(content_type.unwrap_or(FALLBACK_CONTENT_TYPE))
            .body(data.into())
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ArchiveError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectMeta {
                size: output.content_length().unwrap_or(0) as u64,
                content_type: output.content_type().map(|s| s.to_string()),
            })),
            Err(err) if service_status(&err) == Some(404) => Ok(None),
            Err(err) => Err(map_sdk_error("head_object", err)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_stream(&self, key: &str) -> Result<ByteStream, ArchiveError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_object", e))?;

        let reader = ReaderStream::new(output.body.into_async_read());
        let stream = reader.map(|result| {
            result.map_err(|e| ArchiveError::Store {
                message: format!("object body read failed: {e}"),
                transient: true,
                source: Some(Box::new(e)),
            })
        });
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("delete_object", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ArchiveError> {
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| map_sdk_error("list_objects_v2", e))?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    results.push(ObjectSummary {
                        key: key.to_string(),
                        size: obj.size().unwrap_or(0) as u64,
                    });
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(results)
    }

    async fn usage_bytes(&self) -> Result<u64, ArchiveError> {
        // Summing a listing can be slow on very large buckets; callers
        // cache the result (the quota gate polls on an interval).
        let objects = self.list_prefix("").await?;
        Ok(objects.iter().map(|o| o.size).sum())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn health_check(&self) -> Result<(), ArchiveError> {
        let marker_key = ".teltubby-health-check";
        let check = async {
            self.put_bytes(marker_key, Bytes::from_static(b"health-check"), None)
                .await?;
            if let Err(e) = self.delete(marker_key).await {
                warn!(error = %e, "health-check marker cleanup failed");
            }
            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check)
            .await
            .map_err(|_| ArchiveError::Timeout {
                duration: HEALTH_CHECK_TIMEOUT,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> S3Config {
        S3Config {
            endpoint: endpoint.map(String::from),
            region: Some("us-east-1".to_string()),
            bucket: "test-bucket".to_string(),
            access_key_id: Some("access".to_string()),
            secret_access_key: Some("secret".to_string()),
            force_path_style: true,
        }
    }

    #[tokio::test]
    async fn new_requires_complete_credentials() {
        let mut cfg = config(None);
        cfg.secret_access_key = None;
        let err = S3Gateway::new(&cfg).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Config(_)));
    }

    #[tokio::test]
    async fn new_rejects_empty_bucket() {
        let mut cfg = config(None);
        cfg.bucket = String::new();
        assert!(S3Gateway::new(&cfg).await.is_err());
    }

    #[tokio::test]
    async fn gateway_constructs_for_minio_style_endpoint() {
        let gateway = S3Gateway::new(&config(Some("minio:9000"))).await.unwrap();
        assert_eq!(gateway.bucket(), "test-bucket");
    }

    #[test]
    fn endpoint_normalization_prepends_scheme() {
        assert_eq!(normalize_endpoint("minio:9000"), "http://minio:9000");
        assert_eq!(normalize_endpoint("https://s3.example"), "https://s3.example");
        assert_eq!(normalize_endpoint("HTTP://weird"), "HTTP://weird");
    }

    #[test]
    fn transient_statuses() {
        assert!(status_is_transient(500));
        assert!(status_is_transient(503));
        assert!(status_is_transient(429));
        assert!(status_is_transient(408));
        assert!(!status_is_transient(403));
        assert!(!status_is_transient(404));
        assert!(!status_is_transient(400));
    }
}
