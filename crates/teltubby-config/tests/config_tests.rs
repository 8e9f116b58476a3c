// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and validation.

use teltubby_config::{load_config_from_str, validate_config, TeltubbyConfig};

#[test]
fn empty_config_yields_documented_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.ingest.album_window_seconds, 2);
    assert_eq!(config.ingest.album_max_items, 10);
    assert_eq!(config.ingest.max_file_gb, 4);
    assert_eq!(config.ingest.inline_limit_bytes, 50 * 1024 * 1024);
    assert_eq!(config.ingest.concurrency, 8);
    assert_eq!(config.ingest.io_timeout_seconds, 60);
    assert!(config.db.dedup_enable);
    assert!(config.quota.bucket_quota_bytes.is_none());
    assert_eq!(config.health.port, 8081);
    assert_eq!(config.amqp.queue, "teltubby.large_files");
    assert_eq!(config.amqp.dead_letter_queue, "teltubby.failed_jobs");
    assert_eq!(config.worker.concurrency, 1);
    assert_eq!(config.worker.max_retries, 3);
    assert_eq!(config.log.level, "info");
}

#[test]
fn toml_sections_override_defaults() {
    let config = load_config_from_str(
        r#"
[telegram]
bot_token = "123:abc"
whitelist_ids = [111, 222]

[s3]
endpoint = "http://minio:9000"
bucket = "archive"

[ingest]
album_window_seconds = 5
concurrency = 4

[quota]
bucket_quota_bytes = 1073741824
"#,
    )
    .unwrap();

    assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
    assert_eq!(config.telegram.whitelist_ids, vec![111, 222]);
    assert_eq!(config.s3.bucket, "archive");
    assert_eq!(config.ingest.album_window_seconds, 5);
    assert_eq!(config.ingest.concurrency, 4);
    assert_eq!(config.quota.bucket_quota_bytes, Some(1024 * 1024 * 1024));
    // Untouched sections keep their defaults.
    assert_eq!(config.worker.retry_delay_seconds, 60);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = load_config_from_str(
        r#"
[ingest]
albm_window_seconds = 5
"#,
    );
    assert!(result.is_err());
}

#[test]
fn max_file_boundary_helpers() {
    let config = load_config_from_str("[ingest]\nmax_file_gb = 4\n").unwrap();
    assert_eq!(config.ingest.max_file_bytes(), 4 * 1024 * 1024 * 1024);
}

#[test]
fn concurrency_is_clamped_not_trusted() {
    let mut config = TeltubbyConfig::default();
    config.ingest.concurrency = 32;
    assert_eq!(config.ingest.effective_concurrency(), 32);
    config.ingest.concurrency = 1;
    assert_eq!(config.ingest.effective_concurrency(), 1);
}

#[test]
fn validation_passes_for_loaded_defaults() {
    let config = load_config_from_str("").unwrap();
    assert!(validate_config(&config).is_ok());
}
