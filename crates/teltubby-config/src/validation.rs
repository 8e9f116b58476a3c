// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as credential pairing and range bounds.

use crate::diagnostic::ConfigError;
use crate::model::TeltubbyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &TeltubbyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.s3.bucket.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "s3.bucket must not be empty".to_string(),
        });
    }

    // Static credentials come in pairs.
    if config.s3.access_key_id.is_some() ^ config.s3.secret_access_key.is_some() {
        errors.push(ConfigError::Validation {
            message:
                "s3.access_key_id and s3.secret_access_key must be set together or not at all"
                    .to_string(),
        });
    }

    if config.db.path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "db.path must not be empty".to_string(),
        });
    }

    if config.ingest.album_window_seconds == 0 {
        errors.push(ConfigError::Validation {
            message: "ingest.album_window_seconds must be at least 1".to_string(),
        });
    }

    if config.ingest.album_max_items == 0 {
        errors.push(ConfigError::Validation {
            message: "ingest.album_max_items must be at least 1".to_string(),
        });
    }

    if config.ingest.max_file_gb == 0 {
        errors.push(ConfigError::Validation {
            message: "ingest.max_file_gb must be at least 1".to_string(),
        });
    }

    if !(1..=32).contains(&config.ingest.concurrency) {
        errors.push(ConfigError::Validation {
            message: format!(
                "ingest.concurrency must be in 1..=32, got {}",
                config.ingest.concurrency
            ),
        });
    }

    if config.ingest.inline_limit_bytes > config.ingest.max_file_bytes() {
        errors.push(ConfigError::Validation {
            message: format!(
                "ingest.inline_limit_bytes ({}) must not exceed ingest.max_file_gb ({} GiB)",
                config.ingest.inline_limit_bytes, config.ingest.max_file_gb
            ),
        });
    }

    if config.worker.concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "worker.concurrency must be at least 1".to_string(),
        });
    }

    if config.amqp.url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "amqp.url must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = TeltubbyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn half_configured_credentials_fail_validation() {
        let mut config = TeltubbyConfig::default();
        config.s3.access_key_id = Some("key".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("secret_access_key"))
        ));
    }

    #[test]
    fn out_of_range_concurrency_fails_validation() {
        let mut config = TeltubbyConfig::default();
        config.ingest.concurrency = 64;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("concurrency"))
        ));
    }

    #[test]
    fn inline_limit_above_max_file_fails_validation() {
        let mut config = TeltubbyConfig::default();
        config.ingest.max_file_gb = 1;
        config.ingest.inline_limit_bytes = 2 * 1024 * 1024 * 1024;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("inline_limit_bytes"))
        ));
    }

    #[test]
    fn empty_bucket_fails_validation() {
        let mut config = TeltubbyConfig::default();
        config.s3.bucket = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("s3.bucket"))
        ));
    }
}
