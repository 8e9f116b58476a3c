// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./teltubby.toml` > `~/.config/teltubby/teltubby.toml`
//! > `/etc/teltubby/teltubby.toml` with environment variable overrides via
//! `TELTUBBY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TeltubbyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/teltubby/teltubby.toml` (system-wide)
/// 3. `~/.config/teltubby/teltubby.toml` (user XDG config)
/// 4. `./teltubby.toml` (local directory)
/// 5. `TELTUBBY_*` environment variables
pub fn load_config() -> Result<TeltubbyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TeltubbyConfig::default()))
        .merge(Toml::file("/etc/teltubby/teltubby.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("teltubby/teltubby.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("teltubby.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TeltubbyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TeltubbyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TeltubbyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TeltubbyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `TELTUBBY_TELEGRAM_BOT_TOKEN`
/// must map to `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("TELTUBBY_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: TELTUBBY_INGEST_MAX_FILE_GB -> "ingest_max_file_gb"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("telegram_", "telegram.", 1)
            .replacen("s3_", "s3.", 1)
            .replacen("ingest_", "ingest.", 1)
            .replacen("db_", "db.", 1)
            .replacen("quota_", "quota.", 1)
            .replacen("amqp_", "amqp.", 1)
            .replacen("worker_", "worker.", 1)
            .replacen("health_", "health.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}
