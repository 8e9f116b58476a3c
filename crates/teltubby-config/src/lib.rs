// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the teltubby media archiver.
//!
//! Layered TOML loading via Figment with `TELTUBBY_*` environment
//! variable overrides, strict unknown-key rejection, and post-load
//! validation. The configuration is immutable after startup and threaded
//! from the entry point; nothing re-reads the environment later.

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TeltubbyConfig;
pub use validation::validate_config;
