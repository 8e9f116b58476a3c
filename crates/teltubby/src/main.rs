// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! teltubby - a Telegram media archiver with deterministic layout,
//! deduplication, and a durable queue for oversize files.
//!
//! This is the binary entry point for both the bot process (`serve`)
//! and the queue worker process (`worker`).

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use teltubby_config::diagnostic::{figment_to_config_errors, render_errors};
use teltubby_config::{load_config, validate_config, TeltubbyConfig};
use tracing_subscriber::EnvFilter;

mod serve;
mod web;
mod worker;

/// teltubby - Telegram media archiver.
#[derive(Parser, Debug)]
#[command(name = "teltubby", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot process: ingestion pipeline, quota gate, health server.
    Serve,
    /// Run the queue worker process for oversize media.
    Worker,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("teltubby={level},warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_validated_config() -> Option<TeltubbyConfig> {
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            render_errors(&figment_to_config_errors(err));
            return None;
        }
    };
    if let Err(errors) = validate_config(&config) {
        render_errors(&errors);
        return None;
    }
    Some(config)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let Some(config) = load_validated_config() else {
        return std::process::ExitCode::FAILURE;
    };
    init_tracing(&config.log.level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Worker => worker::run_worker(config).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            eprintln!("error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}
