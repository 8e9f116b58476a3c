// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health and metrics HTTP surface.
//!
//! Serves `/health` (JSON liveness with bucket usage) and `/metrics`
//! (Prometheus text) on the configured health port.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use teltubby_config::model::HealthConfig;
use teltubby_metrics::MetricsHandle;
use teltubby_store::QuotaGate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
struct WebState {
    start_time: Instant,
    metrics: Option<Arc<MetricsHandle>>,
    quota: Arc<QuotaGate>,
}

/// Serve until shutdown. Bind failures are logged, not fatal: the
/// archiver keeps running without its health surface.
pub async fn serve(
    config: HealthConfig,
    metrics: Option<Arc<MetricsHandle>>,
    quota: Arc<QuotaGate>,
    shutdown: CancellationToken,
) {
    let state = WebState {
        start_time: Instant::now(),
        metrics,
        quota,
    };

    let app = Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state);

    let host = if config.bind_localhost_only {
        "127.0.0.1"
    } else {
        "0.0.0.0"
    };
    let addr = format!("{host}:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(addr, error = %e, "failed to bind health server");
            return;
        }
    };
    info!(addr, "health server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });
    if let Err(e) = server.await {
        warn!(error = %e, "health server error");
    }
}

async fn get_health(State(state): State<WebState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "bucket_used_ratio": state.quota.used_ratio(),
    }))
}

async fn get_metrics(State(state): State<WebState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
