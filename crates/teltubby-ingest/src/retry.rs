// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use teltubby_core::ArchiveError;
use tracing::warn;

/// Run `op` up to `attempts` times, sleeping `base * 3^(n-1)` between
/// tries (1 s, 3 s, 9 s with the defaults). Only transient errors are
/// retried; permanent errors return immediately.
pub async fn with_retries<T, F, Fut>(
    what: &str,
    attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, ArchiveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArchiveError>>,
{
    let attempts = attempts.max(1);
    let mut delay = base;
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 3;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable with attempts >= 1, but keep the compiler honest.
    Err(last_err.unwrap_or_else(|| ArchiveError::Internal(format!("{what}: no attempts made"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ArchiveError {
        ArchiveError::Store {
            message: "503".into(),
            transient: true,
            source: None,
        }
    }

    fn permanent() -> ArchiveError {
        ArchiveError::Store {
            message: "403".into(),
            transient: false,
            source: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", 3, Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_final_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", 3, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", 3, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(permanent()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
