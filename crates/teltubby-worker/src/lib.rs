// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker: consumes oversize-media jobs from the durable queue,
//! fetches the binary through the user-protocol transport, and commits
//! it through the same storage contract and layout as the inline path.
//!
//! Runs as its own process. The local job table (shared SQLite file) is
//! the source of truth for job state; the broker only carries work.

pub mod consumer;
pub mod processor;
pub mod session;

pub use consumer::QueueWorker;
pub use processor::{process_delivery, DeliveryOutcome, WorkerContext};
pub use session::SessionMonitor;
