// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue client for oversize media.
//!
//! [`AmqpJobQueue`] owns the AMQP topology (durable direct exchange
//! routing to the main queue, dead-letter exchange routing rejects to the
//! failed-jobs queue) and publishes persistent job messages.
//! [`JobManager`] pairs the broker with the local job table: every
//! enqueued job has a local row, and the row is the source of truth for
//! admin commands.

pub mod amqp;
pub mod manager;

pub use amqp::AmqpJobQueue;
pub use manager::JobManager;
