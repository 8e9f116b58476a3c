// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory fakes for testing the ingestion pipeline and the queue
//! worker without external services.
//!
//! Every fake implements the corresponding capability trait from
//! `teltubby-core` and exposes inspection helpers plus failure scripting
//! where tests need it.

pub mod memory_dedup;
pub mod memory_jobs;
pub mod memory_store;
pub mod scripted_transport;

pub use memory_dedup::MemoryDedup;
pub use memory_jobs::{MemoryIntake, MemoryJobStore, MemoryPublisher};
pub use memory_store::MemoryStore;
pub use scripted_transport::{RecordingNotifier, ScriptedBotTransport, ScriptedUserTransport};
