// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits behind which all external collaborators sit.
//!
//! The ingestion pipeline and the queue worker depend only on these
//! traits, which keeps both testable with in-memory fakes.

pub mod dedup;
pub mod jobs;
pub mod notify;
pub mod object_store;
pub mod queue;
pub mod transport;

pub use dedup::{DedupIndex, FileRecord};
pub use jobs::JobStore;
pub use notify::Notifier;
pub use object_store::{ByteStream, ObjectMeta, ObjectStore, ObjectSummary};
pub use queue::{EnqueueRequest, JobIntake, JobPublisher};
pub use transport::{BotTransport, RemoteFile, UserTransport};
