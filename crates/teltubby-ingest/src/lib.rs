// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion core: album aggregation, size routing, and the per-unit
//! archival pipeline.
//!
//! Message fragments flow from the transport into the [`AlbumAggregator`],
//! which seals them into units. The [`IngestPipeline`] validates, fetches,
//! hashes, dedup-checks, uploads, and commits each unit with a
//! `message.json` metadata artifact; oversize items are rerouted through
//! the size router onto the durable job queue.

pub mod aggregator;
pub mod artifact;
pub mod pipeline;
pub mod retry;
pub mod router;
pub mod spool;

pub use aggregator::AlbumAggregator;
pub use artifact::{build_artifact, ItemArtifact, MessageArtifact, TelegramArtifact};
pub use pipeline::{IngestPipeline, IngestReport, ItemRejection, QueuedItem};
pub use router::Route;
