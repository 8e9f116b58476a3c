// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object store gateway and quota gate for the teltubby archiver.
//!
//! [`S3Gateway`] talks to any S3-compatible store (AWS S3, MinIO) through
//! the AWS SDK, classifying failures as transient or permanent.
//! [`QuotaGate`] polls bucket usage and suspends admission at 100%.

pub mod quota;
pub mod s3;

pub use quota::{GateState, QuotaGate};
pub use s3::S3Gateway;
