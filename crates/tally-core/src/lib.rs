// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally usage-metering pipeline.
//!
//! This crate provides the error type, common types, and the collaborator
//! traits behind which all external systems (accounting APIs, rate feeds,
//! webhook targets, event streams) sit.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TallyError;
pub use types::{ConsolidatedInvoice, SyncStatus};

// Re-export all collaborator traits at crate root.
pub use traits::{AccountingSink, AlertSink, EventStream, GpuPriceFeed, RateFeed, UsageRecorder};
