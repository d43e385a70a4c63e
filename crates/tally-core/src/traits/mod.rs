// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions for the Tally pipeline boundary.
//!
//! Everything behind these traits is an external system: accounting APIs,
//! rate and spot-price feeds, webhook targets, and event-stream producers.
//! The core tolerates their failure without losing internal consistency.

pub mod accounting;
pub mod feeds;
pub mod stream;

pub use accounting::{AccountingSink, AlertSink, UsageRecorder};
pub use feeds::{GpuPriceFeed, RateFeed};
pub use stream::EventStream;
