// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FX rate snapshots and currency conversion for the Tally pipeline.
//!
//! A snapshot is the full currency → rate mapping for one date, expressed
//! against a fixed base currency. Conversion triangulates through the base:
//! `amount_in_target = (amount / rate[from]) * rate[to]`.

pub mod feed;
pub mod store;

pub use feed::{fetch_and_store, JsonRateFeed};
pub use store::{convert, RateStore};
