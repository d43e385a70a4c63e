// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tally metering pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. Domain crates
//! (ledger, pricing, fx, audit, billing) take a [`Database`] handle by
//! constructor injection and run their own typed queries through it.

pub mod database;
pub mod migrations;

pub use database::{map_tr_err, Database};
