// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage event ledger for the Tally metering pipeline.
//!
//! This crate provides:
//! - **Usage ledger**: append-only, idempotently-upserted usage events,
//!   priced (markup + FX) at ingestion
//! - **Dead-letter quarantine**: malformed ingestion payloads preserved for
//!   inspection instead of raised or dropped
//! - **Budgets**: per-customer monthly ceilings used for alerting

pub mod budget;
pub mod ledger;

pub use budget::BudgetStore;
pub use ledger::{DeadLetterEvent, NewUsageEvent, UsageEvent, UsageLedger};
