// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Tally crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Sync state of a usage event with respect to the external usage recorder.
///
/// Events are inserted as `Pending` and transition to `Synced` exactly once;
/// the transition is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
}

/// A consolidated invoice as handed to external accounting sinks.
///
/// `amount` is the gross total in `currency`; `credit` is the positive
/// magnitude of the cycle's negative-unit usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedInvoice {
    pub invoice_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub cycle: String,
    pub credit: f64,
    pub currency: String,
}
