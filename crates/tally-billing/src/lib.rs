// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Billing for the Tally metering pipeline.
//!
//! This crate provides:
//! - **Consolidation**: per-cycle aggregation of ledger events into
//!   invoices and credit notes, forwarded to accounting sinks
//! - **Usage sync**: at-most-once push of pending events to the external
//!   usage recorder
//! - **Budget alerts**: webhook notifications for customers over their
//!   monthly ceiling

pub mod alerts;
pub mod consolidator;
pub mod sinks;
pub mod sync;

pub use alerts::{run_budget_check, WebhookAlertSink};
pub use consolidator::{BillingConsolidator, CreditNote, Invoice, InvoiceSummary};
pub use sinks::HttpAccountingSink;
pub use sync::{sync_usage_events, StripeUsageRecorder};
