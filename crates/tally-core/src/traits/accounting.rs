// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits for external accounting and alerting systems.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::ConsolidatedInvoice;

/// An external accounting system that receives consolidated invoices
/// (QuickBooks, NetSuite, and the like).
///
/// Sink failures are non-fatal: the consolidator logs them and continues
/// with the remaining customers and sinks.
#[async_trait]
pub trait AccountingSink: Send + Sync {
    /// Short sink name used in log messages ("quickbooks", "netsuite").
    fn name(&self) -> &str;

    /// Pushes one consolidated invoice to the external system.
    async fn push_invoice(&self, invoice: &ConsolidatedInvoice) -> Result<(), TallyError>;
}

/// An external metered-billing API that records usage quantities
/// (Stripe usage records).
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Records `quantity` units against `subscription_item` at `timestamp`
    /// (Unix seconds). Returns the external record id.
    async fn create_usage_record(
        &self,
        subscription_item: &str,
        quantity: f64,
        timestamp: i64,
    ) -> Result<String, TallyError>;
}

/// A webhook target for operational alerts (budget overruns).
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// POSTs a plain-text message to the given webhook URL.
    async fn send(&self, url: &str, message: &str) -> Result<(), TallyError>;
}
