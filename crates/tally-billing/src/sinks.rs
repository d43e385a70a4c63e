// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP accounting sink implementation.
//!
//! Posts consolidated invoices as JSON to a configured endpoint. Used for
//! QuickBooks/NetSuite-style integrations that accept a webhook bridge; the
//! consolidator treats any failure as non-fatal.

use std::time::Duration;

use async_trait::async_trait;
use tally_core::{AccountingSink, ConsolidatedInvoice, TallyError};

/// Accounting sink POSTing invoices to one HTTP endpoint.
pub struct HttpAccountingSink {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpAccountingSink {
    /// Build a sink with a bounded request timeout.
    pub fn new(name: String, url: String, timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Sink {
                sink: name.clone(),
                source: Box::new(e),
            })?;
        Ok(Self { name, url, client })
    }
}

#[async_trait]
impl AccountingSink for HttpAccountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push_invoice(&self, invoice: &ConsolidatedInvoice) -> Result<(), TallyError> {
        let response = self
            .client
            .post(&self.url)
            .json(invoice)
            .send()
            .await
            .map_err(|e| TallyError::Sink {
                sink: self.name.clone(),
                source: Box::new(e),
            })?;
        if !response.status().is_success() {
            return Err(TallyError::Sink {
                sink: self.name.clone(),
                source: format!("HTTP {}", response.status()).into(),
            });
        }
        Ok(())
    }
}
