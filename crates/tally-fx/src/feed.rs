// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External rate feed client and fetch-and-store helper.
//!
//! The wire format is the feed parser's concern; the pipeline only requires
//! a currency → positive-rate mapping that includes the base currency with
//! rate 1.0.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tally_core::{RateFeed, TallyError};
use tracing::debug;

use crate::store::RateStore;

/// Rate feed client for endpoints serving a JSON currency → rate object.
pub struct JsonRateFeed {
    client: reqwest::Client,
    url: String,
}

impl JsonRateFeed {
    /// Build a feed client with a bounded request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Feed {
                message: format!("failed to build feed client: {e}"),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RateFeed for JsonRateFeed {
    async fn fetch(&self) -> Result<HashMap<String, f64>, TallyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TallyError::Feed {
                message: format!("rate feed request failed: {e}"),
            })?;
        if !response.status().is_success() {
            return Err(TallyError::Feed {
                message: format!("rate feed returned HTTP {}", response.status()),
            });
        }
        response
            .json::<HashMap<String, f64>>()
            .await
            .map_err(|e| TallyError::Feed {
                message: format!("rate feed payload is not a currency map: {e}"),
            })
    }
}

/// Fetch the latest snapshot from `feed`, validate it against the base
/// currency contract, and persist it under `date` (today when `None`).
///
/// Returns the date the snapshot was stored under.
pub async fn fetch_and_store(
    feed: &dyn RateFeed,
    store: &RateStore,
    base_currency: &str,
    date: Option<&str>,
) -> Result<String, TallyError> {
    let rates = feed.fetch().await?;
    validate_snapshot(&rates, base_currency)?;

    let date = date
        .map(|d| d.to_string())
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    store.store(&rates, &date).await?;
    debug!(date, currencies = rates.len(), "rate snapshot persisted");
    Ok(date)
}

/// A snapshot must carry the base currency at 1.0 and only positive rates.
fn validate_snapshot(rates: &HashMap<String, f64>, base_currency: &str) -> Result<(), TallyError> {
    match rates.get(base_currency) {
        Some(rate) if (rate - 1.0).abs() < 1e-9 => {}
        Some(rate) => {
            return Err(TallyError::Feed {
                message: format!("base currency {base_currency} has rate {rate}, expected 1.0"),
            });
        }
        None => {
            return Err(TallyError::Feed {
                message: format!("feed is missing the base currency {base_currency}"),
            });
        }
    }
    for (currency, rate) in rates {
        if !rate.is_finite() || *rate <= 0.0 {
            return Err(TallyError::Feed {
                message: format!("rate for {currency} is not a positive real: {rate}"),
            });
        }
    }
    Ok(())
}
