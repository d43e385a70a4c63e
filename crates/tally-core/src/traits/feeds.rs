// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits for external price and rate feeds.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::TallyError;

/// An external FX rate feed.
///
/// Implementations parse whatever wire format the feed uses; the core only
/// requires a currency → positive-rate mapping that includes the base
/// currency with rate 1.0.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, f64>, TallyError>;
}

/// An external GPU spot-price feed mapping host name → spot price.
///
/// Used by provider base-URL resolution to pick the cheapest self-hosted
/// GPU host. An empty or malformed feed is an error.
#[async_trait]
pub trait GpuPriceFeed: Send + Sync {
    async fn spot_prices(&self) -> Result<HashMap<String, f64>, TallyError>;
}
