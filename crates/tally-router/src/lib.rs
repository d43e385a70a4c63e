// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost-based provider routing for the Tally pipeline.
//!
//! Selects the cheapest markup- and FX-adjusted offer among candidates and
//! resolves symbolic provider names to request endpoints, delegating
//! self-hosted providers to the GPU spot-price feed.

pub mod endpoint;
pub mod router;

pub use endpoint::{
    choose_best_gpu_host, EndpointResolver, JsonGpuPriceFeed, ProviderClass,
};
pub use router::{CostRouter, ProviderOption, RoutedOption};
