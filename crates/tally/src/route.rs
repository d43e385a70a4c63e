// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally route` - cost-based provider selection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::{Args, Subcommand};
use tally_config::TallyConfig;
use tally_core::{GpuPriceFeed, TallyError};
use tally_router::{CostRouter, EndpointResolver, JsonGpuPriceFeed, ProviderOption};

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct RouteArgs {
    #[command(subcommand)]
    command: RouteCommand,
}

#[derive(Subcommand, Debug)]
enum RouteCommand {
    /// Pick the cheapest offer from a JSON offers file.
    Pick {
        /// Path to a JSON array of {provider, model, unit_cost, currency}.
        offers: PathBuf,
        /// Target currency; defaults to the settlement currency.
        #[arg(long)]
        currency: Option<String>,
    },
    /// Resolve a provider name to its request base URL.
    Endpoint { provider: String },
}

/// Stand-in feed used when `router.gpu_spot_feed` is not configured.
struct UnconfiguredGpuFeed;

#[async_trait]
impl GpuPriceFeed for UnconfiguredGpuFeed {
    async fn spot_prices(&self) -> Result<HashMap<String, f64>, TallyError> {
        Err(TallyError::Config(
            "router.gpu_spot_feed is not configured".to_string(),
        ))
    }
}

pub async fn run(config: &TallyConfig, args: RouteArgs) -> Result<(), TallyError> {
    match args.command {
        RouteCommand::Pick { offers, currency } => {
            let text = std::fs::read_to_string(&offers)
                .map_err(|e| TallyError::Config(format!("cannot read {}: {e}", offers.display())))?;
            let options: Vec<ProviderOption> = serde_json::from_str(&text)
                .map_err(|e| TallyError::Validation(format!("invalid offers file: {e}")))?;

            let ctx = AppContext::init(config).await?;
            let router = CostRouter::new(ctx.markup.clone(), ctx.rates.clone());
            let currency =
                currency.unwrap_or_else(|| config.ledger.settlement_currency.clone());
            let chosen = router.route(&options, Utc::now(), &currency).await?;
            println!(
                "{} {} final_cost={:.6} {}",
                chosen.provider, chosen.model, chosen.final_cost, currency
            );
        }
        RouteCommand::Endpoint { provider } => {
            let gpu_feed: Arc<dyn GpuPriceFeed> = match &config.router.gpu_spot_feed {
                Some(url) => Arc::new(JsonGpuPriceFeed::new(
                    url.clone(),
                    Duration::from_secs(config.fx.feed_timeout_secs),
                )?),
                None => Arc::new(UnconfiguredGpuFeed),
            };
            let resolver = EndpointResolver::new(&config.router, gpu_feed);
            println!("{}", resolver.provider_base_url(&provider).await?);
        }
    }
    Ok(())
}
