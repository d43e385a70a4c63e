// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally fx` - fetch and inspect FX rate snapshots.

use std::time::Duration;

use clap::{Args, Subcommand};
use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_fx::{fetch_and_store, JsonRateFeed};

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct FxArgs {
    #[command(subcommand)]
    command: FxCommand,
}

#[derive(Subcommand, Debug)]
enum FxCommand {
    /// Fetch the latest snapshot from the configured feed and store it.
    Fetch {
        /// Store under this date instead of today (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
    },
    /// Print the stored snapshot for a date (latest when omitted).
    Show {
        #[arg(long)]
        date: Option<String>,
    },
}

pub async fn run(config: &TallyConfig, args: FxArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    match args.command {
        FxCommand::Fetch { date } => {
            let url = config.fx.feed_url.clone().ok_or_else(|| {
                TallyError::Config("fx.feed_url is not configured".to_string())
            })?;
            let feed = JsonRateFeed::new(url, Duration::from_secs(config.fx.feed_timeout_secs))?;
            let stored = fetch_and_store(
                &feed,
                &ctx.rates,
                &config.fx.base_currency,
                date.as_deref(),
            )
            .await?;
            println!("Stored FX rates for {stored}");
        }
        FxCommand::Show { date } => {
            let rates = ctx.rates.get(date.as_deref()).await?;
            let mut entries: Vec<_> = rates.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (currency, rate) in entries {
                println!("{currency} {rate}");
            }
        }
    }
    Ok(())
}
