// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally forecast` - next-period spend projection.

use clap::Args;
use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_forecast::forecast_next_period;

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct ForecastArgs {
    /// Hours of history to feed the extrapolation.
    #[arg(long, default_value_t = 24)]
    hours: u32,
}

pub async fn run(config: &TallyConfig, args: ForecastArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    let prediction = forecast_next_period(&ctx.ledger, args.hours).await?;
    println!("{prediction}");
    Ok(())
}
