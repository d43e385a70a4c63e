// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally billing` - usage sync and invoice consolidation.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use tally_billing::{
    sync_usage_events, BillingConsolidator, HttpAccountingSink, StripeUsageRecorder,
};
use tally_config::TallyConfig;
use tally_core::{AccountingSink, TallyError};

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct BillingArgs {
    #[command(subcommand)]
    command: BillingCommand,
}

#[derive(Subcommand, Debug)]
enum BillingCommand {
    /// Push pending usage events to the external usage recorder.
    Sync,
    /// Consolidate a cycle into invoices and credit notes.
    Consolidate {
        /// Invoice cycle, e.g. 2026-05.
        cycle: String,
        /// Invoice currency; defaults to the configured target.
        #[arg(long)]
        currency: Option<String>,
    },
}

pub async fn run(config: &TallyConfig, args: BillingArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    match args.command {
        BillingCommand::Sync => {
            let api_key = config.billing.usage_api_key.clone().ok_or_else(|| {
                TallyError::Config("billing.usage_api_key is not configured".to_string())
            })?;
            let recorder = StripeUsageRecorder::new(
                api_key,
                Duration::from_secs(config.billing.sink_timeout_secs),
            )?;
            let synced = sync_usage_events(&ctx.ledger, &recorder).await?;
            println!("{synced}");
        }
        BillingCommand::Consolidate { cycle, currency } => {
            let timeout = Duration::from_secs(config.billing.sink_timeout_secs);
            let mut sinks: Vec<Arc<dyn AccountingSink>> = Vec::new();
            for endpoint in &config.billing.sink_urls {
                sinks.push(Arc::new(HttpAccountingSink::new(
                    endpoint.name.clone(),
                    endpoint.url.clone(),
                    timeout,
                )?));
            }
            let consolidator = BillingConsolidator::new(
                ctx.db.clone(),
                ctx.ledger.clone(),
                ctx.rates.clone(),
                config.ledger.settlement_currency.clone(),
                sinks,
            );
            let currency = currency.unwrap_or_else(|| config.billing.target_currency.clone());
            let summaries = consolidator.consolidate(&cycle, &currency).await?;
            for summary in &summaries {
                println!(
                    "{} total={:.2} credit={:.2}",
                    summary.invoice_id, summary.total, summary.credit
                );
            }
        }
    }
    Ok(())
}
