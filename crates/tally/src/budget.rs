// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally budget` - manage monthly ceilings and run the overrun check.

use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand};
use tally_billing::{run_budget_check, WebhookAlertSink};
use tally_config::TallyConfig;
use tally_core::TallyError;

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct BudgetArgs {
    #[command(subcommand)]
    command: BudgetCommand,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    /// Set the monthly budget for a customer.
    Set {
        customer_id: String,
        monthly_limit: f64,
    },
    /// List all budgets.
    List,
    /// Check a cycle's spend against budgets and send webhook alerts.
    Check {
        /// Invoice cycle YYYY-MM; defaults to the current month.
        #[arg(long)]
        cycle: Option<String>,
    },
}

pub async fn run(config: &TallyConfig, args: BudgetArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    match args.command {
        BudgetCommand::Set {
            customer_id,
            monthly_limit,
        } => {
            ctx.budgets.set_budget(&customer_id, monthly_limit).await?;
            println!("Budget set: {customer_id} -> {monthly_limit:.2}");
        }
        BudgetCommand::List => {
            for (customer_id, limit) in ctx.budgets.list_budgets().await? {
                println!("{customer_id} {limit:.2}");
            }
        }
        BudgetCommand::Check { cycle } => {
            let webhook_url = config.alerts.webhook_url.clone().ok_or_else(|| {
                TallyError::Config("alerts.webhook_url is not configured".to_string())
            })?;
            let cycle = cycle.unwrap_or_else(|| Utc::now().format("%Y-%m").to_string());
            let alert = WebhookAlertSink::new(Duration::from_secs(config.billing.sink_timeout_secs))?;
            let delivered =
                run_budget_check(&ctx.ledger, &ctx.budgets, &alert, &webhook_url, &cycle).await?;
            println!("Sent {delivered} budget alerts for {cycle}");
        }
    }
    Ok(())
}
