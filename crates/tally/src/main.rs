// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - AI-provider usage metering, pricing, and billing consolidation.
//!
//! This is the binary entry point for the Tally CLI.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod audit;
mod billing;
mod budget;
mod context;
mod export;
mod fx;
mod forecast;
mod monitor;
mod pricing;
mod route;

/// Tally - AI-provider usage metering, pricing, and billing consolidation.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch and store FX rate snapshots.
    Fx(fx::FxArgs),
    /// Load or compile pricing DSL rule files.
    Pricing(pricing::PricingArgs),
    /// Manage and check per-customer budgets.
    Budget(budget::BudgetArgs),
    /// Sync usage events and consolidate invoices.
    Billing(billing::BillingArgs),
    /// Forecast next-period spend from hourly totals.
    Forecast(forecast::ForecastArgs),
    /// Export usage events to CSV.
    Export(export::ExportArgs),
    /// Pick the cheapest provider offer or resolve an endpoint.
    Route(route::RouteArgs),
    /// Verify the audit log hash chains.
    Audit(audit::AuditArgs),
    /// Run the periodic audit/health monitor loop.
    Monitor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match tally_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone())),
        )
        .init();

    let result = match cli.command {
        Commands::Fx(args) => fx::run(&config, args).await,
        Commands::Pricing(args) => pricing::run(&config, args).await,
        Commands::Budget(args) => budget::run(&config, args).await,
        Commands::Billing(args) => billing::run(&config, args).await,
        Commands::Forecast(args) => forecast::run(&config, args).await,
        Commands::Export(args) => export::run(&config, args).await,
        Commands::Route(args) => route::run(&config, args).await,
        Commands::Audit(args) => audit::run(&config, args).await,
        Commands::Monitor => monitor::run(&config).await,
    };

    if let Err(e) = result {
        eprintln!("tally: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = tally_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.name, "tally");
    }
}
