// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally export` - write a date range of usage events to CSV.

use std::path::PathBuf;

use clap::Args;
use tally_config::TallyConfig;
use tally_core::TallyError;

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Range start date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    start: String,
    /// Range end date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    end: String,
    /// Output CSV file.
    out_csv: PathBuf,
}

pub async fn run(config: &TallyConfig, args: ExportArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    let events = ctx
        .ledger
        .get_usage_events_by_range(&args.start, &args.end)
        .await?;

    let mut writer = csv::Writer::from_path(&args.out_csv)
        .map_err(|e| TallyError::Config(format!("cannot write {}: {e}", args.out_csv.display())))?;
    let map_csv_err =
        |e: csv::Error| TallyError::Internal(format!("CSV write failed: {e}"));
    writer
        .write_record([
            "customer_id",
            "provider",
            "model",
            "metric_type",
            "units",
            "cost",
        ])
        .map_err(map_csv_err)?;
    for event in &events {
        let cost = event.units * event.unit_cost;
        writer
            .write_record([
                event.customer_id.as_str(),
                event.provider.as_str(),
                event.model.as_str(),
                event.metric_type.as_str(),
                &event.units.to_string(),
                &cost.to_string(),
            ])
            .map_err(map_csv_err)?;
    }
    writer.flush().map_err(|e| TallyError::Internal(format!("CSV flush failed: {e}")))?;
    println!("Exported {} events to {}", events.len(), args.out_csv.display());
    Ok(())
}
