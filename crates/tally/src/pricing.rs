// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally pricing` - load and compile pricing DSL files.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_pricing::{load_from_dsl, parse_pricing_dsl};

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct PricingArgs {
    #[command(subcommand)]
    command: PricingCommand,
}

#[derive(Subcommand, Debug)]
enum PricingCommand {
    /// Parse a DSL file and load its rules into the store.
    Load {
        /// Path to the DSL file.
        source: PathBuf,
    },
    /// Compile a DSL file to JSON without touching the store.
    Compile {
        /// Path to the DSL file.
        source: PathBuf,
        /// Write JSON to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run(config: &TallyConfig, args: PricingArgs) -> Result<(), TallyError> {
    match args.command {
        PricingCommand::Load { source } => {
            let text = std::fs::read_to_string(&source)
                .map_err(|e| TallyError::Config(format!("cannot read {}: {e}", source.display())))?;
            let ctx = AppContext::init(config).await?;
            let count = load_from_dsl(&ctx.markup, &text).await?;
            println!("Loaded {count} markup rules");
        }
        PricingCommand::Compile { source, output } => {
            let text = std::fs::read_to_string(&source)
                .map_err(|e| TallyError::Config(format!("cannot read {}: {e}", source.display())))?;
            let rules = parse_pricing_dsl(&text)?;
            let json = serde_json::to_string_pretty(&rules)
                .map_err(|e| TallyError::Internal(format!("serialization failed: {e}")))?;
            match output {
                Some(path) => std::fs::write(&path, json).map_err(|e| {
                    TallyError::Config(format!("cannot write {}: {e}", path.display()))
                })?,
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}
