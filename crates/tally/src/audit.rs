// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally audit` - hash chain verification.

use clap::{Args, Subcommand};
use tally_config::TallyConfig;
use tally_core::TallyError;

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct AuditArgs {
    #[command(subcommand)]
    command: AuditCommand,
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Recompute and verify the hash chains.
    Verify {
        /// Verify only this customer's chain.
        #[arg(long)]
        customer: Option<String>,
    },
}

pub async fn run(config: &TallyConfig, args: AuditArgs) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    match args.command {
        AuditCommand::Verify { customer } => {
            let intact = ctx.audit.verify_chain(customer.as_deref()).await?;
            if intact {
                println!("audit chain intact");
            } else {
                println!("audit chain BROKEN");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
