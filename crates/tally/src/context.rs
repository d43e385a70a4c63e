// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component wiring for CLI commands.
//!
//! Every component takes its storage handle by constructor injection; this
//! module builds the shared graph once per invocation.

use std::sync::Arc;

use tally_audit::AuditLog;
use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_fx::RateStore;
use tally_ledger::{BudgetStore, UsageLedger};
use tally_pricing::MarkupRuleStore;
use tally_storage::Database;

/// The wired component graph for one CLI invocation.
pub struct AppContext {
    pub db: Arc<Database>,
    pub markup: Arc<MarkupRuleStore>,
    pub rates: Arc<RateStore>,
    pub ledger: Arc<UsageLedger>,
    pub budgets: Arc<BudgetStore>,
    pub audit: Arc<AuditLog>,
}

impl AppContext {
    /// Open the configured database and wire all stores.
    pub async fn init(config: &TallyConfig) -> Result<Self, TallyError> {
        let db = Arc::new(Database::open(&config.storage.database_path).await?);
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        let ledger = Arc::new(UsageLedger::new(
            db.clone(),
            markup.clone(),
            rates.clone(),
            config.ledger.settlement_currency.clone(),
        ));
        let budgets = Arc::new(BudgetStore::new(db.clone()));
        let audit = Arc::new(AuditLog::new(db.clone()));
        Ok(Self {
            db,
            markup,
            rates,
            ledger,
            budgets,
            audit,
        })
    }
}
