// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-customer monthly budget ceilings.
//!
//! Budgets are used for alerting only; they never affect pricing or
//! ingestion.

use std::sync::Arc;

use rusqlite::params;
use tally_core::TallyError;
use tally_storage::{map_tr_err, Database};

/// SQLite-backed store of per-customer monthly spend ceilings.
pub struct BudgetStore {
    db: Arc<Database>,
}

impl BudgetStore {
    /// Create a budget store over the given database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or update the monthly limit for a customer.
    pub async fn set_budget(&self, customer_id: &str, monthly_limit: f64) -> Result<(), TallyError> {
        let customer_id = customer_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO budgets (customer_id, monthly_limit) VALUES (?1, ?2)",
                    params![customer_id, monthly_limit],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// The monthly limit for a customer, if one is set.
    pub async fn get_budget(&self, customer_id: &str) -> Result<Option<f64>, TallyError> {
        let customer_id = customer_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT monthly_limit FROM budgets WHERE customer_id = ?1",
                    params![customer_id],
                    |row| row.get::<_, f64>(0),
                );
                match result {
                    Ok(limit) => Ok(Some(limit)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// All `(customer_id, monthly_limit)` pairs, ordered by customer.
    pub async fn list_budgets(&self) -> Result<Vec<(String, f64)>, TallyError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT customer_id, monthly_limit FROM budgets ORDER BY customer_id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?;
                let mut budgets = Vec::new();
                for row in rows {
                    budgets.push(row?);
                }
                Ok(budgets)
            })
            .await
            .map_err(map_tr_err)
    }
}
