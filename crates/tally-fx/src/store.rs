// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Date-stamped FX rate snapshots and conversion.
//!
//! All rates in one snapshot are expressed against a fixed base currency
//! (rate 1.0); conversion between two currencies triangulates through it.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;
use tally_core::TallyError;
use tally_storage::{map_tr_err, Database};
use tracing::info;

/// Convert `amount` from one currency to another using a rate snapshot.
///
/// Errors with [`TallyError::MissingRate`] naming whichever currency is
/// absent from `rates`. Converting a currency to itself is numerically a
/// no-op because the rate ratio is 1.
pub fn convert(
    amount: f64,
    from: &str,
    to: &str,
    rates: &HashMap<String, f64>,
) -> Result<f64, TallyError> {
    let from_rate = rates.get(from).ok_or_else(|| TallyError::MissingRate {
        currency: from.to_string(),
    })?;
    let to_rate = rates.get(to).ok_or_else(|| TallyError::MissingRate {
        currency: to.to_string(),
    })?;
    Ok((amount / from_rate) * to_rate)
}

/// Persistent store of per-date FX rate snapshots.
pub struct RateStore {
    db: Arc<Database>,
}

impl RateStore {
    /// Create a rate store over the given database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Upsert all entries of a snapshot for `date` (ISO 8601 date).
    pub async fn store(
        &self,
        rates: &HashMap<String, f64>,
        date: &str,
    ) -> Result<(), TallyError> {
        let date = date.to_string();
        let rates = rates.clone();
        let count = rates.len();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (currency, rate) in &rates {
                    tx.execute(
                        "INSERT OR REPLACE INTO fx_rates (date, currency, rate) VALUES (?1, ?2, ?3)",
                        params![date, currency, rate],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        info!(count, "FX snapshot stored");
        Ok(())
    }

    /// Load the snapshot for `date`, or the most recent one when `date` is
    /// `None`.
    ///
    /// Returns an empty mapping when nothing is stored; callers treat that
    /// as "no conversion possible, use amount unmodified".
    pub async fn get(&self, date: Option<&str>) -> Result<HashMap<String, f64>, TallyError> {
        let date = date.map(|d| d.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let date = match date {
                    Some(d) => Some(d),
                    None => conn.query_row("SELECT MAX(date) FROM fx_rates", [], |row| {
                        row.get::<_, Option<String>>(0)
                    })?,
                };
                let Some(date) = date else {
                    return Ok(HashMap::new());
                };
                let mut stmt =
                    conn.prepare("SELECT currency, rate FROM fx_rates WHERE date = ?1")?;
                let rows = stmt.query_map(params![date], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?;
                let mut rates = HashMap::new();
                for row in rows {
                    let (currency, rate) = row?;
                    rates.insert(currency, rate);
                }
                Ok(rates)
            })
            .await
            .map_err(map_tr_err)
    }
}
