// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash-chained audit log of hashed prompts.
//!
//! Prompts are never stored; only their SHA-256 digest is. Each record's
//! `chain_hash` is `SHA-256(previous chain_hash for the customer ||
//! prompt_hash)`, with the empty string standing in for the first record.
//! Chains are per-customer: two customers' histories never interleave or
//! affect each other's verification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use sha2::{Digest, Sha256};
use tally_core::TallyError;
use tally_storage::{map_tr_err, Database};
use tracing::warn;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A stored audit record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_id: String,
    pub ts: String,
    pub customer_id: String,
    pub prompt_hash: String,
    pub token_count: i64,
    /// Chain head after this event; see module docs for the formula.
    pub chain_hash: String,
}

/// SQLite-backed audit log.
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    /// Create an audit log over the given database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Hash `prompt` and append a record, extending the customer's chain.
    ///
    /// `ts` defaults to now. The chain-previous record is the most recent
    /// existing record for the customer ordered by timestamp.
    pub async fn add_event(
        &self,
        event_id: &str,
        customer_id: &str,
        prompt: &str,
        token_count: i64,
        ts: Option<DateTime<Utc>>,
    ) -> Result<(), TallyError> {
        let event_id = event_id.to_string();
        let customer_id = customer_id.to_string();
        let prompt_hash = sha256_hex(prompt.as_bytes());
        let ts = ts.unwrap_or_else(Utc::now).format(TS_FORMAT).to_string();

        // Chain read and append happen in one call on the single writer
        // thread, so two appends for the same customer cannot race.
        self.db
            .connection()
            .call(move |conn| {
                let prev: String = match conn.query_row(
                    "SELECT chain_hash FROM audit_events
                     WHERE customer_id = ?1 ORDER BY ts DESC, event_id DESC LIMIT 1",
                    params![customer_id],
                    |row| row.get(0),
                ) {
                    Ok(hash) => hash,
                    Err(rusqlite::Error::QueryReturnedNoRows) => String::new(),
                    Err(e) => return Err(e),
                };
                let chain_hash = chain_hash(&prev, &prompt_hash);
                conn.execute(
                    "INSERT OR REPLACE INTO audit_events
                         (event_id, ts, customer_id, prompt_hash, token_count, chain_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![event_id, ts, customer_id, prompt_hash, token_count, chain_hash],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Recompute every chain from its oldest record forward.
    ///
    /// With `customer_id` set, only that customer's chain is checked;
    /// otherwise every customer's. Returns `false` on the first mismatch and
    /// `true` when every record matches, including customers with zero
    /// records. A broken chain is an operational finding, not an error.
    pub async fn verify_chain(&self, customer_id: Option<&str>) -> Result<bool, TallyError> {
        let customer_id = customer_id.map(|c| c.to_string());
        let intact = self
            .db
            .connection()
            .call(move |conn| {
                let customers: Vec<String> = match &customer_id {
                    Some(c) => vec![c.clone()],
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT DISTINCT customer_id FROM audit_events ORDER BY customer_id",
                        )?;
                        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                        let mut out = Vec::new();
                        for row in rows {
                            out.push(row?);
                        }
                        out
                    }
                };

                for customer in customers {
                    let mut stmt = conn.prepare(
                        "SELECT prompt_hash, chain_hash FROM audit_events
                         WHERE customer_id = ?1 ORDER BY ts, event_id",
                    )?;
                    let rows = stmt.query_map(params![customer], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    let mut prev = String::new();
                    for row in rows {
                        let (prompt_hash, stored) = row?;
                        let expected = chain_hash(&prev, &prompt_hash);
                        if expected != stored {
                            return Ok(false);
                        }
                        prev = stored;
                    }
                }
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if !intact {
            warn!("audit chain verification failed");
        }
        Ok(intact)
    }

    /// All records, optionally filtered by customer, ordered by timestamp.
    pub async fn list_events(
        &self,
        customer_id: Option<&str>,
    ) -> Result<Vec<AuditEvent>, TallyError> {
        let customer_id = customer_id.map(|c| c.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let base = "SELECT event_id, ts, customer_id, prompt_hash, token_count, chain_hash
                            FROM audit_events";
                let map_row = |row: &rusqlite::Row<'_>| {
                    Ok(AuditEvent {
                        event_id: row.get(0)?,
                        ts: row.get(1)?,
                        customer_id: row.get(2)?,
                        prompt_hash: row.get(3)?,
                        token_count: row.get(4)?,
                        chain_hash: row.get(5)?,
                    })
                };
                let mut events = Vec::new();
                match &customer_id {
                    Some(customer) => {
                        let mut stmt = conn
                            .prepare(&format!("{base} WHERE customer_id = ?1 ORDER BY ts, event_id"))?;
                        let rows = stmt.query_map(params![customer], map_row)?;
                        for row in rows {
                            events.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!("{base} ORDER BY ts, event_id"))?;
                        let rows = stmt.query_map([], map_row)?;
                        for row in rows {
                            events.push(row?);
                        }
                    }
                }
                Ok(events)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `SHA-256(prev_chain_hash || prompt_hash)`, both as hex strings.
fn chain_hash(prev: &str, prompt_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(prompt_hash.as_bytes());
    hex::encode(hasher.finalize())
}
