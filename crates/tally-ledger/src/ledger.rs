// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only usage event ledger.
//!
//! Events are priced at ingestion: the effective markup for the event's
//! (provider, model, ts) is applied to the raw per-unit cost, the result is
//! converted to the settlement currency, and only the priced cost is
//! persisted. Raw currency and markup are not retained.
//!
//! Malformed ingestion payloads are quarantined in the dead-letter table
//! rather than raised or dropped.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tally_core::{EventStream, SyncStatus, TallyError};
use tally_fx::{convert, RateStore};
use tally_pricing::MarkupRuleStore;
use tally_storage::{map_tr_err, Database};
use tracing::{info, warn};

/// Timestamp format used for all ledger rows; lexicographic order matches
/// chronological order.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A raw usage event as submitted for ingestion.
///
/// `unit_cost` is expressed in `currency`; pricing and conversion happen in
/// [`UsageLedger::add_event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUsageEvent {
    pub event_id: String,
    pub ts: DateTime<Utc>,
    pub customer_id: String,
    pub provider: String,
    pub model: String,
    pub metric_type: String,
    /// Signed; negative units represent a credit/refund.
    pub units: f64,
    pub unit_cost: f64,
    pub currency: String,
    /// Billing cycle, e.g. "2026-05".
    pub cycle: String,
}

/// A stored usage event: priced, converted, and owned by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_id: String,
    pub ts: DateTime<Utc>,
    pub customer_id: String,
    pub provider: String,
    pub model: String,
    pub metric_type: String,
    pub units: f64,
    /// Per-unit cost in the settlement currency, markup applied.
    pub unit_cost: f64,
    pub cycle: String,
    pub sync_status: SyncStatus,
    pub external_record_id: Option<String>,
}

/// A quarantined ingestion payload.
#[derive(Debug, Clone)]
pub struct DeadLetterEvent {
    pub id: i64,
    pub raw: String,
    pub error: String,
    pub ts: String,
}

/// SQLite-backed append-only usage ledger.
///
/// All collaborators are injected: the database handle, the markup rule
/// store, the FX rate store, and an optional fire-and-forget event stream.
pub struct UsageLedger {
    db: Arc<Database>,
    markup: Arc<MarkupRuleStore>,
    rates: Arc<RateStore>,
    settlement_currency: String,
    stream: Option<Arc<dyn EventStream>>,
    stream_topic: String,
}

impl UsageLedger {
    /// Create a ledger over the given stores, settling in `settlement_currency`.
    pub fn new(
        db: Arc<Database>,
        markup: Arc<MarkupRuleStore>,
        rates: Arc<RateStore>,
        settlement_currency: String,
    ) -> Self {
        Self {
            db,
            markup,
            rates,
            settlement_currency,
            stream: None,
            stream_topic: "usage_events".to_string(),
        }
    }

    /// Attach a fire-and-forget event stream publishing to `topic`.
    pub fn with_stream(mut self, stream: Arc<dyn EventStream>, topic: String) -> Self {
        self.stream = Some(stream);
        self.stream_topic = topic;
        self
    }

    /// Price and insert an event; re-insertion with the same `event_id`
    /// replaces the stored record.
    ///
    /// The per-unit cost is multiplied by `1 + effective_markup` and, when
    /// the event currency differs from the settlement currency and a rate
    /// snapshot exists, converted into the settlement currency. An empty
    /// snapshot means no conversion is possible and the amount is used
    /// unmodified; a non-empty snapshot missing either currency is a
    /// [`TallyError::MissingRate`].
    pub async fn add_event(&self, event: &NewUsageEvent) -> Result<(), TallyError> {
        let markup = self
            .markup
            .effective_markup(&event.provider, &event.model, event.ts)
            .await?;
        let mut unit_cost = event.unit_cost * (1.0 + markup);
        if event.currency != self.settlement_currency {
            let rates = self.rates.get(None).await?;
            if !rates.is_empty() {
                unit_cost = convert(unit_cost, &event.currency, &self.settlement_currency, &rates)?;
            }
        }

        let row = event.clone();
        let ts = event.ts.format(TS_FORMAT).to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO usage_events (
                         event_id, ts, customer_id, provider, model,
                         metric_type, units, unit_cost, cycle, sync_status
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending')",
                    params![
                        row.event_id,
                        ts,
                        row.customer_id,
                        row.provider,
                        row.model,
                        row.metric_type,
                        row.units,
                        unit_cost,
                        row.cycle,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(
            event_id = %event.event_id,
            customer_id = %event.customer_id,
            units = event.units,
            unit_cost,
            "usage event recorded"
        );

        // Stream delivery is independent of local durability.
        if let Some(stream) = &self.stream {
            let payload = serde_json::json!({
                "event_id": event.event_id,
                "ts": event.ts.format(TS_FORMAT).to_string(),
                "customer_id": event.customer_id,
                "provider": event.provider,
                "model": event.model,
                "metric_type": event.metric_type,
                "units": event.units,
                "unit_cost": unit_cost,
                "cycle": event.cycle,
            });
            if let Err(e) = stream.publish(&self.stream_topic, payload).await {
                warn!(event_id = %event.event_id, error = %e, "event stream publish failed");
            }
        }

        Ok(())
    }

    /// Validate and coerce a raw ingestion payload.
    ///
    /// Returns `Ok(Some(event))` for well-formed input. Malformed input is
    /// written to the dead-letter table together with the failure reason and
    /// `Ok(None)` is returned; this path never raises for bad payloads and
    /// never drops them silently. The dead-letter write itself is
    /// best-effort.
    pub async fn parse_event(
        &self,
        raw: &serde_json::Value,
    ) -> Result<Option<NewUsageEvent>, TallyError> {
        match coerce_event(raw, &self.settlement_currency) {
            Ok(event) => Ok(Some(event)),
            Err(reason) => {
                warn!(error = %reason, "malformed usage event quarantined");
                let raw_text = raw.to_string();
                let ts = Utc::now().to_rfc3339();
                let result = self
                    .db
                    .connection()
                    .call(move |conn| {
                        conn.execute(
                            "INSERT INTO dead_letter_events (raw, error, ts) VALUES (?1, ?2, ?3)",
                            params![raw_text, reason, ts],
                        )?;
                        Ok(())
                    })
                    .await
                    .map_err(map_tr_err);
                if let Err(e) = result {
                    warn!(error = %e, "dead-letter write failed; payload lost to quarantine");
                }
                Ok(None)
            }
        }
    }

    /// All quarantined payloads, oldest first.
    pub async fn dead_letter_events(&self) -> Result<Vec<DeadLetterEvent>, TallyError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, raw, error, ts FROM dead_letter_events ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok(DeadLetterEvent {
                        id: row.get(0)?,
                        raw: row.get(1)?,
                        error: row.get(2)?,
                        ts: row.get(3)?,
                    })
                })?;
                let mut events = Vec::new();
                for row in rows {
                    events.push(row?);
                }
                Ok(events)
            })
            .await
            .map_err(map_tr_err)
    }

    /// All events recorded against a billing cycle.
    pub async fn get_usage_events_by_cycle(
        &self,
        cycle: &str,
    ) -> Result<Vec<UsageEvent>, TallyError> {
        let cycle = cycle.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_EVENT} WHERE cycle = ?1 ORDER BY ts, event_id"
                ))?;
                let rows = stmt.query_map(params![cycle], row_to_event)?;
                collect_events(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Events between `start` and `end` dates, inclusive on both ends,
    /// compared by date only (not time-of-day).
    pub async fn get_usage_events_by_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<UsageEvent>, TallyError> {
        let start = start.to_string();
        let end = end.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_EVENT} WHERE date(ts) >= date(?1) AND date(ts) <= date(?2)
                     ORDER BY ts, event_id"
                ))?;
                let rows = stmt.query_map(params![start, end], row_to_event)?;
                collect_events(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Spend totals (`units * unit_cost`) bucketed per hour for the last
    /// `hours` hours, oldest first. The window ends at the top of the
    /// current hour; a bucket with no events totals 0.0.
    pub async fn get_hourly_totals(&self, hours: u32) -> Result<Vec<f64>, TallyError> {
        let end = Utc::now()
            .duration_trunc(TimeDelta::hours(1))
            .map_err(|e| TallyError::Internal(format!("clock truncation failed: {e}")))?;
        let start = end - TimeDelta::hours(i64::from(hours));
        let start_s = start.format(TS_FORMAT).to_string();
        let end_s = end.format(TS_FORMAT).to_string();

        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ts, units, unit_cost FROM usage_events
                     WHERE ts >= ?1 AND ts < ?2",
                )?;
                let rows = stmt.query_map(params![start_s, end_s], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(map_tr_err)?;

        let mut totals = vec![0.0; hours as usize];
        for (ts, units, unit_cost) in rows {
            let Ok(ts) = parse_ts(&ts) else {
                warn!(ts, "skipping event with unparseable stored timestamp");
                continue;
            };
            let idx = (ts - start).num_seconds() / 3600;
            if (0..i64::from(hours)).contains(&idx) {
                totals[idx as usize] += units * unit_cost;
            }
        }
        Ok(totals)
    }

    /// Transition an event from pending to synced, recording the external
    /// record id. Safe to repeat.
    pub async fn mark_synced(
        &self,
        event_id: &str,
        external_record_id: &str,
    ) -> Result<(), TallyError> {
        let event_id = event_id.to_string();
        let external_record_id = external_record_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE usage_events
                     SET sync_status = 'synced', external_record_id = ?1
                     WHERE event_id = ?2",
                    params![external_record_id, event_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Events not yet pushed to the external usage recorder.
    pub async fn pending_events(&self) -> Result<Vec<UsageEvent>, TallyError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_EVENT} WHERE sync_status = 'pending' ORDER BY ts, event_id"
                ))?;
                let rows = stmt.query_map([], row_to_event)?;
                collect_events(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

const SELECT_EVENT: &str = "SELECT event_id, ts, customer_id, provider, model, metric_type,
        units, unit_cost, cycle, sync_status, external_record_id
 FROM usage_events";

fn parse_ts(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<UsageEvent, rusqlite::Error> {
    let ts: String = row.get(1)?;
    let ts = parse_ts(&ts).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let sync_status: String = row.get(9)?;
    let sync_status = SyncStatus::from_str(&sync_status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(UsageEvent {
        event_id: row.get(0)?,
        ts,
        customer_id: row.get(2)?,
        provider: row.get(3)?,
        model: row.get(4)?,
        metric_type: row.get(5)?,
        units: row.get(6)?,
        unit_cost: row.get(7)?,
        cycle: row.get(8)?,
        sync_status,
        external_record_id: row.get(10)?,
    })
}

fn collect_events<F>(
    rows: rusqlite::MappedRows<'_, F>,
) -> Result<Vec<UsageEvent>, rusqlite::Error>
where
    F: FnMut(&rusqlite::Row<'_>) -> Result<UsageEvent, rusqlite::Error>,
{
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

type RawObject = serde_json::Map<String, serde_json::Value>;

fn required_field<'a>(obj: &'a RawObject, name: &str) -> Result<&'a serde_json::Value, String> {
    obj.get(name).ok_or_else(|| format!("missing field `{name}`"))
}

fn string_field(obj: &RawObject, name: &str) -> Result<String, String> {
    required_field(obj, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("invalid {name}: expected string"))
}

fn number_field(obj: &RawObject, name: &str) -> Result<f64, String> {
    match required_field(obj, name)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("invalid {name}: not a finite number")),
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| format!("invalid {name}: `{s}` is not numeric")),
        _ => Err(format!("invalid {name}: expected number")),
    }
}

/// Validate and type-coerce a raw JSON payload into a [`NewUsageEvent`].
fn coerce_event(raw: &serde_json::Value, settlement_currency: &str) -> Result<NewUsageEvent, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "invalid payload: not a JSON object".to_string())?;

    let event_id = string_field(obj, "event_id")?;
    let ts_raw = string_field(obj, "ts")?;
    let ts = parse_ts(&ts_raw).map_err(|_| format!("invalid timestamp: `{ts_raw}`"))?;
    let customer_id = string_field(obj, "customer_id")?;
    let provider = string_field(obj, "provider")?;
    let model = string_field(obj, "model")?;
    let metric_type = string_field(obj, "metric_type")?;
    let units = number_field(obj, "units")?;
    let unit_cost = number_field(obj, "unit_cost")?;
    let currency = match obj.get("currency") {
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "invalid currency: expected string".to_string())?,
        None => settlement_currency.to_string(),
    };
    let cycle = match obj.get("cycle") {
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "invalid cycle: expected string".to_string())?,
        None => ts.format("%Y-%m").to_string(),
    };

    Ok(NewUsageEvent {
        event_id,
        ts,
        customer_id,
        provider,
        model,
        metric_type,
        units,
        unit_cost,
        currency,
        cycle,
    })
}
