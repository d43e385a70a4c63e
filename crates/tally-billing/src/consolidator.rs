// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-cycle invoice and credit-note consolidation.
//!
//! One invoice per (customer, cycle); recomputing a cycle overwrites.
//! Negative-unit usage aggregates into a credit note linked to the invoice
//! by naming convention (`{invoice_id}-credit`). Accounting sinks are
//! best-effort: one customer's sink failure never aborts the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tally_core::{AccountingSink, ConsolidatedInvoice, TallyError};
use tally_fx::{convert, RateStore};
use tally_ledger::UsageLedger;
use tally_storage::{map_tr_err, Database};
use tracing::{info, warn};

/// A stored invoice row.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub cycle: String,
    pub amount: f64,
}

/// A stored credit note row.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditNote {
    pub id: String,
    pub invoice_id: String,
    pub amount: f64,
    pub description: Option<String>,
}

/// One consolidation result entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice_id: String,
    pub total: f64,
    pub credit: f64,
}

/// Aggregates a cycle's usage events into invoices and credit notes and
/// forwards them to the configured accounting sinks.
pub struct BillingConsolidator {
    db: Arc<Database>,
    ledger: Arc<UsageLedger>,
    rates: Arc<RateStore>,
    settlement_currency: String,
    sinks: Vec<Arc<dyn AccountingSink>>,
}

impl BillingConsolidator {
    /// Create a consolidator over the given stores and sinks.
    pub fn new(
        db: Arc<Database>,
        ledger: Arc<UsageLedger>,
        rates: Arc<RateStore>,
        settlement_currency: String,
        sinks: Vec<Arc<dyn AccountingSink>>,
    ) -> Self {
        Self {
            db,
            ledger,
            rates,
            settlement_currency,
            sinks,
        }
    }

    /// Consolidate `cycle` into per-customer invoices in `target_currency`.
    ///
    /// Gross sums events with `units >= 0`; credit is the positive magnitude
    /// of the rest. The gross amount is converted to `target_currency` when
    /// it differs from the settlement currency and a rate snapshot exists.
    /// Returns summaries in ascending customer order.
    pub async fn consolidate(
        &self,
        cycle: &str,
        target_currency: &str,
    ) -> Result<Vec<InvoiceSummary>, TallyError> {
        let events = self.ledger.get_usage_events_by_cycle(cycle).await?;

        let mut gross: BTreeMap<String, f64> = BTreeMap::new();
        let mut credits: BTreeMap<String, f64> = BTreeMap::new();
        for event in &events {
            let amount = event.units * event.unit_cost;
            if event.units >= 0.0 {
                *gross.entry(event.customer_id.clone()).or_insert(0.0) += amount;
            } else {
                *credits.entry(event.customer_id.clone()).or_insert(0.0) += -amount;
            }
        }

        let rates = self.rates.get(None).await?;
        let mut summaries = Vec::new();
        for (customer_id, total) in &gross {
            let mut amount = *total;
            if target_currency != self.settlement_currency && !rates.is_empty() {
                amount = convert(amount, &self.settlement_currency, target_currency, &rates)?;
            }

            let invoice_id = format!("{customer_id}-{cycle}");
            let credit = credits.get(customer_id).copied().unwrap_or(0.0);
            self.write_invoice(&invoice_id, customer_id, cycle, amount)
                .await?;
            if credit != 0.0 {
                let note_id = format!("{invoice_id}-credit");
                self.write_credit_note(&note_id, &invoice_id, credit, "Usage credit")
                    .await?;
            }

            let outbound = ConsolidatedInvoice {
                invoice_id: invoice_id.clone(),
                customer_id: customer_id.clone(),
                amount,
                cycle: cycle.to_string(),
                credit,
                currency: target_currency.to_string(),
            };
            for sink in &self.sinks {
                if let Err(e) = sink.push_invoice(&outbound).await {
                    warn!(
                        sink = sink.name(),
                        invoice_id = %outbound.invoice_id,
                        error = %e,
                        "accounting sink push failed; continuing"
                    );
                }
            }

            summaries.push(InvoiceSummary {
                invoice_id,
                total: amount,
                credit,
            });
        }

        info!(
            cycle,
            invoices = summaries.len(),
            currency = target_currency,
            "cycle consolidated"
        );
        Ok(summaries)
    }

    async fn write_invoice(
        &self,
        id: &str,
        customer_id: &str,
        cycle: &str,
        amount: f64,
    ) -> Result<(), TallyError> {
        let id = id.to_string();
        let customer_id = customer_id.to_string();
        let cycle = cycle.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO invoices (id, customer_id, cycle, amount)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, customer_id, cycle, amount],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn write_credit_note(
        &self,
        id: &str,
        invoice_id: &str,
        amount: f64,
        description: &str,
    ) -> Result<(), TallyError> {
        let id = id.to_string();
        let invoice_id = invoice_id.to_string();
        let description = description.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO credit_notes (id, invoice_id, amount, description)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, invoice_id, amount, description],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetch a stored invoice by id.
    pub async fn invoice(&self, id: &str) -> Result<Option<Invoice>, TallyError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT id, customer_id, cycle, amount FROM invoices WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Invoice {
                            id: row.get(0)?,
                            customer_id: row.get(1)?,
                            cycle: row.get(2)?,
                            amount: row.get(3)?,
                        })
                    },
                );
                match result {
                    Ok(invoice) => Ok(Some(invoice)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetch a stored credit note by id.
    pub async fn credit_note(&self, id: &str) -> Result<Option<CreditNote>, TallyError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT id, invoice_id, amount, description FROM credit_notes WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(CreditNote {
                            id: row.get(0)?,
                            invoice_id: row.get(1)?,
                            amount: row.get(2)?,
                            description: row.get(3)?,
                        })
                    },
                );
                match result {
                    Ok(note) => Ok(Some(note)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tally_ledger::NewUsageEvent;
    use tally_pricing::MarkupRuleStore;

    struct Harness {
        db: Arc<Database>,
        ledger: Arc<UsageLedger>,
        rates: Arc<RateStore>,
    }

    async fn harness() -> Harness {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        let ledger = Arc::new(UsageLedger::new(
            db.clone(),
            markup,
            rates.clone(),
            "USD".to_string(),
        ));
        Harness { db, ledger, rates }
    }

    fn consolidator(h: &Harness, sinks: Vec<Arc<dyn AccountingSink>>) -> BillingConsolidator {
        BillingConsolidator::new(
            h.db.clone(),
            h.ledger.clone(),
            h.rates.clone(),
            "USD".to_string(),
            sinks,
        )
    }

    fn event(event_id: &str, customer: &str, units: f64, unit_cost: f64) -> NewUsageEvent {
        NewUsageEvent {
            event_id: event_id.to_string(),
            ts: "2026-05-10T10:00:00Z".parse().unwrap(),
            customer_id: customer.to_string(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            metric_type: "tokens".to_string(),
            units,
            unit_cost,
            currency: "USD".to_string(),
            cycle: "2026-05".to_string(),
        }
    }

    struct CapturingSink {
        pushed: Mutex<Vec<ConsolidatedInvoice>>,
    }

    #[async_trait]
    impl AccountingSink for CapturingSink {
        fn name(&self) -> &str {
            "capture"
        }

        async fn push_invoice(&self, invoice: &ConsolidatedInvoice) -> Result<(), TallyError> {
            self.pushed.lock().unwrap().push(invoice.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AccountingSink for FailingSink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn push_invoice(&self, _invoice: &ConsolidatedInvoice) -> Result<(), TallyError> {
            Err(TallyError::Sink {
                sink: "flaky".to_string(),
                source: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn consolidates_gross_and_credit() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 10.0, 2.0)).await.unwrap();
        h.ledger.add_event(&event("e2", "cust", -2.0, 2.0)).await.unwrap();

        let c = consolidator(&h, vec![]);
        let summaries = c.consolidate("2026-05", "USD").await.unwrap();
        assert_eq!(
            summaries,
            vec![InvoiceSummary {
                invoice_id: "cust-2026-05".to_string(),
                total: 20.0,
                credit: 4.0,
            }]
        );

        let invoice = c.invoice("cust-2026-05").await.unwrap().unwrap();
        assert!((invoice.amount - 20.0).abs() < 1e-9);
        let note = c.credit_note("cust-2026-05-credit").await.unwrap().unwrap();
        assert!((note.amount - 4.0).abs() < 1e-9);
        assert_eq!(note.invoice_id, "cust-2026-05");
    }

    #[tokio::test]
    async fn converts_gross_to_target_currency() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 10.0, 2.0)).await.unwrap();
        h.rates
            .store(
                &HashMap::from([("USD".to_string(), 1.0), ("EUR".to_string(), 0.9)]),
                "2026-05-31",
            )
            .await
            .unwrap();

        let c = consolidator(&h, vec![]);
        let summaries = c.consolidate("2026-05", "EUR").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!((summaries[0].total - 18.0).abs() < 1e-9);
        assert_eq!(summaries[0].credit, 0.0);
    }

    #[tokio::test]
    async fn credit_only_customer_gets_no_invoice() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "refund-only", -5.0, 1.0)).await.unwrap();

        let c = consolidator(&h, vec![]);
        let summaries = c.consolidate("2026-05", "USD").await.unwrap();
        assert!(summaries.is_empty());
        assert!(c.invoice("refund-only-2026-05").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconsolidation_overwrites_invoice() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 10.0, 2.0)).await.unwrap();

        let c = consolidator(&h, vec![]);
        c.consolidate("2026-05", "USD").await.unwrap();
        // A late event arrives; the rerun replaces the invoice amount.
        h.ledger.add_event(&event("e2", "cust", 5.0, 2.0)).await.unwrap();
        c.consolidate("2026-05", "USD").await.unwrap();

        let invoice = c.invoice("cust-2026-05").await.unwrap().unwrap();
        assert!((invoice.amount - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn summaries_are_in_customer_order() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "zeta", 1.0, 1.0)).await.unwrap();
        h.ledger.add_event(&event("e2", "alpha", 1.0, 1.0)).await.unwrap();

        let c = consolidator(&h, vec![]);
        let summaries = c.consolidate("2026-05", "USD").await.unwrap();
        let ids: Vec<_> = summaries.iter().map(|s| s.invoice_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha-2026-05", "zeta-2026-05"]);
    }

    #[tokio::test]
    async fn sinks_receive_consolidated_invoices() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 10.0, 2.0)).await.unwrap();
        h.ledger.add_event(&event("e2", "cust", -2.0, 2.0)).await.unwrap();

        let sink = Arc::new(CapturingSink {
            pushed: Mutex::new(Vec::new()),
        });
        let c = consolidator(&h, vec![sink.clone()]);
        c.consolidate("2026-05", "USD").await.unwrap();

        let pushed = sink.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].invoice_id, "cust-2026-05");
        assert!((pushed[0].amount - 20.0).abs() < 1e-9);
        assert!((pushed[0].credit - 4.0).abs() < 1e-9);
        assert_eq!(pushed[0].currency, "USD");
    }

    #[tokio::test]
    async fn sink_failure_does_not_abort_other_customers() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "alpha", 1.0, 1.0)).await.unwrap();
        h.ledger.add_event(&event("e2", "beta", 2.0, 1.0)).await.unwrap();

        let capture = Arc::new(CapturingSink {
            pushed: Mutex::new(Vec::new()),
        });
        let c = consolidator(&h, vec![Arc::new(FailingSink), capture.clone()]);
        let summaries = c.consolidate("2026-05", "USD").await.unwrap();

        assert_eq!(summaries.len(), 2, "both customers consolidated");
        assert_eq!(capture.pushed.lock().unwrap().len(), 2, "healthy sink saw both");
        assert!(c.invoice("alpha-2026-05").await.unwrap().is_some());
        assert!(c.invoice("beta-2026-05").await.unwrap().is_some());
    }
}
