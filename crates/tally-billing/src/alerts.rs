// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget overrun alerting.
//!
//! Compares a cycle's per-customer spend against the configured monthly
//! ceilings and sends a webhook message for each overrun. Webhook delivery
//! is best-effort; a failed send never blocks the remaining checks.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{AlertSink, TallyError};
use tally_ledger::{BudgetStore, UsageLedger};
use tracing::{info, warn};

/// Check `cycle` spend against all budgets, alerting on each overrun.
///
/// Returns the number of alerts delivered.
pub async fn run_budget_check(
    ledger: &UsageLedger,
    budgets: &BudgetStore,
    alert: &dyn AlertSink,
    webhook_url: &str,
    cycle: &str,
) -> Result<usize, TallyError> {
    let events = ledger.get_usage_events_by_cycle(cycle).await?;
    let mut spend: HashMap<String, f64> = HashMap::new();
    for event in &events {
        *spend.entry(event.customer_id.clone()).or_insert(0.0) += event.units * event.unit_cost;
    }

    let mut delivered = 0;
    for (customer_id, limit) in budgets.list_budgets().await? {
        let total = spend.get(&customer_id).copied().unwrap_or(0.0);
        if total > limit {
            let message =
                format!("Customer {customer_id} exceeded budget: {total:.2} / {limit:.2}");
            match alert.send(webhook_url, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        customer_id = %customer_id,
                        error = %e,
                        "budget alert delivery failed; continuing"
                    );
                }
            }
        }
    }
    info!(cycle, delivered, "budget check complete");
    Ok(delivered)
}

/// Webhook alert sink POSTing `{"text": message}` as JSON.
pub struct WebhookAlertSink {
    client: reqwest::Client,
}

impl WebhookAlertSink {
    /// Build an alert sink with a bounded request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Sink {
                sink: "webhook".to_string(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, url: &str, message: &str) -> Result<(), TallyError> {
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .map_err(|e| TallyError::Sink {
                sink: "webhook".to_string(),
                source: Box::new(e),
            })?;
        if !response.status().is_success() {
            return Err(TallyError::Sink {
                sink: "webhook".to_string(),
                source: format!("HTTP {}", response.status()).into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tally_fx::RateStore;
    use tally_ledger::NewUsageEvent;
    use tally_pricing::MarkupRuleStore;
    use tally_storage::Database;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        ledger: UsageLedger,
        budgets: BudgetStore,
    }

    async fn harness() -> Harness {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        let ledger = UsageLedger::new(db.clone(), markup, rates, "USD".to_string());
        let budgets = BudgetStore::new(db);
        Harness { ledger, budgets }
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

    struct CapturingAlert {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for CapturingAlert {
        async fn send(&self, _url: &str, message: &str) -> Result<(), TallyError> {
            if self.fail {
                return Err(TallyError::Sink {
                    sink: "webhook".to_string(),
                    source: "timeout".into(),
                });
            }
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn alerts_on_overrun_only() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "spender", 100.0, 2.0)).await.unwrap();
        h.ledger.add_event(&event("e2", "frugal", 1.0, 2.0)).await.unwrap();
        h.budgets.set_budget("spender", 100.0).await.unwrap();
        h.budgets.set_budget("frugal", 100.0).await.unwrap();

        let alert = CapturingAlert {
            messages: Mutex::new(Vec::new()),
            fail: false,
        };
        let delivered =
            run_budget_check(&h.ledger, &h.budgets, &alert, "https://hooks.test/x", "2026-05")
                .await
                .unwrap();
        assert_eq!(delivered, 1);

        let messages = alert.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("spender"));
        assert!(messages[0].contains("200.00 / 100.00"));
    }

    #[tokio::test]
    async fn spend_at_limit_does_not_alert() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 50.0, 2.0)).await.unwrap();
        h.budgets.set_budget("cust", 100.0).await.unwrap();

        let alert = CapturingAlert {
            messages: Mutex::new(Vec::new()),
            fail: false,
        };
        let delivered =
            run_budget_check(&h.ledger, &h.budgets, &alert, "https://hooks.test/x", "2026-05")
                .await
                .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn webhook_failure_does_not_abort_check() {
        let h = harness().await;
        h.ledger.add_event(&event("e1", "cust", 100.0, 2.0)).await.unwrap();
        h.budgets.set_budget("cust", 10.0).await.unwrap();

        let alert = CapturingAlert {
            messages: Mutex::new(Vec::new()),
            fail: true,
        };
        let delivered =
            run_budget_check(&h.ledger, &h.budgets, &alert, "https://hooks.test/x", "2026-05")
                .await
                .unwrap();
        assert_eq!(delivered, 0, "failed delivery is not counted");
    }

    #[tokio::test]
    async fn webhook_sink_posts_json_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("exceeded budget"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = WebhookAlertSink::new(Duration::from_secs(2)).unwrap();
        sink.send(&server.uri(), "Customer cust exceeded budget: 12.00 / 10.00")
            .await
            .unwrap();
    }
}
