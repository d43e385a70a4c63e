// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push pending ledger events to the external usage recorder.
//!
//! Each event is pushed at most once: an event is marked synced only after
//! the recorder confirms it, and synced events are never pushed again. A
//! per-event failure leaves that event pending for the next run and never
//! aborts the batch.

use std::time::Duration;

use async_trait::async_trait;
use tally_core::{TallyError, UsageRecorder};
use tally_ledger::UsageLedger;
use tracing::{info, warn};

/// Push all pending events to `recorder`, marking each synced on success.
///
/// Returns the number of events synced this run.
pub async fn sync_usage_events(
    ledger: &UsageLedger,
    recorder: &dyn UsageRecorder,
) -> Result<usize, TallyError> {
    let events = ledger.pending_events().await?;
    let mut synced = 0;
    for event in &events {
        match recorder
            .create_usage_record(&event.metric_type, event.units, event.ts.timestamp())
            .await
        {
            Ok(record_id) => {
                ledger.mark_synced(&event.event_id, &record_id).await?;
                synced += 1;
            }
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "usage record push failed; event stays pending"
                );
            }
        }
    }
    info!(synced, pending = events.len() - synced, "usage sync pass complete");
    Ok(synced)
}

/// Usage recorder client for a Stripe-style metered billing API.
///
/// Posts form-encoded usage records with basic auth; the response's `id`
/// field becomes the external record id.
pub struct StripeUsageRecorder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl StripeUsageRecorder {
    const API_URL: &'static str = "https://api.stripe.com/v1/usage_records";

    /// Build a recorder client with a bounded request timeout.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Sink {
                sink: "stripe".to_string(),
                source: Box::new(e),
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: Self::API_URL.to_string(),
        })
    }

    /// Override the endpoint (for tests).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl UsageRecorder for StripeUsageRecorder {
    async fn create_usage_record(
        &self,
        subscription_item: &str,
        quantity: f64,
        timestamp: i64,
    ) -> Result<String, TallyError> {
        let form = [
            ("subscription_item", subscription_item.to_string()),
            ("quantity", quantity.to_string()),
            ("timestamp", timestamp.to_string()),
            ("action", "increment".to_string()),
        ];
        let response = self
            .client
            .post(&self.base_url)
            .basic_auth(&self.api_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| TallyError::Sink {
                sink: "stripe".to_string(),
                source: Box::new(e),
            })?;
        if !response.status().is_success() {
            return Err(TallyError::Sink {
                sink: "stripe".to_string(),
                source: format!("HTTP {}", response.status()).into(),
            });
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| TallyError::Sink {
                sink: "stripe".to_string(),
                source: Box::new(e),
            })?;
        Ok(body
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tally_core::SyncStatus;
    use tally_fx::RateStore;
    use tally_ledger::NewUsageEvent;
    use tally_pricing::MarkupRuleStore;
    use tally_storage::Database;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_ledger() -> UsageLedger {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        UsageLedger::new(db, markup, rates, "USD".to_string())
    }

    fn event(event_id: &str, metric_type: &str) -> NewUsageEvent {
        NewUsageEvent {
            event_id: event_id.to_string(),
            ts: "2026-05-10T10:00:00Z".parse().unwrap(),
            customer_id: "cust".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            metric_type: metric_type.to_string(),
            units: 5.0,
            unit_cost: 1.0,
            currency: "USD".to_string(),
            cycle: "2026-05".to_string(),
        }
    }

    /// Recorder that fails for a configured subscription item.
    struct SelectiveRecorder {
        fail_item: String,
        recorded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UsageRecorder for SelectiveRecorder {
        async fn create_usage_record(
            &self,
            subscription_item: &str,
            _quantity: f64,
            _timestamp: i64,
        ) -> Result<String, TallyError> {
            if subscription_item == self.fail_item {
                return Err(TallyError::Sink {
                    sink: "stripe".to_string(),
                    source: "rate limited".into(),
                });
            }
            self.recorded
                .lock()
                .unwrap()
                .push(subscription_item.to_string());
            Ok(format!("usage-{subscription_item}"))
        }
    }

    #[tokio::test]
    async fn syncs_pending_events_and_marks_them() {
        let ledger = test_ledger().await;
        ledger.add_event(&event("e1", "tokens")).await.unwrap();
        ledger.add_event(&event("e2", "images")).await.unwrap();

        let recorder = SelectiveRecorder {
            fail_item: String::new(),
            recorded: Mutex::new(Vec::new()),
        };
        let synced = sync_usage_events(&ledger, &recorder).await.unwrap();
        assert_eq!(synced, 2);
        assert!(ledger.pending_events().await.unwrap().is_empty());

        let stored = ledger.get_usage_events_by_cycle("2026-05").await.unwrap();
        for event in &stored {
            assert_eq!(event.sync_status, SyncStatus::Synced);
            assert!(event
                .external_record_id
                .as_deref()
                .unwrap_or_default()
                .starts_with("usage-"));
        }
    }

    #[tokio::test]
    async fn failed_event_stays_pending_and_batch_continues() {
        let ledger = test_ledger().await;
        ledger.add_event(&event("e1", "tokens")).await.unwrap();
        ledger.add_event(&event("e2", "images")).await.unwrap();

        let recorder = SelectiveRecorder {
            fail_item: "tokens".to_string(),
            recorded: Mutex::new(Vec::new()),
        };
        let synced = sync_usage_events(&ledger, &recorder).await.unwrap();
        assert_eq!(synced, 1);

        let pending = ledger.pending_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, "e1");
    }

    #[tokio::test]
    async fn second_run_does_not_repush_synced_events() {
        let ledger = test_ledger().await;
        ledger.add_event(&event("e1", "tokens")).await.unwrap();

        let recorder = SelectiveRecorder {
            fail_item: String::new(),
            recorded: Mutex::new(Vec::new()),
        };
        assert_eq!(sync_usage_events(&ledger, &recorder).await.unwrap(), 1);
        assert_eq!(sync_usage_events(&ledger, &recorder).await.unwrap(), 0);
        assert_eq!(recorder.recorded.lock().unwrap().len(), 1, "pushed once only");
    }

    #[tokio::test]
    async fn stripe_recorder_posts_form_and_reads_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("subscription_item=tokens"))
            .and(body_string_contains("action=increment"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "ur_123"})),
            )
            .mount(&server)
            .await;

        let recorder = StripeUsageRecorder::new("sk_test".to_string(), Duration::from_secs(2))
            .unwrap()
            .with_base_url(server.uri());
        let id = recorder
            .create_usage_record("tokens", 5.0, 1_750_000_000)
            .await
            .unwrap();
        assert_eq!(id, "ur_123");
    }

    #[tokio::test]
    async fn stripe_recorder_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let recorder = StripeUsageRecorder::new("sk_test".to_string(), Duration::from_secs(2))
            .unwrap()
            .with_base_url(server.uri());
        let err = recorder
            .create_usage_record("tokens", 5.0, 1_750_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Sink { .. }));
    }
}
