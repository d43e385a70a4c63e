// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost-based selection among candidate provider offers.
//!
//! Each offer's final cost is its unit cost with the effective markup
//! applied, converted into the target currency. The strictly cheapest offer
//! wins; exact ties keep the first-seen offer, so selection is
//! deterministic for a fixed input order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::TallyError;
use tally_fx::{convert, RateStore};
use tally_pricing::MarkupRuleStore;
use tracing::info;

/// A candidate provider offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOption {
    pub provider: String,
    pub model: String,
    pub unit_cost: f64,
    pub currency: String,
}

/// The chosen offer, augmented with its markup- and FX-adjusted cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedOption {
    pub provider: String,
    pub model: String,
    pub unit_cost: f64,
    pub currency: String,
    /// Cost in the target currency, markup applied.
    pub final_cost: f64,
}

/// Selects the cheapest provider offer after markup and FX adjustment.
pub struct CostRouter {
    markup: Arc<MarkupRuleStore>,
    rates: Arc<RateStore>,
}

impl CostRouter {
    /// Create a router over the given markup and rate stores.
    pub fn new(markup: Arc<MarkupRuleStore>, rates: Arc<RateStore>) -> Self {
        Self { markup, rates }
    }

    /// Pick the offer with the strictly lowest final cost in
    /// `target_currency` at `ts`.
    ///
    /// Errors with [`TallyError::NoOptions`] for an empty candidate set.
    /// Offers priced in a foreign currency are converted through the latest
    /// rate snapshot; an empty snapshot leaves amounts unmodified, while a
    /// snapshot missing the offer's currency is a
    /// [`TallyError::MissingRate`].
    pub async fn route(
        &self,
        options: &[ProviderOption],
        ts: DateTime<Utc>,
        target_currency: &str,
    ) -> Result<RoutedOption, TallyError> {
        if options.is_empty() {
            return Err(TallyError::NoOptions);
        }

        let rates = self.rates.get(None).await?;
        let mut best: Option<RoutedOption> = None;
        for option in options {
            let markup = self
                .markup
                .effective_markup(&option.provider, &option.model, ts)
                .await?;
            let mut final_cost = option.unit_cost * (1.0 + markup);
            if option.currency != target_currency && !rates.is_empty() {
                final_cost = convert(final_cost, &option.currency, target_currency, &rates)?;
            }
            let candidate = RoutedOption {
                provider: option.provider.clone(),
                model: option.model.clone(),
                unit_cost: option.unit_cost,
                currency: option.currency.clone(),
                final_cost,
            };
            // Strict comparison: first-seen wins on exact ties.
            match &best {
                Some(current) if candidate.final_cost >= current.final_cost => {}
                _ => best = Some(candidate),
            }
        }

        match best {
            Some(chosen) => {
                info!(
                    provider = %chosen.provider,
                    model = %chosen.model,
                    final_cost = chosen.final_cost,
                    "routed to cheapest offer"
                );
                Ok(chosen)
            }
            None => Err(TallyError::NoOptions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tally_pricing::MarkupRule;
    use tally_storage::Database;

    struct Harness {
        router: CostRouter,
        markup: Arc<MarkupRuleStore>,
        rates: Arc<RateStore>,
    }

    async fn harness() -> Harness {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let markup = Arc::new(MarkupRuleStore::new(db.clone()));
        let rates = Arc::new(RateStore::new(db.clone()));
        let router = CostRouter::new(markup.clone(), rates.clone());
        Harness {
            router,
            markup,
            rates,
        }
    }

    fn rule(id: &str, provider: &str, markup: f64) -> MarkupRule {
        MarkupRule {
            id: id.to_string(),
            provider: provider.to_string(),
            model: "gpt-4".to_string(),
            markup,
            effective_date: "2026-01-01".to_string(),
        }
    }

    fn option(provider: &str, unit_cost: f64, currency: &str) -> ProviderOption {
        ProviderOption {
            provider: provider.to_string(),
            model: "gpt-4".to_string(),
            unit_cost,
            currency: currency.to_string(),
        }
    }

    fn ts() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn empty_options_error() {
        let h = harness().await;
        let err = h.router.route(&[], ts(), "USD").await.unwrap_err();
        assert!(matches!(err, TallyError::NoOptions));
    }

    #[tokio::test]
    async fn picks_cheapest_after_markup_and_fx() {
        let h = harness().await;
        h.markup.create_rule(&rule("r1", "openai", 0.2)).await.unwrap();
        h.markup.create_rule(&rule("r2", "cohere", 0.0)).await.unwrap();
        h.rates
            .store(
                &HashMap::from([("EUR".to_string(), 1.0), ("USD".to_string(), 1.2)]),
                "2026-06-01",
            )
            .await
            .unwrap();

        // openai: 0.02 * 1.2 = 0.024 USD; cohere: 0.018 EUR -> 0.0216 USD.
        let options = vec![
            option("openai", 0.02, "USD"),
            option("cohere", 0.018, "EUR"),
        ];
        let chosen = h.router.route(&options, ts(), "USD").await.unwrap();
        assert_eq!(chosen.provider, "cohere");
        assert!((chosen.final_cost - 0.018 * 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn chosen_cost_is_global_minimum() {
        let h = harness().await;
        let options = vec![
            option("openai", 0.03, "USD"),
            option("cohere", 0.01, "USD"),
            option("anthropic", 0.02, "USD"),
        ];
        let chosen = h.router.route(&options, ts(), "USD").await.unwrap();
        for opt in &options {
            assert!(chosen.final_cost <= opt.unit_cost);
        }
        assert_eq!(chosen.provider, "cohere");
    }

    #[tokio::test]
    async fn exact_tie_keeps_first_seen() {
        let h = harness().await;
        let options = vec![
            option("openai", 0.02, "USD"),
            option("cohere", 0.02, "USD"),
        ];
        let chosen = h.router.route(&options, ts(), "USD").await.unwrap();
        assert_eq!(chosen.provider, "openai");
    }

    #[tokio::test]
    async fn empty_snapshot_leaves_amounts_unmodified() {
        let h = harness().await;
        let options = vec![
            option("openai", 0.02, "USD"),
            option("cohere", 0.018, "EUR"),
        ];
        // No rates stored: the EUR amount competes unconverted.
        let chosen = h.router.route(&options, ts(), "USD").await.unwrap();
        assert_eq!(chosen.provider, "cohere");
        assert!((chosen.final_cost - 0.018).abs() < 1e-12);
    }

    #[tokio::test]
    async fn missing_currency_in_snapshot_errors() {
        let h = harness().await;
        h.rates
            .store(
                &HashMap::from([("EUR".to_string(), 1.0), ("USD".to_string(), 1.2)]),
                "2026-06-01",
            )
            .await
            .unwrap();
        let options = vec![option("openai", 0.02, "CHF")];
        let err = h.router.route(&options, ts(), "USD").await.unwrap_err();
        assert!(matches!(err, TallyError::MissingRate { .. }));
    }

    #[tokio::test]
    async fn markup_effective_at_timestamp_is_used() {
        let h = harness().await;
        // Markup doubles from June; route at May still sees the cheap rule.
        h.markup
            .create_rule(&MarkupRule {
                id: "r1".to_string(),
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
                markup: 0.1,
                effective_date: "2026-01-01".to_string(),
            })
            .await
            .unwrap();
        h.markup
            .create_rule(&MarkupRule {
                id: "r2".to_string(),
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
                markup: 1.0,
                effective_date: "2026-06-01".to_string(),
            })
            .await
            .unwrap();

        let may: DateTime<Utc> = "2026-05-01T00:00:00Z".parse().unwrap();
        let options = vec![option("openai", 0.02, "USD")];
        let chosen = h.router.route(&options, may, "USD").await.unwrap();
        assert!((chosen.final_cost - 0.022).abs() < 1e-9);
    }
}
