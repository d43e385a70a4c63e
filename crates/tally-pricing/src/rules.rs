// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Markup rule store with effective-dated lookup.
//!
//! Multiple rules may exist for the same (provider, model) pair at different
//! effective dates; the rule in force at a timestamp is the one with the
//! latest `effective_date <= ts`. Rules sharing an effective date are
//! tie-broken by highest rule id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tally_core::TallyError;
use tally_storage::{map_tr_err, Database};
use tracing::info;

/// A percentage markup applied to a (provider, model) pair from a date on.
///
/// `markup` is fractional: 0.2 means 20%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupRule {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub markup: f64,
    /// ISO 8601 date the rule takes effect.
    pub effective_date: String,
}

/// Partial field patch for [`MarkupRuleStore::update_rule`].
#[derive(Debug, Clone, Default)]
pub struct MarkupRulePatch {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub markup: Option<f64>,
    pub effective_date: Option<String>,
}

/// SQLite-backed store of markup rules.
pub struct MarkupRuleStore {
    db: Arc<Database>,
}

impl MarkupRuleStore {
    /// Create a rule store over the given database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a rule by id.
    pub async fn create_rule(&self, rule: &MarkupRule) -> Result<(), TallyError> {
        let rule = rule.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO markup_rules
                         (id, provider, model, markup, effective_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        rule.id,
                        rule.provider,
                        rule.model,
                        rule.markup,
                        rule.effective_date,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Bulk insert rules (used by the DSL loader).
    pub async fn load_rules(&self, rules: &[MarkupRule]) -> Result<(), TallyError> {
        for rule in rules {
            self.create_rule(rule).await?;
        }
        info!(count = rules.len(), "markup rules loaded");
        Ok(())
    }

    /// Fetch a rule by id.
    pub async fn get_rule(&self, rule_id: &str) -> Result<Option<MarkupRule>, TallyError> {
        let rule_id = rule_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, provider, model, markup, effective_date
                     FROM markup_rules WHERE id = ?1",
                )?;
                let result = stmt.query_row(params![rule_id], row_to_rule);
                match result {
                    Ok(rule) => Ok(Some(rule)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// List all rules, ordered by id.
    pub async fn list_rules(&self) -> Result<Vec<MarkupRule>, TallyError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, provider, model, markup, effective_date
                     FROM markup_rules ORDER BY id",
                )?;
                let rows = stmt.query_map([], row_to_rule)?;
                let mut rules = Vec::new();
                for row in rows {
                    rules.push(row?);
                }
                Ok(rules)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Apply a partial field patch to a rule. Unset fields are untouched;
    /// an all-empty patch is a no-op.
    pub async fn update_rule(
        &self,
        rule_id: &str,
        patch: MarkupRulePatch,
    ) -> Result<(), TallyError> {
        let rule_id = rule_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut fields = Vec::new();
                let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                if let Some(provider) = patch.provider {
                    fields.push("provider = ?");
                    values.push(Box::new(provider));
                }
                if let Some(model) = patch.model {
                    fields.push("model = ?");
                    values.push(Box::new(model));
                }
                if let Some(markup) = patch.markup {
                    fields.push("markup = ?");
                    values.push(Box::new(markup));
                }
                if let Some(effective_date) = patch.effective_date {
                    fields.push("effective_date = ?");
                    values.push(Box::new(effective_date));
                }
                if fields.is_empty() {
                    return Ok(());
                }
                values.push(Box::new(rule_id));
                let sql = format!(
                    "UPDATE markup_rules SET {} WHERE id = ?",
                    fields.join(", ")
                );
                conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete a rule by id. Deleting a missing rule is a no-op.
    pub async fn delete_rule(&self, rule_id: &str) -> Result<(), TallyError> {
        let rule_id = rule_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM markup_rules WHERE id = ?1", params![rule_id])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// The rule in force for (provider, model) at `ts`, if any.
    ///
    /// Latest `effective_date <= ts` wins; equal dates tie-break on highest
    /// rule id.
    pub async fn effective_rule(
        &self,
        provider: &str,
        model: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<MarkupRule>, TallyError> {
        let provider = provider.to_string();
        let model = model.to_string();
        let ts = ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, provider, model, markup, effective_date
                     FROM markup_rules
                     WHERE provider = ?1 AND model = ?2 AND effective_date <= ?3
                     ORDER BY effective_date DESC, id DESC
                     LIMIT 1",
                )?;
                let result = stmt.query_row(params![provider, model, ts], row_to_rule);
                match result {
                    Ok(rule) => Ok(Some(rule)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// The fractional markup in force for (provider, model) at `ts`,
    /// 0.0 when no rule matches.
    pub async fn effective_markup(
        &self,
        provider: &str,
        model: &str,
        ts: DateTime<Utc>,
    ) -> Result<f64, TallyError> {
        Ok(self
            .effective_rule(provider, model, ts)
            .await?
            .map(|rule| rule.markup)
            .unwrap_or(0.0))
    }
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> Result<MarkupRule, rusqlite::Error> {
    Ok(MarkupRule {
        id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        markup: row.get(3)?,
        effective_date: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> MarkupRuleStore {
        let db = Database::open_in_memory().await.unwrap();
        MarkupRuleStore::new(Arc::new(db))
    }

    fn rule(id: &str, provider: &str, model: &str, markup: f64, date: &str) -> MarkupRule {
        MarkupRule {
            id: id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            markup,
            effective_date: date.to_string(),
        }
    }

    fn at(date: &str) -> DateTime<Utc> {
        format!("{date}T12:00:00Z").parse().unwrap()
    }

    #[tokio::test]
    async fn rule_crud_roundtrip() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4o", 0.2, "2026-01-01"))
            .await
            .unwrap();

        let fetched = store.get_rule("r1").await.unwrap().unwrap();
        assert_eq!(fetched.provider, "openai");

        store
            .update_rule(
                "r1",
                MarkupRulePatch {
                    markup: Some(0.3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = store.get_rule("r1").await.unwrap().unwrap();
        assert!((updated.markup - 0.3).abs() < 1e-12);
        assert_eq!(updated.effective_date, "2026-01-01", "patch leaves other fields");

        assert_eq!(store.list_rules().await.unwrap().len(), 1);

        store.delete_rule("r1").await.unwrap();
        assert!(store.get_rule("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_patch_is_noop() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4o", 0.2, "2026-01-01"))
            .await
            .unwrap();
        store
            .update_rule("r1", MarkupRulePatch::default())
            .await
            .unwrap();
        let fetched = store.get_rule("r1").await.unwrap().unwrap();
        assert!((fetched.markup - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn effective_markup_picks_latest_dated_rule() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4", 0.1, "2026-01-01"))
            .await
            .unwrap();
        store
            .create_rule(&rule("r2", "openai", "gpt-4", 0.25, "2026-03-01"))
            .await
            .unwrap();

        let early = store
            .effective_markup("openai", "gpt-4", at("2026-02-01"))
            .await
            .unwrap();
        assert!((early - 0.1).abs() < 1e-12);

        let late = store
            .effective_markup("openai", "gpt-4", at("2026-03-15"))
            .await
            .unwrap();
        assert!((late - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn effective_markup_without_rule_is_zero() {
        let store = test_store().await;
        let markup = store
            .effective_markup("openai", "gpt-4", at("2026-02-01"))
            .await
            .unwrap();
        assert_eq!(markup, 0.0);
        assert!(store
            .effective_rule("openai", "gpt-4", at("2026-02-01"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn future_rule_is_not_effective_yet() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4", 0.5, "2026-06-01"))
            .await
            .unwrap();
        let markup = store
            .effective_markup("openai", "gpt-4", at("2026-05-31"))
            .await
            .unwrap();
        assert_eq!(markup, 0.0);
    }

    #[tokio::test]
    async fn same_day_rule_applies_from_midnight() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4", 0.2, "2026-06-01"))
            .await
            .unwrap();
        let markup = store
            .effective_markup("openai", "gpt-4", at("2026-06-01"))
            .await
            .unwrap();
        assert!((markup - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn equal_effective_dates_tie_break_on_highest_id() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4", 0.1, "2026-01-01"))
            .await
            .unwrap();
        store
            .create_rule(&rule("r2", "openai", "gpt-4", 0.4, "2026-01-01"))
            .await
            .unwrap();

        let markup = store
            .effective_markup("openai", "gpt-4", at("2026-02-01"))
            .await
            .unwrap();
        assert!((markup - 0.4).abs() < 1e-12, "highest id wins the tie");
    }

    #[tokio::test]
    async fn scopes_do_not_leak_across_providers() {
        let store = test_store().await;
        store
            .create_rule(&rule("r1", "openai", "gpt-4", 0.2, "2026-01-01"))
            .await
            .unwrap();
        let markup = store
            .effective_markup("cohere", "gpt-4", at("2026-02-01"))
            .await
            .unwrap();
        assert_eq!(markup, 0.0);
    }
}
