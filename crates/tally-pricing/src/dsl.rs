// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented pricing DSL for bulk markup rule definition.
//!
//! Each non-comment line reads:
//!
//! ```text
//! provider model markup effective_date
//! openai   gpt-4 20%    2026-01-01
//! cohere   command 0.15 2026-02-01
//! ```
//!
//! Markup is either a fraction (`0.2`) or a percentage (`20%`). The rule id
//! is derived as `provider-model-date`, so reloading the same file upserts
//! rather than duplicates.

use std::sync::LazyLock;

use regex::Regex;
use tally_core::TallyError;

use crate::rules::{MarkupRule, MarkupRuleStore};

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<provider>[\w\-./]+)\s+(?P<model>[\w\-./]+)\s+(?P<markup>[\d.]+%?)\s+(?P<date>\d{4}-\d{2}-\d{2})$",
    )
    .expect("rule regex is valid")
});

/// Parse DSL text into markup rules.
///
/// Blank lines and `#` comments are skipped; any other unparseable line is
/// an error naming the line.
pub fn parse_pricing_dsl(text: &str) -> Result<Vec<MarkupRule>, TallyError> {
    let mut rules = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let caps = RULE_RE
            .captures(line)
            .ok_or_else(|| TallyError::Validation(format!("invalid DSL line: {line}")))?;
        let provider = caps["provider"].to_string();
        let model = caps["model"].to_string();
        let markup = parse_markup(&caps["markup"])?;
        let date = caps["date"].to_string();
        rules.push(MarkupRule {
            id: format!("{provider}-{model}-{date}"),
            provider,
            model,
            markup,
            effective_date: date,
        });
    }
    Ok(rules)
}

/// Parse DSL text and load the resulting rules into `store`.
pub async fn load_from_dsl(store: &MarkupRuleStore, text: &str) -> Result<usize, TallyError> {
    let rules = parse_pricing_dsl(text)?;
    store.load_rules(&rules).await?;
    Ok(rules.len())
}

fn parse_markup(value: &str) -> Result<f64, TallyError> {
    let (number, divisor) = match value.strip_suffix('%') {
        Some(percent) => (percent, 100.0),
        None => (value, 1.0),
    };
    let parsed: f64 = number
        .parse()
        .map_err(|_| TallyError::Validation(format!("invalid markup value: {value}")))?;
    Ok(parsed / divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_storage::Database;

    #[test]
    fn parses_fraction_and_percent_forms() {
        let rules = parse_pricing_dsl(
            "# premium models\nopenai gpt-4 20% 2026-01-01\ncohere command 0.15 2026-02-01\n",
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "openai-gpt-4-2026-01-01");
        assert!((rules[0].markup - 0.2).abs() < 1e-12);
        assert!((rules[1].markup - 0.15).abs() < 1e-12);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse_pricing_dsl("openai gpt-4 twenty 2026-01-01").unwrap_err();
        assert!(err.to_string().contains("invalid DSL line"));
    }

    #[test]
    fn skips_blanks_and_comments() {
        let rules = parse_pricing_dsl("\n# nothing here\n\n").unwrap();
        assert!(rules.is_empty());
    }

    #[tokio::test]
    async fn load_from_dsl_upserts_by_derived_id() {
        let db = Database::open_in_memory().await.unwrap();
        let store = MarkupRuleStore::new(Arc::new(db));

        let text = "openai gpt-4 20% 2026-01-01";
        assert_eq!(load_from_dsl(&store, text).await.unwrap(), 1);
        // Reloading the same line replaces, not duplicates.
        let text = "openai gpt-4 25% 2026-01-01";
        assert_eq!(load_from_dsl(&store, text).await.unwrap(), 1);

        let rules = store.list_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert!((rules[0].markup - 0.25).abs() < 1e-12);
    }
}
