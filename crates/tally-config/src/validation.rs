// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths, plausible currency codes, and
//! non-zero intervals.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    for (key, value) in [
        ("ledger.settlement_currency", &config.ledger.settlement_currency),
        ("fx.base_currency", &config.fx.base_currency),
        ("billing.target_currency", &config.billing.target_currency),
    ] {
        if !is_currency_code(value) {
            errors.push(ConfigError::Validation {
                message: format!("{key} `{value}` is not a 3-letter currency code"),
            });
        }
    }

    if config.fx.feed_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "fx.feed_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.billing.sink_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "billing.sink_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.monitor.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "monitor.interval_secs must be at least 1".to_string(),
        });
    }

    let mut seen_sinks = HashSet::new();
    for sink in &config.billing.sink_urls {
        if sink.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "billing.sink_urls entries must have a non-empty name".to_string(),
            });
        }
        if !seen_sinks.insert(&sink.name) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate accounting sink name `{}`", sink.name),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Three ASCII uppercase letters, e.g. "USD", "EUR".
fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.chars().all(|c| c.is_ascii_uppercase())
}
