// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Markup pricing for the Tally pipeline.
//!
//! Provides the effective-dated markup rule store and the line-oriented
//! pricing DSL used to load rules in bulk.

pub mod dsl;
pub mod rules;

pub use dsl::{load_from_dsl, parse_pricing_dsl};
pub use rules::{MarkupRule, MarkupRulePatch, MarkupRuleStore};
