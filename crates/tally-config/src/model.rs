// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally metering pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Tally configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Usage ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// FX rate feed settings.
    #[serde(default)]
    pub fx: FxConfig,

    /// Billing consolidation and sync settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Budget alert settings.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Provider routing settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Periodic monitor loop settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "tally.db".to_string()
}

/// Usage ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Currency all stored unit costs are settled in.
    #[serde(default = "default_settlement_currency")]
    pub settlement_currency: String,

    /// Topic name for the optional fire-and-forget event stream.
    #[serde(default = "default_stream_topic")]
    pub stream_topic: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            settlement_currency: default_settlement_currency(),
            stream_topic: default_stream_topic(),
        }
    }
}

fn default_settlement_currency() -> String {
    "USD".to_string()
}

fn default_stream_topic() -> String {
    "usage_events".to_string()
}

/// FX rate feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FxConfig {
    /// Base currency all stored rates are expressed against.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// URL of the external rate feed. `None` disables fetching.
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Timeout in seconds for rate feed requests.
    #[serde(default = "default_feed_timeout_secs")]
    pub feed_timeout_secs: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            feed_url: None,
            feed_timeout_secs: default_feed_timeout_secs(),
        }
    }
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

fn default_feed_timeout_secs() -> u64 {
    10
}

/// Billing consolidation and usage sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Currency invoices are issued in.
    #[serde(default = "default_settlement_currency")]
    pub target_currency: String,

    /// API key for the external usage recorder. `None` disables sync.
    #[serde(default)]
    pub usage_api_key: Option<String>,

    /// Accounting sink endpoints, keyed by sink name.
    #[serde(default)]
    pub sink_urls: Vec<SinkEndpoint>,

    /// Timeout in seconds for accounting sink requests.
    #[serde(default = "default_sink_timeout_secs")]
    pub sink_timeout_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            target_currency: default_settlement_currency(),
            usage_api_key: None,
            sink_urls: Vec::new(),
            sink_timeout_secs: default_sink_timeout_secs(),
        }
    }
}

fn default_sink_timeout_secs() -> u64 {
    15
}

/// One named accounting sink endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinkEndpoint {
    /// Sink name used in log messages ("quickbooks", "netsuite").
    pub name: String,

    /// HTTP endpoint invoices are POSTed to.
    pub url: String,
}

/// Budget alert configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    /// Webhook URL for budget overrun alerts. `None` disables alerting.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Provider routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Base URL for OpenAI-class requests.
    #[serde(default = "default_openai_base")]
    pub openai_base: String,

    /// Base URL for Anthropic-class requests.
    #[serde(default = "default_anthropic_base")]
    pub anthropic_base: String,

    /// Base URL for Cohere-class requests.
    #[serde(default = "default_cohere_base")]
    pub cohere_base: String,

    /// URL of the GPU spot-price feed used for self-hosted routing.
    #[serde(default)]
    pub gpu_spot_feed: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            openai_base: default_openai_base(),
            anthropic_base: default_anthropic_base(),
            cohere_base: default_cohere_base(),
            gpu_spot_feed: None,
        }
    }
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_cohere_base() -> String {
    "https://api.cohere.ai".to_string()
}

/// Periodic monitor loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between monitor iterations.
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,

    /// Bounded iteration count. `None` runs until interrupted.
    #[serde(default)]
    pub iterations: Option<u64>,

    /// Health-check URLs polled each iteration.
    #[serde(default)]
    pub health_urls: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
            iterations: None,
            health_urls: Vec::new(),
        }
    }
}

fn default_monitor_interval_secs() -> u64 {
    300
}
