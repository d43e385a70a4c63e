// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider base-URL resolution.
//!
//! Dispatch is over a closed set of provider classes so the compiler checks
//! exhaustiveness; names outside the set resolve to an explicit error. The
//! self-hosted class delegates to the GPU spot-price feed and routes to the
//! cheapest host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_config::model::RouterConfig;
use tally_core::{GpuPriceFeed, TallyError};
use tracing::debug;

/// Known provider classes for endpoint dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClass {
    OpenAi,
    Anthropic,
    Cohere,
    /// Local or ollama deployments routed via GPU spot prices.
    SelfHosted,
}

impl ProviderClass {
    /// Classify a provider name; `None` for names outside the closed set.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "cohere" => Some(Self::Cohere),
            "local" | "ollama" => Some(Self::SelfHosted),
            _ => None,
        }
    }
}

/// Resolves symbolic provider names to request endpoints.
pub struct EndpointResolver {
    openai_base: String,
    anthropic_base: String,
    cohere_base: String,
    gpu_feed: Arc<dyn GpuPriceFeed>,
}

impl EndpointResolver {
    /// Build a resolver from router configuration and a GPU price feed.
    pub fn new(config: &RouterConfig, gpu_feed: Arc<dyn GpuPriceFeed>) -> Self {
        Self {
            openai_base: config.openai_base.clone(),
            anthropic_base: config.anthropic_base.clone(),
            cohere_base: config.cohere_base.clone(),
            gpu_feed,
        }
    }

    /// Resolve `provider` to its request base URL.
    ///
    /// Self-hosted providers resolve to the cheapest GPU host from the spot
    /// feed; unrecognized names are [`TallyError::UnknownProvider`].
    pub async fn provider_base_url(&self, provider: &str) -> Result<String, TallyError> {
        match ProviderClass::parse(provider) {
            Some(ProviderClass::OpenAi) => Ok(self.openai_base.clone()),
            Some(ProviderClass::Anthropic) => Ok(self.anthropic_base.clone()),
            Some(ProviderClass::Cohere) => Ok(self.cohere_base.clone()),
            Some(ProviderClass::SelfHosted) => {
                choose_best_gpu_host(self.gpu_feed.as_ref()).await
            }
            None => Err(TallyError::UnknownProvider {
                name: provider.to_string(),
            }),
        }
    }
}

/// Pick the host with the lowest spot price from the feed.
///
/// Errors when the feed is empty or carries non-finite prices. Price ties
/// resolve to the lexicographically smallest host name so the choice is
/// deterministic.
pub async fn choose_best_gpu_host(feed: &dyn GpuPriceFeed) -> Result<String, TallyError> {
    let prices = feed.spot_prices().await?;
    if prices.is_empty() {
        return Err(TallyError::Feed {
            message: "GPU spot-price feed is empty".to_string(),
        });
    }
    for (host, price) in &prices {
        if !price.is_finite() {
            return Err(TallyError::Feed {
                message: format!("GPU spot price for {host} is not finite"),
            });
        }
    }
    let mut entries: Vec<(&String, f64)> = prices.iter().map(|(h, p)| (h, *p)).collect();
    entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    match entries.first() {
        Some((host, price)) => {
            debug!(host = %host, price, "cheapest GPU host selected");
            Ok((*host).clone())
        }
        None => Err(TallyError::Feed {
            message: "GPU spot-price feed is empty".to_string(),
        }),
    }
}

/// GPU spot-price feed client for endpoints serving a JSON host → price map.
pub struct JsonGpuPriceFeed {
    client: reqwest::Client,
    url: String,
}

impl JsonGpuPriceFeed {
    /// Build a feed client with a bounded request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Feed {
                message: format!("failed to build GPU feed client: {e}"),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl GpuPriceFeed for JsonGpuPriceFeed {
    async fn spot_prices(&self) -> Result<HashMap<String, f64>, TallyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TallyError::Feed {
                message: format!("GPU feed request failed: {e}"),
            })?;
        if !response.status().is_success() {
            return Err(TallyError::Feed {
                message: format!("GPU feed returned HTTP {}", response.status()),
            });
        }
        response
            .json::<HashMap<String, f64>>()
            .await
            .map_err(|e| TallyError::Feed {
                message: format!("GPU feed payload is not a host map: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFeed {
        prices: HashMap<String, f64>,
    }

    #[async_trait]
    impl GpuPriceFeed for StaticFeed {
        async fn spot_prices(&self) -> Result<HashMap<String, f64>, TallyError> {
            Ok(self.prices.clone())
        }
    }

    fn resolver(prices: HashMap<String, f64>) -> EndpointResolver {
        EndpointResolver::new(&RouterConfig::default(), Arc::new(StaticFeed { prices }))
    }

    #[test]
    fn parse_known_provider_classes() {
        assert_eq!(ProviderClass::parse("openai"), Some(ProviderClass::OpenAi));
        assert_eq!(ProviderClass::parse("OpenAI"), Some(ProviderClass::OpenAi));
        assert_eq!(
            ProviderClass::parse("anthropic"),
            Some(ProviderClass::Anthropic)
        );
        assert_eq!(ProviderClass::parse("cohere"), Some(ProviderClass::Cohere));
        assert_eq!(
            ProviderClass::parse("local"),
            Some(ProviderClass::SelfHosted)
        );
        assert_eq!(
            ProviderClass::parse("ollama"),
            Some(ProviderClass::SelfHosted)
        );
        assert_eq!(ProviderClass::parse("acme"), None);
    }

    #[tokio::test]
    async fn resolves_known_providers_to_configured_bases() {
        let r = resolver(HashMap::new());
        assert_eq!(
            r.provider_base_url("openai").await.unwrap(),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            r.provider_base_url("anthropic").await.unwrap(),
            "https://api.anthropic.com"
        );
        assert_eq!(
            r.provider_base_url("cohere").await.unwrap(),
            "https://api.cohere.ai"
        );
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let r = resolver(HashMap::new());
        let err = r.provider_base_url("acme").await.unwrap_err();
        assert!(matches!(err, TallyError::UnknownProvider { .. }));
    }

    #[tokio::test]
    async fn self_hosted_routes_to_cheapest_gpu_host() {
        let r = resolver(HashMap::from([
            ("gpu-a.internal".to_string(), 0.9),
            ("gpu-b.internal".to_string(), 0.4),
            ("gpu-c.internal".to_string(), 1.2),
        ]));
        assert_eq!(
            r.provider_base_url("local").await.unwrap(),
            "gpu-b.internal"
        );
    }

    #[tokio::test]
    async fn empty_gpu_feed_is_an_error() {
        let r = resolver(HashMap::new());
        let err = r.provider_base_url("ollama").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn price_tie_resolves_to_smallest_host_name() {
        let feed = StaticFeed {
            prices: HashMap::from([
                ("gpu-b.internal".to_string(), 0.5),
                ("gpu-a.internal".to_string(), 0.5),
            ]),
        };
        assert_eq!(
            choose_best_gpu_host(&feed).await.unwrap(),
            "gpu-a.internal"
        );
    }

    #[tokio::test]
    async fn non_finite_price_is_an_error() {
        let feed = StaticFeed {
            prices: HashMap::from([("gpu-a.internal".to_string(), f64::NAN)]),
        };
        assert!(choose_best_gpu_host(&feed).await.is_err());
    }
}
