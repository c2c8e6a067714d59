//! USD to INR exchange rate.
//!
//! The rate only feeds the extraction prompt, so failures never surface: any problem fetching it
//! yields the configured fallback. Successful fetches are cached for `cache_ttl`; fallbacks are not
//! cached, so the next request tries again.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ExchangeRateConfig;

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Current USD to INR rate. Never fails.
    async fn usd_to_inr(&self) -> f64;
}

/// Always returns the same rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedExchangeRate(pub f64);

#[async_trait]
impl ExchangeRateProvider for FixedExchangeRate {
    async fn usd_to_inr(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    conversion_rates: HashMap<String, f64>,
}

/// Fetches `GET {base_url}/{api_key}/latest/USD` and reads `conversion_rates.INR`.
pub struct HttpExchangeRate {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    fallback_rate: f64,
    cache: Cache<(), f64>,
}

impl HttpExchangeRate {
    pub fn new(config: &ExchangeRateConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create exchange rate HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            fallback_rate: config.fallback_rate,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl_or_minimum(config.cache_ttl)).build(),
        })
    }

    #[instrument(skip_all, err)]
    async fn fetch(&self, api_key: &str) -> anyhow::Result<f64> {
        let url = ensure_slash(&self.base_url)
            .join(&format!("{api_key}/latest/USD"))
            .map_err(|e| anyhow!("Failed to construct exchange rate URL: {e}"))?;

        // The key is part of the path, keep it out of error messages
        let response = self.client.get(url).send().await.map_err(reqwest::Error::without_url)?;
        if !response.status().is_success() {
            return Err(anyhow!("Exchange rate API error: {}", response.status()));
        }

        let rates: LatestRates = response.json().await.map_err(reqwest::Error::without_url)?;
        let rate = rates
            .conversion_rates
            .get("INR")
            .copied()
            .ok_or_else(|| anyhow!("Exchange rate response has no INR rate"))?;

        if !(rate.is_finite() && rate > 0.0) {
            return Err(anyhow!("Exchange rate response has an invalid INR rate: {rate}"));
        }
        Ok(rate)
    }
}

#[async_trait]
impl ExchangeRateProvider for HttpExchangeRate {
    async fn usd_to_inr(&self) -> f64 {
        let Some(api_key) = self.api_key.as_deref() else {
            return self.fallback_rate;
        };

        if let Some(rate) = self.cache.get(&()).await {
            debug!("Cache hit for exchange rate");
            return rate;
        }

        match self.fetch(api_key).await {
            Ok(rate) => {
                self.cache.insert((), rate).await;
                rate
            }
            Err(e) => {
                warn!("Failed to fetch exchange rate, using fallback {}: {e:#}", self.fallback_rate);
                self.fallback_rate
            }
        }
    }
}

// moka rejects a zero TTL
fn ttl_or_minimum(ttl: Duration) -> Duration {
    ttl.max(Duration::from_secs(1))
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", url.path());
        new_url.set_path(&path);
        new_url
    }
}
