use std::time::Duration;

use anyhow::{ anyhow, bail, Context };
use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::Deserialize;

use crate::error::{ AppError, Result };

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// One USD price sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Source of historical USD prices for an asset.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Samples covering the last `days` days, oldest first.
    async fn fetch_history(&self, asset_id: &str, days: u32) -> anyhow::Result<Vec<PricePoint>>;
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

impl MarketChart {
    fn into_points(self) -> anyhow::Result<Vec<PricePoint>> {
        let mut points = self.prices
            .into_iter()
            .map(|(millis, price)| {
                let timestamp = DateTime::<Utc>
                    ::from_timestamp_millis(millis as i64)
                    .ok_or_else(|| anyhow!("invalid sample timestamp: {}", millis))?;
                Ok(PricePoint { timestamp, price })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

/// CoinGecko `market_chart` client.
pub struct CoinGeckoClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(api_base: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// GET with retry on 429 rate-limit responses
    async fn fetch_with_retry(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        for attempt in 0..MAX_RETRIES {
            let mut request = self.client.get(url).header("accept", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("x-cg-demo-api-key", key);
            }

            let response = request.send().await.context("CoinGecko request failed")?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait_secs = 2u64.pow(attempt + 1);
                tracing::debug!("CoinGecko rate limited, retrying in {}s", wait_secs);
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                continue;
            }

            if !response.status().is_success() {
                bail!("CoinGecko returned status: {}", response.status());
            }

            return Ok(response);
        }

        bail!("CoinGecko rate limited after {} attempts", MAX_RETRIES)
    }
}

#[async_trait]
impl PriceHistorySource for CoinGeckoClient {
    async fn fetch_history(&self, asset_id: &str, days: u32) -> anyhow::Result<Vec<PricePoint>> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}",
            self.api_base,
            urlencoding::encode(asset_id),
            days
        );

        let chart: MarketChart = self
            .fetch_with_retry(&url).await?
            .json().await
            .context("Failed to parse CoinGecko response")?;

        chart.into_points()
    }
}
