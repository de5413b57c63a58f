use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ anyhow, bail, ensure, Context };
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{ Deserialize, Serialize };
use serde_json::json;

use crate::config::PriceConfig;
use crate::error::{ AppError, Result };
use crate::providers::{ sanitize_factor, PriceOracle, NEUTRAL_FACTOR };
use crate::services::coingecko_client::{ CoinGeckoClient, PriceHistorySource, PricePoint };

/// Days of history requested; one more than the long moving average needs.
const HISTORY_DAYS: u32 = 31;
const SHORT_MA_DAYS: usize = 7;
const LONG_MA_DAYS: usize = 30;
const OPENAI_TIMEOUT_SECS: u64 = 15;

const SCORER_PROMPT: &str =
    "You are a cryptocurrency price analyzer. Analyze the provided data and return a single number.\n\
If the price is dropping (negative price change %), return a number between 0 and 1:\n\
- minimal drops (0 to -3%): 0.7-1.0\n\
- moderate drops (-3% to -10%): 0.3-0.7\n\
- significant drops (below -10%): 0.0-0.3\n\
If the price is rising (positive price change %), return a number between 1 and 2:\n\
- minimal increases (0-3%): 1.0-1.3\n\
- moderate increases (3-10%): 1.3-1.7\n\
- significant increases (above 10%): 1.7-1.9\n\
Only return a JSON object with a single field called \"priceFactor\".";

/// How trend statistics become a factor.
#[derive(Debug, Clone)]
pub enum FactorModel {
    /// Deterministic banding over the day-over-day change.
    Rules,
    /// Chat-completions scorer returning `{"priceFactor": n}`.
    OpenAi {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl FactorModel {
    pub fn name(&self) -> &'static str {
        match self {
            FactorModel::Rules => "rules",
            FactorModel::OpenAi { .. } => "openai",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub asset_id: String,
    pub moving_average_7_day: f64,
    pub moving_average_30_day: f64,
    pub price_change_percentage: f64,
    pub price_factor: f64,
    pub model: &'static str,
}

/// Last sample of each UTC calendar day, oldest day first.
pub fn daily_closes(points: &[PricePoint]) -> Vec<(NaiveDate, f64)> {
    let mut by_day: BTreeMap<NaiveDate, (chrono::DateTime<chrono::Utc>, f64)> = BTreeMap::new();

    for point in points {
        let day = point.timestamp.date_naive();
        match by_day.get(&day) {
            Some((seen, _)) if *seen > point.timestamp => {}
            _ => {
                by_day.insert(day, (point.timestamp, point.price));
            }
        }
    }

    by_day
        .into_iter()
        .map(|(day, (_, price))| (day, price))
        .collect()
}

/// Mean of the last `period` daily closes.
pub fn moving_average(closes: &[(NaiveDate, f64)], period: usize) -> anyhow::Result<f64> {
    ensure!(period > 0, "moving average period must be positive");
    ensure!(
        closes.len() >= period,
        "not enough price data for a {}-day moving average ({} days)",
        period,
        closes.len()
    );

    let sum: f64 = closes[closes.len() - period..]
        .iter()
        .map(|(_, price)| price)
        .sum();

    Ok(sum / (period as f64))
}

/// Percentage change between the closes of the last two calendar days present.
///
/// Days are compared as bucketed, so a missing day in the data widens the
/// comparison window instead of failing.
pub fn day_over_day_change(closes: &[(NaiveDate, f64)]) -> anyhow::Result<f64> {
    let [.., (_, previous), (_, current)] = closes else {
        bail!("not enough days of price data for a day-over-day change");
    };

    ensure!(*previous != 0.0, "previous close is zero");

    Ok(((current - previous) / previous) * 100.0)
}

/// Continuous banding of a day-over-day change (in percent) into a factor.
pub fn rule_factor(change_pct: f64) -> f64 {
    if !change_pct.is_finite() {
        return NEUTRAL_FACTOR;
    }

    if change_pct >= 0.0 {
        let p = change_pct;
        if p <= 3.0 {
            1.0 + (p / 3.0) * 0.3
        } else if p <= 10.0 {
            1.3 + ((p - 3.0) / 7.0) * 0.4
        } else {
            (1.7 + ((p - 10.0) / 10.0) * 0.2).min(1.9)
        }
    } else {
        let d = -change_pct;
        if d <= 3.0 {
            1.0 - (d / 3.0) * 0.3
        } else if d <= 10.0 {
            0.7 - ((d - 3.0) / 7.0) * 0.4
        } else {
            (0.3 - ((d - 10.0) / 10.0) * 0.3).max(0.0)
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScorerReply {
    price_factor: f64,
}

/// Price-trend oracle: moving averages and day-over-day change scored into a factor.
pub struct PriceAnalysisService {
    history: Arc<dyn PriceHistorySource>,
    model: FactorModel,
    client: reqwest::Client,
}

impl PriceAnalysisService {
    pub fn new(history: Arc<dyn PriceHistorySource>, model: FactorModel) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(OPENAI_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { history, model, client })
    }

    /// CoinGecko history, scored by OpenAI when a key is configured and by rules otherwise.
    pub fn from_config(config: &PriceConfig) -> Result<Self> {
        let history = CoinGeckoClient::new(
            &config.coingecko_api_base,
            config.coingecko_api_key.clone()
        )?;

        let model = match &config.openai_api_key {
            Some(api_key) =>
                FactorModel::OpenAi {
                    api_key: api_key.clone(),
                    model: config.openai_model.clone(),
                    base_url: config.openai_api_base.trim_end_matches('/').to_string(),
                },
            None => FactorModel::Rules,
        };

        tracing::info!("Price analysis using {} scorer", model.name());

        Self::new(Arc::new(history), model)
    }

    pub async fn analyze(&self, asset_id: &str) -> anyhow::Result<TrendAnalysis> {
        let points = self.history
            .fetch_history(asset_id, HISTORY_DAYS).await
            .with_context(|| format!("failed to fetch price history for {}", asset_id))?;

        let closes = daily_closes(&points);

        let moving_average_7_day = moving_average(&closes, SHORT_MA_DAYS)?;
        let moving_average_30_day = moving_average(&closes, LONG_MA_DAYS)?;
        let price_change_percentage = day_over_day_change(&closes)?;

        let raw_factor = match &self.model {
            FactorModel::Rules => rule_factor(price_change_percentage),
            FactorModel::OpenAi { api_key, model, base_url } =>
                self.score_with_openai(
                    api_key,
                    model,
                    base_url,
                    asset_id,
                    moving_average_7_day,
                    moving_average_30_day,
                    price_change_percentage
                ).await?,
        };

        Ok(TrendAnalysis {
            asset_id: asset_id.to_string(),
            moving_average_7_day,
            moving_average_30_day,
            price_change_percentage,
            price_factor: sanitize_factor(raw_factor),
            model: self.model.name(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn score_with_openai(
        &self,
        api_key: &str,
        model: &str,
        base_url: &str,
        asset_id: &str,
        ma7: f64,
        ma30: f64,
        change_pct: f64
    ) -> anyhow::Result<f64> {
        let user_prompt = format!(
            "Please analyze this token data and provide a price factor:\n\
             Token: {}\n\
             7-Day Moving Average: ${:.4}\n\
             30-Day Moving Average: ${:.4}\n\
             1-Day Price Change: {:.2}%",
            asset_id,
            ma7,
            ma30,
            change_pct
        );

        let body =
            json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SCORER_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self.client
            .post(format!("{}/chat/completions", base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send().await
            .context("OpenAI request failed")?;

        if !response.status().is_success() {
            bail!("OpenAI returned status: {}", response.status());
        }

        let completion: ChatCompletion = response
            .json().await
            .context("Failed to parse OpenAI response")?;

        parse_scorer_reply(completion)
    }
}

fn parse_scorer_reply(completion: ChatCompletion) -> anyhow::Result<f64> {
    let content = completion.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("OpenAI response content is empty"))?;

    let reply: ScorerReply = serde_json
        ::from_str(&content)
        .with_context(|| format!("unexpected scorer reply: {}", content))?;

    Ok(reply.price_factor)
}

#[async_trait]
impl PriceOracle for PriceAnalysisService {
    async fn get_price_factor(&self, asset_id: &str) -> f64 {
        match self.analyze(asset_id).await {
            Ok(analysis) => {
                tracing::info!(
                    asset_id,
                    factor = analysis.price_factor,
                    change_pct = analysis.price_change_percentage,
                    "Price analysis complete"
                );
                analysis.price_factor
            }
            Err(e) => {
                tracing::warn!("Price analysis for {} failed, using neutral factor: {:#}", asset_id, e);
                NEUTRAL_FACTOR
            }
        }
    }
}
