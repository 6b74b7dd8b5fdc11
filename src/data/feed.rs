use crate::models::Candle;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const KRAKEN_PUBLIC_API: &str = "https://api.kraken.com";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange returned errors: {0}")]
    Api(String),
    #[error("unexpected OHLC payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub base_url: String,
    pub pair: String,
    pub interval_minutes: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: KRAKEN_PUBLIC_API.to_string(),
            pair: "XBTUSD".to_string(),
            interval_minutes: 60,
        }
    }
}

/// Source of the latest closed candles in live mode
#[allow(async_fn_in_trait)]
pub trait CandleSource {
    /// Closed candles, oldest first; the still-forming bar is never included
    async fn closed_candles(&mut self) -> Result<Vec<Candle>, FeedError>;
}

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    result: Option<HashMap<String, Value>>,
}

/// Kraken public OHLC endpoint
pub struct KrakenOhlcFeed {
    client: Client,
    base_url: String,
    pair: String,
    interval_minutes: u32,
}

impl KrakenOhlcFeed {
    pub fn new(base_url: impl Into<String>, pair: impl Into<String>, interval_minutes: u32) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pair: pair.into(),
            interval_minutes,
        })
    }

    pub fn from_settings(settings: &FeedSettings) -> Result<Self, FeedError> {
        Self::new(&settings.base_url, &settings.pair, settings.interval_minutes)
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }
}

impl CandleSource for KrakenOhlcFeed {
    async fn closed_candles(&mut self) -> Result<Vec<Candle>, FeedError> {
        let url = format!("{}/0/public/OHLC", self.base_url);
        let interval = self.interval_minutes.to_string();

        let response: OhlcResponse = self
            .client
            .get(&url)
            .query(&[("pair", self.pair.as_str()), ("interval", interval.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut candles = parse_ohlc(response)?;

        // Last row is the bar still forming
        candles.pop();

        tracing::debug!("Fetched {} closed {}m candles for {}", candles.len(), self.interval_minutes, self.pair);

        Ok(candles)
    }
}

fn parse_ohlc(response: OhlcResponse) -> Result<Vec<Candle>, FeedError> {
    if !response.error.is_empty() {
        return Err(FeedError::Api(response.error.join(", ")));
    }

    let result = response
        .result
        .ok_or_else(|| FeedError::Payload("missing result".to_string()))?;

    // Result holds the pair's rows plus a `last` cursor
    let rows = result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .and_then(|(_, value)| value.as_array())
        .ok_or_else(|| FeedError::Payload("no candle rows".to_string()))?;

    rows.iter().map(parse_row).collect()
}

fn parse_row(row: &Value) -> Result<Candle, FeedError> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 7)
        .ok_or_else(|| FeedError::Payload(format!("malformed row {}", row)))?;

    let number = |idx: usize| -> Result<f64, FeedError> {
        let value = &fields[idx];
        value
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| value.as_f64())
            .ok_or_else(|| FeedError::Payload(format!("non-numeric field {} in {}", idx, row)))
    };

    let timestamp = fields[0]
        .as_i64()
        .ok_or_else(|| FeedError::Payload(format!("bad timestamp in {}", row)))?;

    Ok(Candle {
        timestamp,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(6)?,
    })
}
