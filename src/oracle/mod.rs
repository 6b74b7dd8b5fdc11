// External decision oracle: transport, prompt, response validation, retry
pub mod backoff;
pub mod model;
pub mod parse;
pub mod prompt;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use model::{DecisionModel, HttpDecisionModel, ScriptedModel};
pub use parse::{extract_json_object, parse_recommendation, ParseError};

use crate::models::{Candle, ClosedTrade, Recommendation};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

type OracleRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("oracle API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("empty response from oracle")]
    EmptyResponse,
    #[error("malformed recommendation: {0}")]
    Parse(#[from] ParseError),
    #[error("oracle failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<OracleError> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub cooldown_secs: u64,
    pub backoff: BackoffKind,
    pub max_backoff_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            timeout_secs: 120,
            max_attempts: 4,
            cooldown_secs: 61,
            backoff: BackoffKind::Constant,
            max_backoff_secs: 600,
        }
    }
}

impl OracleSettings {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from_kind(
            self.backoff,
            Duration::from_secs(self.cooldown_secs),
            Duration::from_secs(self.max_backoff_secs),
        )
    }
}

/// Bounded-retry client for the decision oracle
///
/// Every call is live; nothing is cached. Calls are sequential since the
/// client is borrowed mutably for the whole retry loop.
pub struct DecisionOracleClient<M: DecisionModel> {
    model: M,
    symbol: String,
    max_attempts: u32,
    backoff: BackoffPolicy,
    pacer: Option<Arc<OracleRateLimiter>>,
}

impl<M: DecisionModel> DecisionOracleClient<M> {
    pub fn new(model: M, symbol: impl Into<String>, max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            model,
            symbol: symbol.into(),
            max_attempts: max_attempts.max(1),
            backoff,
            pacer: None,
        }
    }

    pub fn from_settings(model: M, symbol: impl Into<String>, settings: &OracleSettings) -> Self {
        Self::new(model, symbol, settings.max_attempts, settings.backoff_policy())
    }

    /// Keep at least `interval` between consecutive requests; zero disables pacing
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.pacer = Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Ask for a recommendation, surfacing the failure after the last attempt
    pub async fn try_recommend(
        &mut self,
        window: &[Candle],
        recent_trades: &[ClosedTrade],
    ) -> Result<Recommendation, OracleError> {
        let prompt = prompt::build_prompt(&self.symbol, window, recent_trades);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(pacer) = &self.pacer {
                pacer.until_ready().await;
            }

            let outcome = match self.model.complete(prompt::SYSTEM_PROMPT, &prompt).await {
                Ok(text) => parse_recommendation(&text).map_err(OracleError::from),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(recommendation) => {
                    tracing::info!(
                        "Oracle recommends {} (confidence {}) on attempt {}/{}",
                        recommendation.signal,
                        recommendation.confidence,
                        attempt,
                        self.max_attempts
                    );
                    return Ok(recommendation);
                }
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                tracing::error!("Oracle attempt {}/{} failed: {}", attempt, self.max_attempts, error);
                return Err(OracleError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                "Oracle attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                self.max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Ask for a recommendation; any failure becomes a HOLD carrying the cause
    pub async fn recommend(&mut self, window: &[Candle], recent_trades: &[ClosedTrade]) -> Recommendation {
        match self.try_recommend(window, recent_trades).await {
            Ok(recommendation) => recommendation,
            Err(e) => Recommendation::hold(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use std::time::Instant;

    const LONG: &str = r#"Plan: {"signal":"LONG","confidence":80,"stop_loss_distance_in_usd":300,"take_profit_distance_in_usd":600,"reason":"trend"}"#;

    fn window() -> Vec<Candle> {
        (0..30)
            .map(|i| Candle {
                timestamp: 1_700_000_000 + i * 3600,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    fn client(model: ScriptedModel, attempts: u32, delay: Duration) -> DecisionOracleClient<ScriptedModel> {
        DecisionOracleClient::new(model, "PF_XBTUSD", attempts, BackoffPolicy::Constant(delay))
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mut oracle = client(ScriptedModel::always(LONG), 4, Duration::ZERO);
        let rec = oracle.recommend(&window(), &[]).await;

        assert_eq!(rec.signal, Signal::Long);
        assert_eq!(rec.confidence, 80);
        assert_eq!(oracle.model().calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_retried() {
        let model = ScriptedModel::new(vec![
            Ok("sorry, no plan today".to_string()),
            Err("connection reset".to_string()),
            Ok(LONG.to_string()),
        ]);
        let mut oracle = client(model, 4, Duration::ZERO);
        let rec = oracle.try_recommend(&window(), &[]).await.unwrap();

        assert_eq!(rec.signal, Signal::Long);
        assert_eq!(oracle.model().calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_hold_after_exact_attempts() {
        let model = ScriptedModel::new(vec![Err("down".to_string()); 10]);
        let mut oracle = client(model, 3, Duration::from_millis(30));

        let started = Instant::now();
        let rec = oracle.recommend(&window(), &[]).await;
        let elapsed = started.elapsed();

        assert!(rec.is_hold());
        assert_eq!(rec.confidence, 0);
        assert_eq!(rec.stop_loss_distance_usd, 0.0);
        assert!(rec.reason.contains("after 3 attempts"));
        assert!(rec.reason.contains("down"));
        assert_eq!(oracle.model().calls(), 3);
        // Two waits between three attempts, none after the last
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_try_recommend_reports_last_error() {
        let model = ScriptedModel::always(r#"{"signal":"BUY","confidence":1,"stop_loss_distance_in_usd":1,"take_profit_distance_in_usd":1,"reason":""}"#);
        let mut oracle = client(model, 2, Duration::ZERO);

        let err = oracle.try_recommend(&window(), &[]).await.unwrap_err();
        match err {
            OracleError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, OracleError::Parse(ParseError::UnknownSignal(_))));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let mut oracle = client(ScriptedModel::default(), 0, Duration::ZERO);
        assert_eq!(oracle.max_attempts(), 1);

        let rec = oracle.recommend(&window(), &[]).await;
        assert!(rec.is_hold());
        assert_eq!(oracle.model().calls(), 1);
    }

    #[tokio::test]
    async fn test_pacing_spaces_out_calls() {
        let model = ScriptedModel::new(vec![Err("a".to_string()), Err("b".to_string())]);
        let mut oracle = client(model, 2, Duration::ZERO).with_min_interval(Duration::from_millis(50));

        let started = Instant::now();
        oracle.recommend(&window(), &[]).await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
