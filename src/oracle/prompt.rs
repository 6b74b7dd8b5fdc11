use crate::indicators::{calculate_atr_series, ema_series, macd_histogram, rsi_series};
use crate::models::{Candle, ClosedTrade};
use serde::Serialize;

/// Indicator series are cut to this many most recent values
const SERIES_TAIL: usize = 50;

pub const SYSTEM_PROMPT: &str = "You are an expert quantitative strategist and risk manager for a perpetual futures market. \
Always respond with a single JSON object, no markdown formatting.";

#[derive(Debug, Serialize, Default)]
pub struct IndicatorSeries {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ema50: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ema200: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rsi14: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub macd_histogram: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub atr20: Vec<f64>,
}

impl IndicatorSeries {
    pub fn from_window(window: &[Candle]) -> Self {
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();

        Self {
            ema50: tail(ema_series(&closes, 50)),
            ema200: tail(ema_series(&closes, 200)),
            rsi14: tail(rsi_series(&closes, 14)),
            macd_histogram: tail(macd_histogram(&closes, 12, 26, 9)),
            atr20: tail(calculate_atr_series(window, 20)),
        }
    }
}

fn tail(series: Vec<f64>) -> Vec<f64> {
    let skip = series.len().saturating_sub(SERIES_TAIL);
    series.into_iter().skip(skip).map(round2).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct Payload<'a> {
    ohlc: &'a [Candle],
    indicators: IndicatorSeries,
    recent_trades: &'a [ClosedTrade],
}

/// User prompt for one decision: market data, indicators and recent results
pub fn build_prompt(symbol: &str, window: &[Candle], recent_trades: &[ClosedTrade]) -> String {
    let payload = Payload {
        ohlc: window,
        indicators: IndicatorSeries::from_window(window),
        recent_trades,
    };
    // Serializing plain numbers and strings cannot fail
    let data = serde_json::to_string(&payload).unwrap_or_default();

    format!(
        r#"You are trading the {symbol} market.
Your only job is to produce a single JSON object that defines a complete trade plan.

Market data: the last {count} OHLC candles (timestamps in Unix seconds), indicator series
(most recent values last) and your most recent closed trades:
{data}

Produce:
1. "signal": one of "LONG", "SHORT" or "HOLD".
2. "confidence": 0 to 100. A confidence below 50 must result in "HOLD".
3. "stop_loss_distance_in_usd": stop-loss distance from the current price in USD. 0 when HOLD.
4. "take_profit_distance_in_usd": take-profit distance from the current price in USD. 0 when HOLD.
5. "reason": a step-by-step explanation of the plan.

Return ONLY a JSON object with exactly these five keys."#,
        symbol = symbol,
        count = window.len(),
        data = data,
    )
}
