use super::SignalFilter;
use crate::indicators::average_true_range;
use crate::models::{Candle, Direction};
use serde::Deserialize;

/// Breakout filter thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Bars before the current one scanned for the breakout range
    pub lookback: usize,
    pub atr_period: usize,
    /// Length of each of the two ATR windows compared for expansion
    pub atr_window: usize,
    /// Current ATR must exceed the previous one by this factor
    pub atr_expansion: f64,
    pub adr_lookback: usize,
    /// Mean bar range as a fraction of price; below this the market is dead
    pub min_adr_pct: f64,
    /// Proportional distance beyond the range required to count as a break
    pub breakout_buffer: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            lookback: 200,
            atr_period: 14,
            atr_window: 20,
            atr_expansion: 1.2,
            adr_lookback: 24,
            min_adr_pct: 0.005,
            breakout_buffer: 0.003,
        }
    }
}

/// A detected range breakout with the measurements behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakout {
    pub direction: Direction,
    /// Range boundary that was broken (prior highest high or lowest low)
    pub level: f64,
    pub atr_now: f64,
    pub atr_prev: f64,
    pub adr_pct: f64,
}

/// Range breakout confirmed by volatility expansion
#[derive(Debug, Clone, Default)]
pub struct BreakoutFilter {
    settings: FilterSettings,
}

impl BreakoutFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Evaluate the window's last candle, None when it is not a candidate
    pub fn evaluate(&self, window: &[Candle]) -> Option<Breakout> {
        let s = &self.settings;
        if window.len() < self.min_candles_required() {
            return None;
        }

        let (current, history) = window.split_last()?;
        let range = &history[history.len() - s.lookback..];

        let highest_high = range.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest_low = range.iter().map(|c| c.low).fold(f64::MAX, f64::min);

        // Two adjacent windows: the latest atr_window bars (plus the prior
        // close they need) against the atr_window bars before them
        let n = window.len();
        let atr_now = average_true_range(&window[n - s.atr_window - 1..], s.atr_period)?;
        let atr_prev = average_true_range(&window[n - 2 * s.atr_window - 1..n - s.atr_window - 1], s.atr_period)?;

        let recent = &window[n - s.adr_lookback..];
        let mean_range = recent.iter().map(|c| c.high - c.low).sum::<f64>() / recent.len() as f64;
        let adr_pct = mean_range / current.close;

        let vol_expansion = atr_now > atr_prev * s.atr_expansion;
        let not_dead = adr_pct >= s.min_adr_pct;
        if !vol_expansion || !not_dead {
            return None;
        }

        let direction = if current.high > highest_high * (1.0 + s.breakout_buffer) {
            Direction::Long
        } else if current.low < lowest_low * (1.0 - s.breakout_buffer) {
            Direction::Short
        } else {
            return None;
        };

        let level = match direction {
            Direction::Long => highest_high,
            Direction::Short => lowest_low,
        };

        tracing::info!(
            "[FILTER] [{}] {} breakout through {:.2} (ATR {:.2} vs {:.2}, ADR {:.2}%)",
            current.time().to_rfc3339(),
            direction,
            level,
            atr_now,
            atr_prev,
            adr_pct * 100.0
        );

        Some(Breakout {
            direction,
            level,
            atr_now,
            atr_prev,
            adr_pct,
        })
    }
}

impl SignalFilter for BreakoutFilter {
    fn is_candidate(&self, window: &[Candle]) -> bool {
        self.evaluate(window).is_some()
    }

    fn name(&self) -> &str {
        "breakout"
    }

    fn min_candles_required(&self) -> usize {
        let s = &self.settings;
        (s.lookback + 1)
            .max(2 * s.atr_window + 1)
            .max(s.adr_lookback)
            .max(2)
    }
}
