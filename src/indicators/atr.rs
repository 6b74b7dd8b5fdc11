/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)

use crate::models::Candle;

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect()
}

/// Plain mean of the last `period` true ranges
///
/// When fewer than `period` true ranges exist, all of them are averaged.
/// Returns None if there is not a single true range.
pub fn average_true_range(candles: &[Candle], period: usize) -> Option<f64> {
    let ranges = true_ranges(candles);
    if ranges.is_empty() || period == 0 {
        return None;
    }

    let take = period.min(ranges.len());
    let recent = &ranges[ranges.len() - take..];
    Some(recent.iter().sum::<f64>() / take as f64)
}

/// Wilder-smoothed ATR series, one value per candle from index `period` on
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let ranges = true_ranges(candles);

    // First ATR is simple average of first 'period' true ranges
    let first_atr: f64 = ranges.iter().take(period).sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(ranges.len() - period + 1);
    series.push(first_atr);

    let mut atr = first_atr;
    for tr in &ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series.push(atr);
    }

    series
}

/// Latest Wilder ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied()
}
