use yata::core::Method;
use yata::methods::EMA;

/// Exponential moving average series
///
/// The first `period - 1` outputs are warm-up and are dropped, so the
/// series is aligned with `values[period - 1..]`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let Ok(length) = u8::try_from(period) else {
        return Vec::new();
    };

    let mut ema = match EMA::new(length, &values[0]) {
        Ok(ema) => ema,
        Err(e) => {
            tracing::debug!("EMA({}) init failed: {:?}", period, e);
            return Vec::new();
        }
    };

    values
        .iter()
        .map(|v| ema.next(v))
        .skip(period - 1)
        .collect()
}

/// MACD histogram (MACD line minus its signal line)
pub fn macd_histogram(values: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<f64> {
    if fast >= slow {
        return Vec::new();
    }

    let fast_ema = ema_series(values, fast);
    let slow_ema = ema_series(values, slow);
    if slow_ema.is_empty() {
        return Vec::new();
    }

    // Align the fast series with the slow one
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .zip(&fast_ema[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal);
    if signal_line.is_empty() {
        return Vec::new();
    }

    macd_line[signal - 1..]
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_constant_series() {
        let values = vec![100.0; 30];
        let ema = ema_series(&values, 10);

        assert_eq!(ema.len(), 21);
        assert!(ema.iter().all(|v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_ema_follows_trend() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let ema = ema_series(&values, 5);

        // Lags behind a rising series but keeps rising
        assert!(ema.last().unwrap() < values.last().unwrap());
        assert!(ema.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_ema_insufficient_data() {
        assert!(ema_series(&[1.0, 2.0], 5).is_empty());
        assert!(ema_series(&vec![1.0; 300], 300).is_empty());
    }

    #[test]
    fn test_macd_histogram_flat_market() {
        let values = vec![50.0; 60];
        let hist = macd_histogram(&values, 12, 26, 9);

        // 60 - 26 + 1 macd values, minus 8 for the signal warm-up
        assert_eq!(hist.len(), 27);
        assert!(hist.iter().all(|v| v.abs() < 1e-9));
    }
}
