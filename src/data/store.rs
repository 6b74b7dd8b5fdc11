use crate::models::Candle;
use crate::Result;
use chrono::NaiveDate;
use csv::Reader;
use std::path::Path;

/// Ordered, immutable candle history for one instrument
///
/// Timestamps are strictly increasing. Windows handed out are borrowed
/// slices, so a cycle's view cannot change underneath it.
#[derive(Debug, Clone, Default)]
pub struct CandleStore {
    candles: Vec<Candle>,
}

impl CandleStore {
    /// Build a store, rejecting unordered or malformed candles
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        for (i, candle) in candles.iter().enumerate() {
            validate_candle(candle).map_err(|e| format!("candle #{}: {}", i, e))?;
        }

        if let Some(pair) = candles
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(format!(
                "candles out of order: {} followed by {}",
                pair[0].timestamp, pair[1].timestamp
            )
            .into());
        }

        Ok(Self { candles })
    }

    /// Load a CSV with header `timestamp,open,high,low,close,volume`
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = Reader::from_path(path)
            .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;

        let mut candles = Vec::new();
        for (line, record) in reader.deserialize::<Candle>().enumerate() {
            // +2: header row and 1-based lines
            let candle = record.map_err(|e| format!("{} line {}: {}", path.display(), line + 2, e))?;
            candles.push(candle);
        }

        tracing::info!("Loaded {} historical candles from {}", candles.len(), path.display());

        Self::new(candles)
    }

    /// Keep candles with `start <= date < end` (UTC calendar dates)
    pub fn filter_by_date(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let start_ts = start.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|t| t.and_utc().timestamp());
        let end_ts = end.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|t| t.and_utc().timestamp());

        let candles = self
            .candles
            .into_iter()
            .filter(|c| start_ts.map_or(true, |s| c.timestamp >= s))
            .filter(|c| end_ts.map_or(true, |e| c.timestamp < e))
            .collect();

        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// Up to `size` candles ending at (and including) `index`
    pub fn window_ending_at(&self, index: usize, size: usize) -> &[Candle] {
        if index >= self.candles.len() || size == 0 {
            return &[];
        }
        let start = (index + 1).saturating_sub(size);
        &self.candles[start..=index]
    }
}

fn validate_candle(candle: &Candle) -> std::result::Result<(), String> {
    let prices = [candle.open, candle.high, candle.low, candle.close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err("prices must be finite and positive".to_string());
    }
    if !candle.volume.is_finite() || candle.volume < 0.0 {
        return Err("volume must be finite and non-negative".to_string());
    }
    if candle.high < candle.open.max(candle.close) || candle.low > candle.open.min(candle.close) {
        return Err(format!(
            "inconsistent OHLC at {}: o={} h={} l={} c={}",
            candle.timestamp, candle.open, candle.high, candle.low, candle.close
        ));
    }
    Ok(())
}
