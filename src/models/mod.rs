use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// OHLCV candle for the traded instrument
///
/// `timestamp` is the bar's open time in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn time(&self) -> DateTime<Utc> {
        unix_to_utc(self.timestamp)
    }
}

/// Render Unix seconds for logs; out-of-range values fall back to the epoch
pub fn unix_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Trading signal returned by the decision oracle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Long,
    Short,
    Hold,
}

impl Signal {
    /// Direction of the position this signal would open, None for HOLD
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Hold => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LONG" => Some(Signal::Long),
            "SHORT" => Some(Signal::Short),
            "HOLD" => Some(Signal::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Side of an open position or round trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Exchange side that opens a position in this direction
    pub fn entry_side(self) -> FillSide {
        match self {
            Direction::Long => FillSide::Buy,
            Direction::Short => FillSide::Sell,
        }
    }

    pub fn exit_side(self) -> FillSide {
        self.entry_side().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Validated trade plan produced by the decision oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub signal: Signal,
    /// 0..=100
    pub confidence: u8,
    pub stop_loss_distance_usd: f64,
    pub take_profit_distance_usd: f64,
    pub reason: String,
}

impl Recommendation {
    /// HOLD returned in place of an oracle failure
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Hold,
            confidence: 0,
            stop_loss_distance_usd: 0.0,
            take_profit_distance_usd: 0.0,
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.signal == Signal::Hold
    }
}

/// Concrete, risk-bounded order derived from a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderParameters {
    pub size: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillSide {
    Buy,
    Sell,
}

impl FillSide {
    pub fn opposite(self) -> Self {
        match self {
            FillSide::Buy => FillSide::Sell,
            FillSide::Sell => FillSide::Buy,
        }
    }

    /// Direction of the position a leg on this side holds
    pub fn direction(self) -> Direction {
        match self {
            FillSide::Buy => Direction::Long,
            FillSide::Sell => Direction::Short,
        }
    }
}

/// Raw exchange execution record
///
/// `fill_time` deserializes from either Unix seconds or an RFC 3339 string
/// (the exchange's `fillTime` format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: FillSide,
    pub price: f64,
    pub size: f64,
    #[serde(
        rename = "fillTime",
        alias = "fill_time",
        deserialize_with = "deserialize_fill_time"
    )]
    pub fill_time: i64,
}

fn deserialize_fill_time<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Seconds(i64),
        Text(String),
    }

    match RawTime::deserialize(deserializer)? {
        RawTime::Seconds(secs) => Ok(secs),
        RawTime::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.timestamp())
            .map_err(serde::de::Error::custom),
    }
}

/// FIFO-matched round trip with realized P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: Direction,
    pub entry_time: i64,
    pub entry_price: f64,
    pub exit_time: i64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_direction() {
        assert_eq!(Signal::Long.direction(), Some(Direction::Long));
        assert_eq!(Signal::Short.direction(), Some(Direction::Short));
        assert_eq!(Signal::Hold.direction(), None);
    }

    #[test]
    fn test_signal_parse_is_case_sensitive() {
        assert_eq!(Signal::parse("SHORT"), Some(Signal::Short));
        assert_eq!(Signal::parse("short"), None);
        assert_eq!(Signal::parse("BUY"), None);
    }

    #[test]
    fn test_fill_time_accepts_seconds_and_rfc3339() {
        let from_secs: Fill =
            serde_json::from_str(r#"{"side":"buy","price":100.0,"size":1.0,"fillTime":1700000000}"#)
                .unwrap();
        assert_eq!(from_secs.fill_time, 1_700_000_000);

        let from_text: Fill = serde_json::from_str(
            r#"{"side":"sell","price":100.0,"size":1.0,"fillTime":"2023-11-14T22:13:20.000Z"}"#,
        )
        .unwrap();
        assert_eq!(from_text.fill_time, 1_700_000_000);
        assert_eq!(from_text.side, FillSide::Sell);
    }

    #[test]
    fn test_hold_sentinel() {
        let hold = Recommendation::hold("oracle unavailable");
        assert!(hold.is_hold());
        assert_eq!(hold.confidence, 0);
        assert_eq!(hold.stop_loss_distance_usd, 0.0);
        assert_eq!(hold.take_profit_distance_usd, 0.0);
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), FillSide::Buy);
        assert_eq!(Direction::Long.exit_side(), FillSide::Sell);
        assert_eq!(Direction::Short.entry_side(), FillSide::Sell);
        assert_eq!(FillSide::Sell.direction(), Direction::Short);
    }
}
