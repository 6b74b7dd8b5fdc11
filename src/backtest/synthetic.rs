use crate::models::Candle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 2023-11-14 22:00 UTC, on an hour boundary
const START_TIME: i64 = 1_700_000_000 - 1_700_000_000 % 3600;
const HOUR: i64 = 3600;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Tight range for the first 80% of bars, then a widening rally
    RangeBreakout,
}

/// Generates hourly synthetic candles for backtesting
///
/// The same seed always produces the same series, timestamps included.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 30_000.0,
            base_volume: 250.0,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate `num_candles` hourly candles for a market scenario
    pub fn generate(&mut self, scenario: MarketScenario, num_candles: usize) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;
        let mean_price = self.base_price;
        let breakout_at = num_candles * 4 / 5;

        // Per-hour drift for ±2% a day
        let drift = 0.02 / 24.0;

        for i in 0..num_candles {
            let timestamp = START_TIME + i as i64 * HOUR;
            let mut wick = 0.002;

            price += match scenario {
                MarketScenario::Uptrend => price * (drift + self.rng.gen_range(-0.001..0.001)),
                MarketScenario::Downtrend => price * (-drift + self.rng.gen_range(-0.001..0.001)),
                MarketScenario::Sideways => {
                    (mean_price - price) * 0.1 + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * self.rng.gen_range(-0.05..0.05),
                MarketScenario::RangeBreakout if i < breakout_at => {
                    wick = 0.001;
                    (mean_price - price) * 0.5 + price * self.rng.gen_range(-0.001..0.001)
                }
                MarketScenario::RangeBreakout => {
                    wick = 0.01;
                    price * self.rng.gen_range(0.005..0.02)
                }
            };

            // Prevent price from going too low
            price = price.max(self.base_price * 0.5);

            candles.push(self.create_candle(price, timestamp, wick));
        }

        candles
    }

    /// Build a consistent OHLC bar around `price`
    fn create_candle(&mut self, price: f64, timestamp: i64, wick: f64) -> Candle {
        let high = price * (1.0 + self.rng.gen_range(0.0..wick));
        let low = price * (1.0 - self.rng.gen_range(0.0..wick));

        let open_raw = price * (1.0 + self.rng.gen_range(-wick..wick));
        let open = open_raw.clamp(low, high);

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}
