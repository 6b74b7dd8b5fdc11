pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestMetrics, TradeRecord};
pub use runner::{BacktestError, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
