// Technical indicators used by the breakout filter and the oracle prompt

pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use atr::{average_true_range, calculate_atr, calculate_atr_series};
pub use moving_average::{ema_series, macd_histogram};
pub use rsi::{calculate_rsi, rsi_series};
