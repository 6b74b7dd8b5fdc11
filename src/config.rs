use crate::data::FeedSettings;
use crate::oracle::OracleSettings;
use crate::persistence::JournalSettings;
use crate::risk::RiskSettings;
use crate::strategy::FilterSettings;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix, e.g. `PERPBOT_RISK__LEVERAGE=5`
pub const ENV_PREFIX: &str = "PERPBOT";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Backtest,
    Live,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub mode: RunMode,
    pub symbol: String,
    /// Candle CSV for backtests
    pub data_path: PathBuf,
    /// First UTC day included
    pub start_date: Option<NaiveDate>,
    /// First UTC day excluded
    pub end_date: Option<NaiveDate>,
    pub initial_balance: f64,
    pub min_confidence: u8,
    /// Index of the first backtest bar
    pub warmup: usize,
    pub window_size: usize,
    pub max_oracle_calls: u32,
    pub min_seconds_between_calls: u64,
    pub cycle_interval_secs: u64,
    pub recent_trades: usize,
    /// Skip the breakout filter and consult the oracle on every flat bar
    pub always_candidate: bool,
    /// Write closed positions here as JSON after a run
    pub trades_out: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::Backtest,
            symbol: "PF_XBTUSD".to_string(),
            data_path: PathBuf::from("./data/XBTUSD_60m_data.csv"),
            start_date: None,
            end_date: None,
            initial_balance: 10_000.0,
            min_confidence: 0,
            warmup: 720,
            window_size: 720,
            max_oracle_calls: 100,
            min_seconds_between_calls: 10,
            cycle_interval_secs: 3600,
            recent_trades: 10,
            always_candidate: false,
            trades_out: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunSettings,
    pub risk: RiskSettings,
    pub filter: FilterSettings,
    pub oracle: OracleSettings,
    pub feed: FeedSettings,
    pub journal: JournalSettings,
}

impl Settings {
    /// Built-in defaults, then `path` if given, then `PERPBOT_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject values no run can start with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let run = &self.run;

        if !(run.initial_balance.is_finite() && run.initial_balance > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "initial balance must be positive, got {}",
                run.initial_balance
            )));
        }
        if run.window_size < 2 {
            return Err(SettingsError::Invalid(format!(
                "window size must be at least 2, got {}",
                run.window_size
            )));
        }
        if !(self.risk.risk_fraction > 0.0 && self.risk.risk_fraction <= 1.0) {
            return Err(SettingsError::Invalid(format!(
                "risk fraction must be in (0, 1], got {}",
                self.risk.risk_fraction
            )));
        }
        if !(self.risk.leverage.is_finite() && self.risk.leverage > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "leverage must be positive, got {}",
                self.risk.leverage
            )));
        }
        let filter = &self.filter;
        for (name, value) in [
            ("lookback", filter.lookback),
            ("atr_period", filter.atr_period),
            ("atr_window", filter.atr_window),
            ("adr_lookback", filter.adr_lookback),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid(format!("filter {} must be at least 1", name)));
            }
        }
        if !(filter.atr_expansion.is_finite() && filter.atr_expansion > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "filter atr_expansion must be positive, got {}",
                filter.atr_expansion
            )));
        }
        if self.oracle.max_attempts < 1 {
            return Err(SettingsError::Invalid("oracle max_attempts must be at least 1".to_string()));
        }
        if let (Some(start), Some(end)) = (run.start_date, run.end_date) {
            if start >= end {
                return Err(SettingsError::Invalid(format!(
                    "start date {} must be before end date {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}

/// Oracle API key from `ORACLE_API_KEY`, falling back to `OPENAI_API_KEY`
pub fn oracle_api_key() -> Option<String> {
    std::env::var("ORACLE_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|key| !key.trim().is_empty())
}
