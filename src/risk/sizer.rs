use crate::models::{Direction, OrderParameters, Recommendation};
use serde::Deserialize;
use thiserror::Error;

/// Position sizing limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Fraction of balance lost if the stop is hit
    pub risk_fraction: f64,
    pub leverage: f64,
    /// Extra margin required on top of notional / leverage
    pub margin_buffer: f64,
    /// Smallest tradable size in base units
    pub min_size: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            risk_fraction: 0.02,
            leverage: 10.0,
            margin_buffer: 0.01,
            min_size: 0.0001,
        }
    }
}

/// Why a recommendation was not turned into an order
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("invalid account balance {0}")]
    InvalidBalance(f64),
    #[error("no position to size for a HOLD")]
    NoDirection,
    #[error("invalid last price {0}")]
    InvalidPrice(f64),
    #[error("invalid stop-loss distance {0}")]
    InvalidStopDistance(f64),
    #[error("invalid take-profit distance {0}")]
    InvalidTakeProfitDistance(f64),
    #[error("insufficient funds: margin required ${required:.2}, available ${available:.2}")]
    InsufficientMargin { required: f64, available: f64 },
    #[error("size {size} below minimum {min}")]
    BelowMinimumSize { size: f64, min: f64 },
    #[error("stop-loss price {0} is not positive")]
    InvalidStopPrice(f64),
}

/// Converts a recommendation into risk-bounded order parameters
#[derive(Debug, Clone, Default)]
pub struct RiskSizer {
    settings: RiskSettings,
}

impl RiskSizer {
    pub fn new(settings: RiskSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    pub fn size(
        &self,
        balance: f64,
        last_price: f64,
        recommendation: &Recommendation,
    ) -> Result<OrderParameters, RiskRejection> {
        let s = &self.settings;

        if !balance.is_finite() || balance <= 0.0 {
            return Err(RiskRejection::InvalidBalance(balance));
        }
        let direction = recommendation.signal.direction().ok_or(RiskRejection::NoDirection)?;
        if !last_price.is_finite() || last_price <= 0.0 {
            return Err(RiskRejection::InvalidPrice(last_price));
        }

        let sl_distance = recommendation.stop_loss_distance_usd;
        let tp_distance = recommendation.take_profit_distance_usd;
        if !sl_distance.is_finite() || sl_distance <= 0.0 {
            return Err(RiskRejection::InvalidStopDistance(sl_distance));
        }
        if !tp_distance.is_finite() || tp_distance <= 0.0 {
            return Err(RiskRejection::InvalidTakeProfitDistance(tp_distance));
        }

        let size = balance * s.risk_fraction / sl_distance;
        let notional = size * last_price;
        let margin_required = notional / s.leverage * (1.0 + s.margin_buffer);

        if margin_required > balance {
            return Err(RiskRejection::InsufficientMargin {
                required: margin_required,
                available: balance,
            });
        }
        if size < s.min_size {
            return Err(RiskRejection::BelowMinimumSize { size, min: s.min_size });
        }

        let (stop_loss_price, take_profit_price) = match direction {
            Direction::Long => (last_price - sl_distance, last_price + tp_distance),
            Direction::Short => (last_price + sl_distance, last_price - tp_distance),
        };
        if stop_loss_price <= 0.0 {
            return Err(RiskRejection::InvalidStopPrice(stop_loss_price));
        }

        let params = OrderParameters {
            size: round_to(size, 4),
            stop_loss_price: round_to(stop_loss_price, 2),
            take_profit_price: round_to(take_profit_price, 2),
        };

        tracing::info!(
            "[RISK] {} size={} SL={} TP={} (margin ${:.2} of ${:.2})",
            direction,
            params.size,
            params.stop_loss_price,
            params.take_profit_price,
            margin_required,
            balance
        );

        Ok(params)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
