use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Candle, ClosedTrade, Direction, OrderParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "Stop-Loss")]
    StopLoss,
    #[serde(rename = "Take-Profit")]
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "Stop-Loss"),
            ExitReason::TakeProfit => write!(f, "Take-Profit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub signal: Direction,
    pub entry_time: i64,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub reason: String,
    pub status: PositionStatus,
    pub exit_time: Option<i64>,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Exit price this candle would trigger, stop-loss first
    fn exit_trigger(&self, candle: &Candle) -> Option<(f64, ExitReason)> {
        let (stop_hit, target_hit) = match self.signal {
            Direction::Long => (
                candle.low <= self.stop_loss_price,
                candle.high >= self.take_profit_price,
            ),
            Direction::Short => (
                candle.high >= self.stop_loss_price,
                candle.low <= self.take_profit_price,
            ),
        };

        if stop_hit {
            Some((self.stop_loss_price, ExitReason::StopLoss))
        } else if target_hit {
            Some((self.take_profit_price, ExitReason::TakeProfit))
        } else {
            None
        }
    }

    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size * self.signal.sign()
    }

    /// Holding time in hours, None while open
    pub fn holding_hours(&self) -> Option<f64> {
        self.exit_time
            .map(|exit| (exit - self.entry_time) as f64 / 3600.0)
    }

    /// Round trip view for feedback into the oracle prompt
    pub fn to_closed_trade(&self) -> Option<ClosedTrade> {
        Some(ClosedTrade {
            side: self.signal,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            exit_time: self.exit_time?,
            exit_price: self.exit_price?,
            size: self.size,
            pnl: self.realized_pnl?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("a position is already open ({0})")]
    AlreadyOpen(Uuid),
    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

/// Single-position state machine and running balance
///
/// FLAT until `open_position`, OPEN until a candle passed to `check_exit`
/// crosses the stop or target. The balance only changes on exit.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    initial_balance: f64,
    balance: f64,
    open: Option<Position>,
    closed: Vec<Position>,
}

impl PositionLedger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            open: None,
            closed: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Get total realized P&L
    pub fn total_pnl(&self) -> f64 {
        self.balance - self.initial_balance
    }

    pub fn has_open_position(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_position(&self) -> Option<&Position> {
        self.open.as_ref()
    }

    /// Closed positions, oldest first
    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    pub fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.closed.iter().filter_map(Position::to_closed_trade).collect()
    }

    /// FLAT -> OPEN; refused while a position is open
    pub fn open(
        &mut self,
        signal: Direction,
        params: &OrderParameters,
        entry_price: f64,
        entry_time: i64,
        reason: impl Into<String>,
    ) -> Result<Uuid, LedgerError> {
        if let Some(existing) = &self.open {
            return Err(LedgerError::AlreadyOpen(existing.id));
        }
        if !(params.size.is_finite() && params.size > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("size {}", params.size)));
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(LedgerError::InvalidOrder(format!("entry price {}", entry_price)));
        }

        let position = Position {
            id: Uuid::new_v4(),
            signal,
            entry_time,
            entry_price,
            size: params.size,
            stop_loss_price: params.stop_loss_price,
            take_profit_price: params.take_profit_price,
            reason: reason.into(),
            status: PositionStatus::Open,
            exit_time: None,
            exit_price: None,
            realized_pnl: None,
            exit_reason: None,
        };

        tracing::info!(
            "[ENTRY] [{}] {} {} @ {} (SL {}, TP {})",
            crate::models::unix_to_utc(entry_time).to_rfc3339(),
            signal,
            position.size,
            entry_price,
            position.stop_loss_price,
            position.take_profit_price
        );

        let id = position.id;
        self.open = Some(position);
        Ok(id)
    }

    /// OPEN -> FLAT when the candle crosses stop or target
    ///
    /// Returns the closed position. When both levels fall inside the same
    /// candle the stop-loss exit is recorded.
    pub fn check_exit(&mut self, candle: &Candle) -> Option<Position> {
        let (exit_price, exit_reason) = self.open.as_ref()?.exit_trigger(candle)?;
        let mut position = self.open.take()?;

        let pnl = position.pnl_at(exit_price);
        position.status = PositionStatus::Closed;
        position.exit_time = Some(candle.timestamp);
        position.exit_price = Some(exit_price);
        position.realized_pnl = Some(pnl);
        position.exit_reason = Some(exit_reason);

        self.balance += pnl;

        tracing::info!(
            "[EXIT] [{}] {} triggered for {} @ {} (P&L ${:.2}, balance ${:.2})",
            candle.time().to_rfc3339(),
            exit_reason,
            position.signal,
            exit_price,
            pnl,
            self.balance
        );

        self.closed.push(position.clone());
        Some(position)
    }

    /// Balance plus the open position marked at `price`
    pub fn equity(&self, price: f64) -> f64 {
        self.balance + self.open.as_ref().map_or(0.0, |p| p.pnl_at(price))
    }
}
