use thiserror::Error;
use uuid::Uuid;

use super::order::BracketOrder;
use super::position_ledger::{Position, PositionLedger};
use crate::models::{Candle, Fill};

/// Outcome the venue explicitly confirmed
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionReport {
    Accepted { position_id: Uuid },
    Rejected { reason: String },
}

/// The venue could not say what happened
///
/// Callers must not assume a position exists after one of these.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("venue unavailable: {0}")]
    Unavailable(String),
    #[error("order outcome unknown: {0}")]
    UnknownOutcome(String),
}

/// Where orders go and where fills come from
#[allow(async_fn_in_trait)]
pub trait ExecutionVenue {
    async fn balance(&self) -> Result<f64, ExecutionError>;

    async fn has_open_position(&self) -> Result<bool, ExecutionError>;

    /// Evaluate the open position against a closed candle, returning it if it exited
    async fn check_exit(&mut self, candle: &Candle) -> Result<Option<Position>, ExecutionError>;

    /// Submit all three legs; `candle` is the bar the decision was made on
    async fn place_bracket(
        &mut self,
        order: &BracketOrder,
        candle: &Candle,
        reason: &str,
    ) -> Result<ExecutionReport, ExecutionError>;

    /// Every fill so far, in any order
    async fn fills(&self) -> Result<Vec<Fill>, ExecutionError>;
}

/// In-memory venue backed by a `PositionLedger`
///
/// Entries fill at the decision candle's close; exits fill at the stop or
/// target price. Each one is recorded as a `Fill`.
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    ledger: PositionLedger,
    fills: Vec<Fill>,
}

impl SimulatedVenue {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            ledger: PositionLedger::new(initial_balance),
            fills: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }
}

impl ExecutionVenue for SimulatedVenue {
    async fn balance(&self) -> Result<f64, ExecutionError> {
        Ok(self.ledger.balance())
    }

    async fn has_open_position(&self) -> Result<bool, ExecutionError> {
        Ok(self.ledger.has_open_position())
    }

    async fn check_exit(&mut self, candle: &Candle) -> Result<Option<Position>, ExecutionError> {
        let closed = self.ledger.check_exit(candle);

        if let Some(position) = &closed {
            self.fills.push(Fill {
                side: position.signal.exit_side(),
                price: position.exit_price.unwrap_or(candle.close),
                size: position.size,
                fill_time: candle.timestamp,
            });
        }

        Ok(closed)
    }

    async fn place_bracket(
        &mut self,
        order: &BracketOrder,
        candle: &Candle,
        reason: &str,
    ) -> Result<ExecutionReport, ExecutionError> {
        match self
            .ledger
            .open(order.direction, &order.params, candle.close, candle.timestamp, reason)
        {
            Ok(position_id) => {
                self.fills.push(Fill {
                    side: order.direction.entry_side(),
                    price: candle.close,
                    size: order.params.size,
                    fill_time: candle.timestamp,
                });
                Ok(ExecutionReport::Accepted { position_id })
            }
            Err(e) => Ok(ExecutionReport::Rejected { reason: e.to_string() }),
        }
    }

    async fn fills(&self) -> Result<Vec<Fill>, ExecutionError> {
        Ok(self.fills.clone())
    }
}
