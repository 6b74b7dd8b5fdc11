// FIFO matching of exchange fills into round-trip trades
use crate::models::{ClosedTrade, Direction, Fill};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Leftovers below this after a match are treated as fully consumed
const SIZE_EPSILON: f64 = 1e-9;

/// Parse an exchange `{"fills": [...]}` payload or a bare fill array
pub fn parse_fills(json: &str) -> serde_json::Result<Vec<Fill>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        Wrapped { fills: Vec<Fill> },
        Bare(Vec<Fill>),
    }

    Ok(match serde_json::from_str(json)? {
        Payload::Wrapped { fills } => fills,
        Payload::Bare(fills) => fills,
    })
}

/// Unmatched remainder of an opening fill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenLeg {
    pub side: Direction,
    pub entry_time: i64,
    pub entry_price: f64,
    pub remaining_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Round trips, oldest exit first
    pub trades: Vec<ClosedTrade>,
    /// Legs still open after the last fill, oldest first
    pub open_legs: Vec<OpenLeg>,
}

impl Reconciliation {
    /// The `n` most recent round trips, newest last
    pub fn recent(&self, n: usize) -> &[ClosedTrade] {
        &self.trades[self.trades.len().saturating_sub(n)..]
    }

    pub fn realized_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn residual_size(&self) -> f64 {
        self.open_legs.iter().map(|l| l.remaining_size).sum()
    }

    /// Direction of the residual position, if any
    pub fn residual_side(&self) -> Option<Direction> {
        self.open_legs.first().map(|l| l.side)
    }
}

/// Incremental FIFO matcher
///
/// All queued legs share one direction. A fill on the same side adds a
/// leg; an opposite fill consumes legs from the front, and whatever it
/// cannot match opens a new leg in its own direction.
#[derive(Debug, Clone, Default)]
pub struct FillReconciler {
    queue: VecDeque<OpenLeg>,
    trades: Vec<ClosedTrade>,
}

impl FillReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a fill list given in any order
    pub fn reconcile(fills: &[Fill]) -> Reconciliation {
        let mut ordered: Vec<&Fill> = fills.iter().collect();
        ordered.sort_by_key(|f| f.fill_time);

        let mut reconciler = Self::new();
        for fill in ordered {
            reconciler.push(fill);
        }
        reconciler.finish()
    }

    /// Apply the next fill in time order
    pub fn push(&mut self, fill: &Fill) {
        if !(fill.size.is_finite() && fill.size > 0.0) {
            tracing::warn!("Skipping fill with invalid size {} at {}", fill.size, fill.fill_time);
            return;
        }

        let direction = fill.side.direction();
        let mut remaining = fill.size;
        // Sub-epsilon leftovers of a matched fill are rounding noise; an
        // untouched fill is kept however small it is
        let unmatched = |remaining: f64| remaining > SIZE_EPSILON || remaining == fill.size;

        while unmatched(remaining) {
            let Some(head) = self.queue.front_mut() else {
                break;
            };
            if head.side == direction {
                break;
            }

            let consumed = remaining >= head.remaining_size;
            let matched = remaining.min(head.remaining_size);
            self.trades.push(ClosedTrade {
                side: head.side,
                entry_time: head.entry_time,
                entry_price: head.entry_price,
                exit_time: fill.fill_time,
                exit_price: fill.price,
                size: matched,
                pnl: (fill.price - head.entry_price) * matched * head.side.sign(),
            });

            head.remaining_size -= matched;
            remaining -= matched;

            if consumed || head.remaining_size <= SIZE_EPSILON {
                self.queue.pop_front();
            }
        }

        if unmatched(remaining) {
            if remaining < fill.size {
                tracing::warn!(
                    "Fill at {} closed more than was open; {} {} left as a new leg",
                    fill.fill_time,
                    remaining,
                    direction
                );
            }
            self.queue.push_back(OpenLeg {
                side: direction,
                entry_time: fill.fill_time,
                entry_price: fill.price,
                remaining_size: remaining,
            });
        }
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn finish(self) -> Reconciliation {
        Reconciliation {
            trades: self.trades,
            open_legs: self.queue.into_iter().collect(),
        }
    }
}
