use crate::models::{Direction, FillSide, OrderParameters};
use serde::Serialize;
use serde_json::{json, Value};

/// Entry limit sits this far through the last price to fill like a market order
const ENTRY_SLIPPAGE: f64 = 0.001;
/// Stop-limit price offset beyond the stop trigger
const STOP_SLIPPAGE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Lmt,
    Stp,
}

/// One order of a batch submission, in the exchange's field layout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLeg {
    pub order: &'static str,
    #[serde(rename = "order_tag")]
    pub order_tag: &'static str,
    pub order_type: OrderType,
    pub symbol: String,
    pub side: FillSide,
    pub size: f64,
    pub limit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reduce_only: bool,
}

/// Entry, protective stop and take-profit submitted as one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BracketOrder {
    pub direction: Direction,
    pub params: OrderParameters,
    pub entry: OrderLeg,
    pub stop_loss: OrderLeg,
    pub take_profit: OrderLeg,
}

impl BracketOrder {
    pub fn new(symbol: &str, direction: Direction, params: &OrderParameters, last_price: f64) -> Self {
        let entry_side = direction.entry_side();
        let close_side = direction.exit_side();

        let entry_limit = match direction {
            Direction::Long => (last_price * (1.0 + ENTRY_SLIPPAGE)).round(),
            Direction::Short => (last_price * (1.0 - ENTRY_SLIPPAGE)).round(),
        };
        let stop_limit = match close_side {
            FillSide::Sell => (params.stop_loss_price * (1.0 - STOP_SLIPPAGE)).round(),
            FillSide::Buy => (params.stop_loss_price * (1.0 + STOP_SLIPPAGE)).round(),
        };

        let leg = |tag: &'static str,
                   order_type: OrderType,
                   side: FillSide,
                   limit_price: f64,
                   stop_price: Option<f64>,
                   reduce_only: bool| OrderLeg {
            order: "send",
            order_tag: tag,
            order_type,
            symbol: symbol.to_string(),
            side,
            size: params.size,
            limit_price,
            stop_price,
            reduce_only,
        };

        Self {
            direction,
            params: *params,
            entry: leg("1", OrderType::Lmt, entry_side, entry_limit, None, false),
            stop_loss: leg(
                "2",
                OrderType::Stp,
                close_side,
                stop_limit,
                Some(params.stop_loss_price),
                true,
            ),
            take_profit: leg("3", OrderType::Lmt, close_side, params.take_profit_price, None, true),
        }
    }

    pub fn legs(&self) -> [&OrderLeg; 3] {
        [&self.entry, &self.stop_loss, &self.take_profit]
    }

    /// `{"batchOrder": [entry, stop, take-profit]}`
    pub fn to_batch_payload(&self) -> Value {
        json!({ "batchOrder": self.legs() })
    }
}
