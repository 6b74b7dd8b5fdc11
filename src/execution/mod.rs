// Position state, bracket orders and execution venues
pub mod order;
pub mod position_ledger;
pub mod venue;

pub use order::{BracketOrder, OrderLeg, OrderType};
pub use position_ledger::{ExitReason, LedgerError, Position, PositionLedger, PositionStatus};
pub use venue::{ExecutionError, ExecutionReport, ExecutionVenue, SimulatedVenue};
