// Risk management module
pub mod sizer;

pub use sizer::{round_to, RiskRejection, RiskSettings, RiskSizer};
