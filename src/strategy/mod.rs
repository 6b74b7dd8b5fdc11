// Candidate filters gating oracle calls
pub mod breakout;

pub use breakout::{Breakout, BreakoutFilter, FilterSettings};

use crate::models::Candle;

/// Decides whether the current bar justifies an oracle call
///
/// The window's last candle is the current bar. Filters are pure: a short
/// window just means "not a candidate".
pub trait SignalFilter: Send + Sync {
    fn is_candidate(&self, window: &[Candle]) -> bool;

    /// Get filter name
    fn name(&self) -> &str;

    /// Minimum candles required before the filter can approve anything
    fn min_candles_required(&self) -> usize {
        1
    }
}

/// Approves every bar, for exhaustive backtests
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCandidate;

impl SignalFilter for AlwaysCandidate {
    fn is_candidate(&self, window: &[Candle]) -> bool {
        !window.is_empty()
    }

    fn name(&self) -> &str {
        "always"
    }
}

impl<F: SignalFilter + ?Sized> SignalFilter for Box<F> {
    fn is_candidate(&self, window: &[Candle]) -> bool {
        (**self).is_candidate(window)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn min_candles_required(&self) -> usize {
        (**self).min_candles_required()
    }
}
