use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Constant,
    Exponential,
    Jittered,
}

/// Wait between failed oracle attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Same delay after every failure (the oracle's rate-limit window)
    Constant(Duration),
    /// `base * 2^(n-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
    /// Uniform in `[0, exponential delay]`
    Jittered { base: Duration, max: Duration },
}

impl BackoffPolicy {
    pub fn from_kind(kind: BackoffKind, base: Duration, max: Duration) -> Self {
        match kind {
            BackoffKind::Constant => BackoffPolicy::Constant(base),
            BackoffKind::Exponential => BackoffPolicy::Exponential { base, max },
            BackoffKind::Jittered => BackoffPolicy::Jittered { base, max },
        }
    }

    /// Delay after the `failed_attempt`-th failure (1-based)
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Constant(delay) => delay,
            BackoffPolicy::Exponential { base, max } => exponential(base, max, failed_attempt),
            BackoffPolicy::Jittered { base, max } => {
                let cap = exponential(base, max, failed_attempt).as_millis() as u64;
                Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Constant(Duration::from_secs(61))
    }
}

fn exponential(base: Duration, max: Duration, failed_attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}
