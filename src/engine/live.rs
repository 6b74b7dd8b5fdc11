use super::orchestrator::{CycleOrchestrator, CycleReport};
use crate::data::{CandleSource, FeedError};
use crate::execution::ExecutionVenue;
use crate::models::Candle;
use crate::oracle::DecisionModel;
use crate::strategy::SignalFilter;
use crate::Result;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Drives the orchestrator from a live candle feed on a fixed timer
///
/// At most one cycle runs per closed bar; a tick that finds no new bar is
/// skipped. Closed bars between the last processed bar and the latest one
/// (missed ticks, feed outages) are still checked for exits, oldest first.
pub struct LiveRunner<S, F, M, V>
where
    S: CandleSource,
    F: SignalFilter,
    M: DecisionModel,
    V: ExecutionVenue,
{
    source: S,
    orchestrator: CycleOrchestrator<F, M, V>,
    cycle_interval: Duration,
    last_bar: Option<i64>,
}

impl<S, F, M, V> LiveRunner<S, F, M, V>
where
    S: CandleSource,
    F: SignalFilter,
    M: DecisionModel,
    V: ExecutionVenue,
{
    pub fn new(source: S, orchestrator: CycleOrchestrator<F, M, V>, cycle_interval: Duration) -> Self {
        Self {
            source,
            orchestrator,
            cycle_interval,
            last_bar: None,
        }
    }

    pub fn orchestrator(&self) -> &CycleOrchestrator<F, M, V> {
        &self.orchestrator
    }

    /// Timestamp of the last bar a cycle ran on
    pub fn last_bar(&self) -> Option<i64> {
        self.last_bar
    }

    /// Fetch closed candles and run a cycle if the latest bar is new
    ///
    /// Returns the report for the latest bar only.
    pub async fn poll(&mut self) -> std::result::Result<Option<CycleReport>, FeedError> {
        let candles = self.source.closed_candles().await?;
        Ok(self.process(&candles).await)
    }

    async fn process(&mut self, candles: &[Candle]) -> Option<CycleReport> {
        let latest = candles.last()?;

        if self.last_bar.is_some_and(|last| latest.timestamp <= last) {
            tracing::debug!("No new closed bar since {}, skipping cycle", latest.time().to_rfc3339());
            return None;
        }

        if let Some(last) = self.last_bar {
            for missed in candles
                .iter()
                .filter(|c| c.timestamp > last && c.timestamp < latest.timestamp)
            {
                self.orchestrator.check_missed_bar(missed).await;
            }
        }

        let size = self.orchestrator.settings().window_size;
        let window = &candles[candles.len().saturating_sub(size)..];

        let report = self.orchestrator.run_cycle(window).await;
        self.last_bar = Some(latest.timestamp);
        Some(report)
    }

    /// Run until Ctrl-C
    ///
    /// Too little history on the first fetch is fatal; later feed errors
    /// only skip the tick.
    pub async fn run(&mut self) -> Result<()> {
        let candles = self.source.closed_candles().await?;
        let required = self.orchestrator.filter().min_candles_required();
        if candles.len() < required {
            return Err(format!(
                "Not enough candles for live trading. Need {}, got {}",
                required,
                candles.len()
            )
            .into());
        }

        tracing::info!(
            "Starting live loop: {} candles of history, cycle every {:?}",
            candles.len(),
            self.cycle_interval
        );
        self.process(&candles).await;

        let mut ticker = interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        tracing::warn!("Candle feed failed, skipping cycle: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        tracing::info!(
            "Live loop stopped after {} oracle calls",
            self.orchestrator.oracle_calls()
        );

        Ok(())
    }
}
