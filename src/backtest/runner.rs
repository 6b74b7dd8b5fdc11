use crate::backtest::metrics::BacktestMetrics;
use crate::data::CandleStore;
use crate::engine::{CycleAction, CycleOrchestrator};
use crate::execution::SimulatedVenue;
use crate::oracle::DecisionModel;
use crate::strategy::SignalFilter;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("not enough candles for backtest: need more than {needed}, got {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid backtest configuration: {0}")]
    InvalidConfig(String),
}

/// Replays a candle store through the orchestrator, one bar at a time
pub struct BacktestRunner {
    warmup: usize,
}

impl BacktestRunner {
    /// Create a new backtest runner
    ///
    /// # Arguments
    /// * `warmup` - Index of the first bar a cycle runs on
    pub fn new(warmup: usize) -> Self {
        Self { warmup }
    }

    /// Run a backtest over every bar from the warm-up offset to the end
    ///
    /// Each cycle sees only candles up to and including the current bar.
    /// The run stops early once the oracle budget is spent.
    pub async fn run<F: SignalFilter, M: DecisionModel>(
        &self,
        store: &CandleStore,
        orchestrator: &mut CycleOrchestrator<F, M, SimulatedVenue>,
    ) -> Result<BacktestMetrics, BacktestError> {
        let window_size = orchestrator.settings().window_size;
        if window_size < 2 {
            return Err(BacktestError::InvalidConfig(format!(
                "window size must be at least 2, got {}",
                window_size
            )));
        }
        if store.len() <= self.warmup {
            return Err(BacktestError::InsufficientData {
                needed: self.warmup,
                available: store.len(),
            });
        }

        tracing::info!(
            "Starting backtest: {} candles, warm-up {}, window {}, filter {}",
            store.len(),
            self.warmup,
            window_size,
            orchestrator.filter().name()
        );

        let mut cycles = 0;
        for i in self.warmup..store.len() {
            let window = store.window_ending_at(i, window_size);
            let report = orchestrator.run_cycle(window).await;
            cycles += 1;

            if report.action == CycleAction::BudgetExhausted {
                tracing::info!(
                    "Oracle budget exhausted after {} calls, stopping at bar {}",
                    orchestrator.oracle_calls(),
                    i
                );
                break;
            }
        }

        let ledger = orchestrator.venue().ledger();
        let metrics = BacktestMetrics::from_positions(
            ledger.closed_positions(),
            ledger.initial_balance(),
            ledger.balance(),
            orchestrator.oracle_calls(),
            ledger.has_open_position(),
        );

        tracing::info!(
            "Backtest complete after {} cycles: {} trades, P&L: ${:.2} ({:.2}%)",
            cycles,
            metrics.total_trades,
            metrics.total_pnl,
            metrics.total_return_pct
        );

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticDataGenerator};
    use crate::engine::CycleSettings;
    use crate::oracle::{BackoffPolicy, DecisionOracleClient, ScriptedModel};
    use crate::risk::{RiskSettings, RiskSizer};
    use crate::strategy::AlwaysCandidate;
    use std::time::Duration;

    const LONG: &str = r#"{"signal":"LONG","confidence":70,"stop_loss_distance_in_usd":600,"take_profit_distance_in_usd":900,"reason":"test"}"#;

    fn orchestrator(
        model: ScriptedModel,
        max_oracle_calls: u32,
    ) -> CycleOrchestrator<AlwaysCandidate, ScriptedModel, SimulatedVenue> {
        let oracle = DecisionOracleClient::new(
            model,
            "SYNTH",
            1,
            BackoffPolicy::Constant(Duration::from_millis(1)),
        );
        let settings = CycleSettings {
            symbol: "SYNTH".to_string(),
            window_size: 48,
            min_confidence: 0,
            max_oracle_calls,
            recent_trades: 10,
        };
        CycleOrchestrator::new(
            AlwaysCandidate,
            oracle,
            RiskSizer::new(RiskSettings::default()),
            SimulatedVenue::new(10_000.0),
            settings,
        )
    }

    fn store(scenario: MarketScenario, n: usize) -> CandleStore {
        let mut gen = SyntheticDataGenerator::new(42);
        CandleStore::new(gen.generate(scenario, n)).unwrap()
    }

    #[tokio::test]
    async fn test_backtest_trades_and_stops_on_budget() {
        tracing_subscriber::fmt()
            .with_env_filter("perpbot=debug")
            .try_init()
            .ok();

        let mut orch = orchestrator(ScriptedModel::always(LONG), 5);
        let metrics = tokio_test::assert_ok!(
            BacktestRunner::new(48)
                .run(&store(MarketScenario::Volatile, 400), &mut orch)
                .await
        );

        assert_eq!(metrics.oracle_calls, 5);
        assert!(metrics.total_trades >= 4);
        assert_eq!(metrics.winning_trades + metrics.losing_trades, metrics.total_trades);
        assert!((metrics.final_balance - (10_000.0 + metrics.total_pnl)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_backtest_insufficient_data() {
        let mut orch = orchestrator(ScriptedModel::always(LONG), 5);
        let result = BacktestRunner::new(100)
            .run(&store(MarketScenario::Sideways, 50), &mut orch)
            .await;

        let err = tokio_test::assert_err!(result);
        assert_eq!(
            err,
            BacktestError::InsufficientData {
                needed: 100,
                available: 50
            }
        );
    }

    #[tokio::test]
    async fn test_window_never_sees_future_bars() {
        // Warm-up bar 10 with a 48-bar window only has 11 candles available
        let mut orch = orchestrator(ScriptedModel::always(LONG), 1);
        let candles = store(MarketScenario::Sideways, 60);

        BacktestRunner::new(10).run(&candles, &mut orch).await.unwrap();

        let opened = orch
            .venue()
            .ledger()
            .closed_positions()
            .first()
            .map(|p| p.entry_time)
            .or_else(|| orch.venue().ledger().open_position().map(|p| p.entry_time));
        assert_eq!(opened, Some(candles.candles()[10].timestamp));
    }
}
