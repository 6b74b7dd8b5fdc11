use crate::execution::{BracketOrder, ExecutionReport, ExecutionVenue, Position};
use crate::models::{Candle, ClosedTrade, Direction, OrderParameters};
use crate::oracle::{DecisionModel, DecisionOracleClient};
use crate::persistence::Journal;
use crate::reconcile::FillReconciler;
use crate::risk::{RiskRejection, RiskSizer};
use crate::strategy::SignalFilter;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub symbol: String,
    /// Candles handed to the filter and the oracle, current bar last
    pub window_size: usize,
    /// Recommendations below this confidence are skipped
    pub min_confidence: u8,
    /// Hard cap on oracle calls for the lifetime of the orchestrator
    pub max_oracle_calls: u32,
    /// Closed trades fed back into each prompt
    pub recent_trades: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            symbol: "PF_XBTUSD".to_string(),
            window_size: 720,
            min_confidence: 0,
            max_oracle_calls: 100,
            recent_trades: 10,
        }
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    /// The open position hit its stop or target on this bar
    Exited(Position),
    /// A position is open and neither level was touched
    Holding,
    NoCandidate,
    /// A candidate appeared but no oracle calls are left
    BudgetExhausted,
    /// The oracle said HOLD, or failed and fell back to HOLD
    Hold { reason: String },
    LowConfidence { confidence: u8 },
    RiskRejected(RiskRejection),
    /// The venue explicitly refused the bracket
    Rejected { reason: String },
    /// The venue could not report an outcome; no position is assumed
    ExecutionFailed(String),
    Opened {
        position_id: Uuid,
        direction: Direction,
        params: OrderParameters,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Timestamp of the bar the cycle ran on
    pub timestamp: i64,
    pub action: CycleAction,
}

/// One decision cycle per closed candle, shared by backtest and live runs
///
/// Owns every piece of mutable run state (oracle budget, venue, feedback
/// history) so independent runs can coexist in one process.
pub struct CycleOrchestrator<F: SignalFilter, M: DecisionModel, V: ExecutionVenue> {
    filter: F,
    oracle: DecisionOracleClient<M>,
    sizer: RiskSizer,
    venue: V,
    settings: CycleSettings,
    oracle_calls: u32,
    /// Trades from before this run, oldest first
    history: Vec<ClosedTrade>,
    journal: Option<Journal>,
}

impl<F: SignalFilter, M: DecisionModel, V: ExecutionVenue> CycleOrchestrator<F, M, V> {
    pub fn new(
        filter: F,
        oracle: DecisionOracleClient<M>,
        sizer: RiskSizer,
        venue: V,
        settings: CycleSettings,
    ) -> Self {
        Self {
            filter,
            oracle,
            sizer,
            venue,
            settings,
            oracle_calls: 0,
            history: Vec::new(),
            journal: None,
        }
    }

    /// Record every exit in `journal`
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Seed the feedback history with trades closed before this run
    pub fn with_history(mut self, trades: Vec<ClosedTrade>) -> Self {
        self.history = trades;
        self
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn oracle(&self) -> &DecisionOracleClient<M> {
        &self.oracle
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn oracle_calls(&self) -> u32 {
        self.oracle_calls
    }

    pub fn budget_exhausted(&self) -> bool {
        self.oracle_calls >= self.settings.max_oracle_calls
    }

    /// Run one cycle; the last candle of `window` is the current bar
    ///
    /// Never fails: every recoverable problem is reported through the
    /// returned action.
    pub async fn run_cycle(&mut self, window: &[Candle]) -> CycleReport {
        let Some(current) = window.last() else {
            return CycleReport {
                timestamp: 0,
                action: CycleAction::NoCandidate,
            };
        };

        let action = self.decide(window, current).await;

        match &action {
            CycleAction::NoCandidate | CycleAction::Holding => {
                tracing::debug!("[{}] {:?}", current.time().to_rfc3339(), action)
            }
            CycleAction::Opened { .. } | CycleAction::Exited(_) => {}
            _ => tracing::info!("[{}] Cycle outcome: {:?}", current.time().to_rfc3339(), action),
        }

        CycleReport {
            timestamp: current.timestamp,
            action,
        }
    }

    /// Check the open position against a bar that gets no full cycle
    ///
    /// Used by the live loop for closed bars it did not see on time. Returns
    /// None when flat, since entries are only taken on the latest bar.
    pub async fn check_missed_bar(&mut self, candle: &Candle) -> Option<CycleReport> {
        let action = self.manage_open_position(candle).await?;
        tracing::info!("[{}] Missed bar: {:?}", candle.time().to_rfc3339(), action);

        Some(CycleReport {
            timestamp: candle.timestamp,
            action,
        })
    }

    /// Exit handling while a position is open, None when flat
    async fn manage_open_position(&mut self, current: &Candle) -> Option<CycleAction> {
        let has_open = match self.venue.has_open_position().await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!("Could not read position state: {}", e);
                return Some(CycleAction::ExecutionFailed(e.to_string()));
            }
        };

        if !has_open {
            return None;
        }

        Some(match self.venue.check_exit(current).await {
            Ok(Some(position)) => {
                self.journal_exit(&position).await;
                CycleAction::Exited(position)
            }
            Ok(None) => CycleAction::Holding,
            Err(e) => {
                tracing::warn!("Exit check failed: {}", e);
                CycleAction::ExecutionFailed(e.to_string())
            }
        })
    }

    async fn decide(&mut self, window: &[Candle], current: &Candle) -> CycleAction {
        if let Some(action) = self.manage_open_position(current).await {
            return action;
        }

        if window.len() < self.filter.min_candles_required() || !self.filter.is_candidate(window) {
            return CycleAction::NoCandidate;
        }

        if self.budget_exhausted() {
            tracing::warn!(
                "Oracle budget of {} calls exhausted, skipping candidate",
                self.settings.max_oracle_calls
            );
            return CycleAction::BudgetExhausted;
        }

        let recent = self.recent_trades(current.timestamp).await;
        self.oracle_calls += 1;
        tracing::info!(
            "[{}] {} candidate, consulting oracle (call {}/{})",
            current.time().to_rfc3339(),
            self.filter.name(),
            self.oracle_calls,
            self.settings.max_oracle_calls
        );
        let recommendation = self.oracle.recommend(window, &recent).await;

        let Some(direction) = recommendation.signal.direction() else {
            return CycleAction::Hold {
                reason: recommendation.reason,
            };
        };

        if recommendation.confidence < self.settings.min_confidence {
            return CycleAction::LowConfidence {
                confidence: recommendation.confidence,
            };
        }

        let balance = match self.venue.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Could not read balance: {}", e);
                return CycleAction::ExecutionFailed(e.to_string());
            }
        };

        let params = match self.sizer.size(balance, current.close, &recommendation) {
            Ok(params) => params,
            Err(rejection) => {
                tracing::warn!("[RISK] Skipping trade: {}", rejection);
                return CycleAction::RiskRejected(rejection);
            }
        };

        let order = BracketOrder::new(&self.settings.symbol, direction, &params, current.close);
        tracing::debug!("Bracket order payload: {}", order.to_batch_payload());

        match self
            .venue
            .place_bracket(&order, current, &recommendation.reason)
            .await
        {
            Ok(ExecutionReport::Accepted { position_id }) => CycleAction::Opened {
                position_id,
                direction,
                params,
            },
            Ok(ExecutionReport::Rejected { reason }) => {
                tracing::warn!("Venue rejected bracket order: {}", reason);
                CycleAction::Rejected { reason }
            }
            Err(e) => {
                tracing::error!("Bracket order outcome unknown, not recording a position: {}", e);
                CycleAction::ExecutionFailed(e.to_string())
            }
        }
    }

    /// Prior-run history followed by this run's reconciled fills, newest last
    ///
    /// Only trades closed by `as_of` are included, so a backtest over old
    /// bars never sees journaled trades from later runs.
    pub async fn recent_trades(&self, as_of: i64) -> Vec<ClosedTrade> {
        let mut trades: Vec<ClosedTrade> = self
            .history
            .iter()
            .filter(|t| t.exit_time <= as_of)
            .cloned()
            .collect();

        match self.venue.fills().await {
            Ok(fills) => trades.extend(
                FillReconciler::reconcile(&fills)
                    .trades
                    .into_iter()
                    .filter(|t| t.exit_time <= as_of),
            ),
            Err(e) => tracing::warn!("Could not load fills for trade history: {}", e),
        }

        let skip = trades.len().saturating_sub(self.settings.recent_trades);
        trades.split_off(skip)
    }

    async fn journal_exit(&self, position: &Position) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(position).await {
                tracing::warn!("Failed to journal position {}: {}", position.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionError, SimulatedVenue};
    use crate::models::Fill;
    use crate::oracle::{BackoffPolicy, ScriptedModel};
    use crate::persistence::TradeJournal;
    use crate::risk::RiskSettings;
    use crate::strategy::AlwaysCandidate;
    use std::time::Duration;

    const LONG: &str = r#"{"signal":"LONG","confidence":80,"stop_loss_distance_in_usd":5,"take_profit_distance_in_usd":10,"reason":"breakout"}"#;
    const HOLD: &str = r#"{"signal":"HOLD","confidence":95,"stop_loss_distance_in_usd":5,"take_profit_distance_in_usd":10,"reason":"chop"}"#;

    fn candle(i: i64, close: f64, high: f64, low: f64) -> Candle {
        Candle {
            timestamp: 1_700_000_000 + i * 3600,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn flat_window(n: i64) -> Vec<Candle> {
        (0..n).map(|i| candle(i, 100.0, 100.5, 99.5)).collect()
    }

    fn settings() -> CycleSettings {
        CycleSettings {
            symbol: "PF_XBTUSD".to_string(),
            window_size: 10,
            min_confidence: 50,
            max_oracle_calls: 2,
            recent_trades: 10,
        }
    }

    fn orchestrator<V: ExecutionVenue>(
        model: ScriptedModel,
        venue: V,
    ) -> CycleOrchestrator<AlwaysCandidate, ScriptedModel, V> {
        let oracle = DecisionOracleClient::new(
            model,
            "PF_XBTUSD",
            2,
            BackoffPolicy::Constant(Duration::from_millis(1)),
        );
        CycleOrchestrator::new(
            AlwaysCandidate,
            oracle,
            RiskSizer::new(RiskSettings::default()),
            venue,
            settings(),
        )
    }

    /// Venue whose order endpoint never answers
    struct UnreachableVenue;

    impl ExecutionVenue for UnreachableVenue {
        async fn balance(&self) -> Result<f64, ExecutionError> {
            Ok(10_000.0)
        }

        async fn has_open_position(&self) -> Result<bool, ExecutionError> {
            Ok(false)
        }

        async fn check_exit(&mut self, _candle: &Candle) -> Result<Option<Position>, ExecutionError> {
            Ok(None)
        }

        async fn place_bracket(
            &mut self,
            _order: &BracketOrder,
            _candle: &Candle,
            _reason: &str,
        ) -> Result<ExecutionReport, ExecutionError> {
            Err(ExecutionError::UnknownOutcome("timeout".to_string()))
        }

        async fn fills(&self) -> Result<Vec<Fill>, ExecutionError> {
            Err(ExecutionError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hold_never_opens() {
        let mut orch = orchestrator(ScriptedModel::always(HOLD), SimulatedVenue::new(10_000.0));

        let report = orch.run_cycle(&flat_window(10)).await;

        assert_eq!(
            report.action,
            CycleAction::Hold {
                reason: "chop".to_string()
            }
        );
        assert!(!orch.venue().ledger().has_open_position());
        assert_eq!(orch.oracle_calls(), 1);
    }

    #[tokio::test]
    async fn test_long_opens_then_exits_at_target() {
        let mut orch = orchestrator(ScriptedModel::always(LONG), SimulatedVenue::new(10_000.0));
        let mut window = flat_window(10);

        let report = orch.run_cycle(&window).await;
        let CycleAction::Opened { direction, params, .. } = report.action else {
            panic!("expected an open, got {:?}", report.action);
        };
        assert_eq!(direction, Direction::Long);
        assert_eq!(params.stop_loss_price, 95.0);
        assert_eq!(params.take_profit_price, 110.0);

        // Open position: only exits are evaluated, no further oracle calls
        window.push(candle(10, 101.0, 102.0, 100.0));
        assert_eq!(orch.run_cycle(&window).await.action, CycleAction::Holding);

        window.push(candle(11, 109.0, 111.0, 104.0));
        let report = orch.run_cycle(&window).await;
        assert!(matches!(report.action, CycleAction::Exited(_)));
        assert_eq!(orch.oracle_calls(), 1);
        assert!(orch.venue().ledger().balance() > 10_000.0);
    }

    #[tokio::test]
    async fn test_unknown_execution_outcome_records_nothing() {
        let mut orch = orchestrator(ScriptedModel::always(LONG), UnreachableVenue);

        let report = orch.run_cycle(&flat_window(10)).await;

        assert!(matches!(report.action, CycleAction::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_budget_caps_oracle_calls() {
        let model = ScriptedModel::always(HOLD);
        let mut orch = orchestrator(model, SimulatedVenue::new(10_000.0));
        let window = flat_window(10);

        orch.run_cycle(&window).await;
        orch.run_cycle(&window).await;
        let report = orch.run_cycle(&window).await;

        assert_eq!(report.action, CycleAction::BudgetExhausted);
        assert_eq!(orch.oracle_calls(), 2);
        assert_eq!(orch.oracle().model().calls(), 2);
    }

    #[tokio::test]
    async fn test_oracle_failure_counts_once_and_holds() {
        let model = ScriptedModel::new(vec![Err("timeout".to_string()), Ok("not json".to_string())]);
        let mut orch = orchestrator(model, SimulatedVenue::new(10_000.0));

        let report = orch.run_cycle(&flat_window(10)).await;

        assert!(matches!(report.action, CycleAction::Hold { .. }));
        assert_eq!(orch.oracle_calls(), 1);
        assert_eq!(orch.oracle().model().calls(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_skipped() {
        let low = LONG.replace("80", "20");
        let mut orch = orchestrator(ScriptedModel::always(low), SimulatedVenue::new(10_000.0));

        let report = orch.run_cycle(&flat_window(10)).await;

        assert_eq!(report.action, CycleAction::LowConfidence { confidence: 20 });
        assert!(!orch.venue().ledger().has_open_position());
    }

    #[tokio::test]
    async fn test_zero_stop_distance_rejected() {
        let zero = LONG.replace("\"stop_loss_distance_in_usd\":5", "\"stop_loss_distance_in_usd\":0");
        let mut orch = orchestrator(ScriptedModel::always(zero), SimulatedVenue::new(10_000.0));

        let report = orch.run_cycle(&flat_window(10)).await;

        assert_eq!(
            report.action,
            CycleAction::RiskRejected(RiskRejection::InvalidStopDistance(0.0))
        );
    }

    #[tokio::test]
    async fn test_exit_is_journaled() {
        let path = std::env::temp_dir().join(format!("perpbot-orch-{}.jsonl", Uuid::new_v4()));
        let mut orch = orchestrator(ScriptedModel::always(LONG), SimulatedVenue::new(10_000.0))
            .with_journal(Journal::File(TradeJournal::new(&path)));
        let mut window = flat_window(10);

        orch.run_cycle(&window).await;
        window.push(candle(10, 96.0, 100.0, 94.0));
        orch.run_cycle(&window).await;

        let journaled = TradeJournal::new(&path).recent(10).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(journaled.len(), 1);
        assert_eq!(journaled[0].exit_price, Some(95.0));
    }

    fn past_trade(exit_time: i64) -> ClosedTrade {
        ClosedTrade {
            side: Direction::Long,
            entry_time: exit_time - 3600,
            entry_price: 100.0,
            exit_time,
            exit_price: 101.0,
            size: 1.0,
            pnl: 1.0,
        }
    }

    #[tokio::test]
    async fn test_round_trip_reaches_next_prompt() {
        let mut orch = orchestrator(ScriptedModel::always(LONG), SimulatedVenue::new(10_000.0));
        let mut window = flat_window(10);

        orch.run_cycle(&window).await;
        window.push(candle(10, 109.0, 111.0, 104.0));
        assert!(matches!(orch.run_cycle(&window).await.action, CycleAction::Exited(_)));

        window.push(candle(11, 100.0, 100.5, 99.5));
        orch.run_cycle(&window).await;

        let prompts = orch.oracle().model().prompts();
        assert_eq!(prompts.len(), 2);
        let exit_key = format!("\"exit_time\":{}", 1_700_000_000 + 10 * 3600);
        assert!(!prompts[0].contains(&exit_key));
        assert!(prompts[1].contains(&exit_key));
    }

    #[tokio::test]
    async fn test_recent_trades_merges_history_and_fills() {
        let oracle = DecisionOracleClient::new(
            ScriptedModel::always(LONG),
            "PF_XBTUSD",
            1,
            BackoffPolicy::Constant(Duration::from_millis(1)),
        );
        let history = vec![
            past_trade(1_690_000_000),
            past_trade(1_690_003_600),
            past_trade(1_690_007_200),
            // Journaled by a later run
            past_trade(1_800_000_000),
        ];
        let mut orch = CycleOrchestrator::new(
            AlwaysCandidate,
            oracle,
            RiskSizer::new(RiskSettings::default()),
            SimulatedVenue::new(10_000.0),
            CycleSettings {
                recent_trades: 3,
                ..settings()
            },
        )
        .with_history(history);

        let mut window = flat_window(10);
        orch.run_cycle(&window).await;
        let exit_bar = candle(10, 109.0, 111.0, 104.0);
        window.push(exit_bar.clone());
        orch.run_cycle(&window).await;

        let recent = orch.recent_trades(exit_bar.timestamp).await;
        let exits: Vec<i64> = recent.iter().map(|t| t.exit_time).collect();
        assert_eq!(exits, vec![1_690_003_600, 1_690_007_200, exit_bar.timestamp]);
        assert_eq!(recent[2].exit_price, 110.0);

        // Nothing closed after the bar being decided is visible
        let earlier = orch.recent_trades(exit_bar.timestamp - 1).await;
        let exits: Vec<i64> = earlier.iter().map(|t| t.exit_time).collect();
        assert_eq!(exits, vec![1_690_000_000, 1_690_003_600, 1_690_007_200]);
    }

    #[tokio::test]
    async fn test_missed_bar_checks_exits_only() {
        let mut orch = orchestrator(ScriptedModel::always(LONG), SimulatedVenue::new(10_000.0));
        let window = flat_window(10);

        // Flat: no entry on a missed bar
        assert!(orch.check_missed_bar(&window[9]).await.is_none());
        assert_eq!(orch.oracle_calls(), 0);

        orch.run_cycle(&window).await;
        let report = orch.check_missed_bar(&candle(10, 96.0, 100.0, 94.0)).await.unwrap();
        let CycleAction::Exited(position) = report.action else {
            panic!("expected an exit, got {:?}", report.action);
        };
        assert_eq!(position.exit_price, Some(95.0));
        assert_eq!(orch.oracle_calls(), 1);
    }
}
