use perpbot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use perpbot::data::CandleStore;
use perpbot::engine::{CycleAction, CycleOrchestrator, CycleSettings};
use perpbot::execution::{ExecutionVenue, SimulatedVenue};
use perpbot::oracle::{BackoffPolicy, DecisionOracleClient, HttpDecisionModel, ScriptedModel};
use perpbot::reconcile::FillReconciler;
use perpbot::risk::{RiskSettings, RiskSizer};
use perpbot::strategy::{BreakoutFilter, FilterSettings};
use perpbot::*;
use std::time::Duration;

const LONG: &str = r#"Looks strong. {"signal":"LONG","confidence":75,"stop_loss_distance_in_usd":600,"take_profit_distance_in_usd":900,"reason":"range breakout with expanding ATR"}"#;

fn breakout_store() -> CandleStore {
    let mut gen = SyntheticDataGenerator::new(11);
    CandleStore::new(gen.generate(MarketScenario::RangeBreakout, 300)).unwrap()
}

fn settings(max_oracle_calls: u32) -> CycleSettings {
    CycleSettings {
        symbol: "PF_XBTUSD".to_string(),
        window_size: 250,
        min_confidence: 50,
        max_oracle_calls,
        recent_trades: 10,
    }
}

async fn scripted_backtest(store: &CandleStore) -> (BacktestMetrics, CycleOrchestrator<BreakoutFilter, ScriptedModel, SimulatedVenue>) {
    let oracle = DecisionOracleClient::new(
        ScriptedModel::always(LONG),
        "PF_XBTUSD",
        4,
        BackoffPolicy::Constant(Duration::from_millis(1)),
    );
    let mut orchestrator = CycleOrchestrator::new(
        BreakoutFilter::new(FilterSettings::default()),
        oracle,
        RiskSizer::new(RiskSettings::default()),
        SimulatedVenue::new(10_000.0),
        settings(20),
    );

    let metrics = BacktestRunner::new(201).run(store, &mut orchestrator).await.unwrap();
    (metrics, orchestrator)
}

#[tokio::test]
async fn test_breakout_backtest_end_to_end() {
    let _ = tracing_subscriber::fmt::try_init();

    let store = breakout_store();
    let (metrics, orchestrator) = scripted_backtest(&store).await;

    // Quiet range never justifies a call; the rally does
    assert!(metrics.oracle_calls >= 1);
    assert_eq!(orchestrator.oracle().model().calls() as u32, metrics.oracle_calls);

    let rally_start = store.candles()[240].timestamp;
    let ledger = orchestrator.venue().ledger();
    assert!(ledger.closed_positions().iter().all(|p| p.entry_time >= rally_start));
    assert!(ledger.open_position().map_or(true, |p| p.entry_time >= rally_start));

    // Balance only moves by realized P&L
    assert!((metrics.final_balance - 10_000.0 - metrics.total_pnl).abs() < 1e-6);

    // The venue's fills reconcile to exactly the ledger's round trips
    let fills = orchestrator.venue().fills().await.unwrap();
    let reconciled = FillReconciler::reconcile(&fills);
    let ledger_trades = ledger.closed_trades();
    assert_eq!(reconciled.trades.len(), ledger_trades.len());
    for (a, b) in reconciled.trades.iter().zip(&ledger_trades) {
        assert_eq!(a.entry_time, b.entry_time);
        assert!((a.pnl - b.pnl).abs() < 1e-6);
    }
    assert_eq!(reconciled.open_legs.is_empty(), !ledger.has_open_position());
}

#[tokio::test]
async fn test_identical_runs_produce_identical_reports() {
    let store = breakout_store();

    let (first, _) = scripted_backtest(&store).await;
    let (second, _) = scripted_backtest(&store).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_http_oracle_drives_a_cycle() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": LONG } }]
    });
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(1)
        .create_async()
        .await;

    let model = HttpDecisionModel::new(
        server.url(),
        "test-key".to_string(),
        "gpt-4o-mini",
        512,
        Duration::from_secs(5),
    )
    .unwrap();
    let oracle = DecisionOracleClient::new(model, "PF_XBTUSD", 1, BackoffPolicy::Constant(Duration::from_millis(1)));
    let mut orchestrator = CycleOrchestrator::new(
        perpbot::strategy::AlwaysCandidate,
        oracle,
        RiskSizer::new(RiskSettings::default()),
        SimulatedVenue::new(10_000.0),
        settings(5),
    );

    let window: Vec<Candle> = (0..30)
        .map(|i| Candle {
            timestamp: 1_700_000_000 + i * 3600,
            open: 30_000.0,
            high: 30_100.0,
            low: 29_900.0,
            close: 30_000.0,
            volume: 10.0,
        })
        .collect();

    let report = orchestrator.run_cycle(&window).await;
    mock.assert_async().await;

    let CycleAction::Opened { direction, params, .. } = report.action else {
        panic!("expected an open, got {:?}", report.action);
    };
    assert_eq!(direction, Direction::Long);
    // 2% of 10k risked over a $600 stop
    assert_eq!(params.size, 0.3333);
    assert_eq!(params.stop_loss_price, 29_400.0);
    assert_eq!(params.take_profit_price, 30_900.0);
}
