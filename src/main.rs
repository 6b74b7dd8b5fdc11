use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use perpbot::backtest::BacktestRunner;
use perpbot::config::{oracle_api_key, RunMode, Settings};
use perpbot::data::{CandleStore, KrakenOhlcFeed};
use perpbot::engine::{CycleOrchestrator, CycleSettings, LiveRunner};
use perpbot::execution::{ExecutionVenue, SimulatedVenue};
use perpbot::oracle::{DecisionModel, DecisionOracleClient, HttpDecisionModel};
use perpbot::persistence::{export_positions, Journal};
use perpbot::reconcile::{parse_fills, FillReconciler};
use perpbot::risk::RiskSizer;
use perpbot::strategy::{AlwaysCandidate, BreakoutFilter, SignalFilter};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "perpbot",
    version,
    about = "Breakout-gated, oracle-driven trader for a single perpetual future"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over a candle file, or trade live on the paper venue
    Run(RunArgs),
    /// Match exchange fills into round-trip trades
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    /// Candle CSV for backtests
    #[arg(long)]
    data_path: Option<PathBuf>,

    #[arg(long)]
    initial_balance: Option<f64>,

    /// Skip recommendations below this confidence (0-100)
    #[arg(long)]
    min_confidence: Option<u8>,

    /// Index of the first backtest bar
    #[arg(long)]
    warmup: Option<usize>,

    /// Candles per decision window
    #[arg(long)]
    window: Option<usize>,

    #[arg(long)]
    max_oracle_calls: Option<u32>,

    /// Consult the oracle on every flat bar instead of breakouts only
    #[arg(long, default_value_t = false)]
    always_candidate: bool,
}

impl RunArgs {
    /// CLI flags take precedence over file and environment
    fn apply(&self, settings: &mut Settings) {
        let run = &mut settings.run;
        if let Some(mode) = self.mode {
            run.mode = mode;
        }
        if let Some(path) = &self.data_path {
            run.data_path = path.clone();
        }
        if let Some(balance) = self.initial_balance {
            run.initial_balance = balance;
        }
        if let Some(confidence) = self.min_confidence {
            run.min_confidence = confidence;
        }
        if let Some(warmup) = self.warmup {
            run.warmup = warmup;
        }
        if let Some(window) = self.window {
            run.window_size = window;
        }
        if let Some(calls) = self.max_oracle_calls {
            run.max_oracle_calls = calls;
        }
        if self.always_candidate {
            run.always_candidate = true;
        }
    }
}

#[derive(Args)]
struct ReconcileArgs {
    /// JSON fills: the exchange `fills` payload or a bare array
    #[arg(long)]
    fills: PathBuf,

    /// Round trips to print, newest last
    #[arg(long, default_value_t = 10)]
    recent: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Reconcile(args) => reconcile(args).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("perpbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: RunArgs) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut settings);
    settings.validate()?;

    let api_key = oracle_api_key().context("ORACLE_API_KEY (or OPENAI_API_KEY) must be set")?;
    let oracle_settings = &settings.oracle;
    let model = HttpDecisionModel::new(
        &oracle_settings.base_url,
        api_key,
        &oracle_settings.model,
        oracle_settings.max_tokens,
        Duration::from_secs(oracle_settings.timeout_secs),
    )?;
    let oracle = DecisionOracleClient::from_settings(model, &settings.run.symbol, oracle_settings)
        .with_min_interval(Duration::from_secs(settings.run.min_seconds_between_calls));

    let filter: Box<dyn SignalFilter> = if settings.run.always_candidate {
        Box::new(AlwaysCandidate)
    } else {
        Box::new(BreakoutFilter::new(settings.filter.clone()))
    };

    // Simulated exits stay out of the journal that seeds live runs
    let journal = match settings.run.mode {
        RunMode::Live => Journal::from_settings(&settings.journal, &settings.run.symbol)
            .await
            .map_err(|e| anyhow!(e))
            .context("opening trade journal")?,
        RunMode::Backtest => None,
    };

    let mut history = Vec::new();
    if let Some(journal) = &journal {
        match journal.total_pnl().await {
            Ok(total) => tracing::info!("Journal realized P&L to date: ${:.2}", total),
            Err(e) => tracing::warn!("Could not total trade journal: {}", e),
        }
        match journal.recent(settings.run.recent_trades).await {
            Ok(positions) => {
                history = positions.iter().filter_map(|p| p.to_closed_trade()).collect();
                tracing::info!("Seeded {} closed trades from the journal", history.len());
            }
            Err(e) => tracing::warn!("Could not read trade journal: {}", e),
        }
    }

    let cycle_settings = CycleSettings {
        symbol: settings.run.symbol.clone(),
        window_size: settings.run.window_size,
        min_confidence: settings.run.min_confidence,
        max_oracle_calls: settings.run.max_oracle_calls,
        recent_trades: settings.run.recent_trades,
    };

    let mut orchestrator = CycleOrchestrator::new(
        filter,
        oracle,
        RiskSizer::new(settings.risk.clone()),
        SimulatedVenue::new(settings.run.initial_balance),
        cycle_settings,
    )
    .with_history(history);
    if let Some(journal) = journal {
        orchestrator = orchestrator.with_journal(journal);
    }

    tracing::info!(
        "🚀 perpbot starting in {:?} mode for {}",
        settings.run.mode,
        settings.run.symbol
    );

    match settings.run.mode {
        RunMode::Backtest => run_backtest(&settings, orchestrator).await,
        RunMode::Live => run_live(&settings, orchestrator).await,
    }
}

async fn run_backtest<F: SignalFilter, M: DecisionModel>(
    settings: &Settings,
    mut orchestrator: CycleOrchestrator<F, M, SimulatedVenue>,
) -> Result<()> {
    let run = &settings.run;
    let store = CandleStore::from_csv(&run.data_path)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("loading candles from {}", run.data_path.display()))?
        .filter_by_date(run.start_date, run.end_date);

    let metrics = BacktestRunner::new(run.warmup).run(&store, &mut orchestrator).await?;
    metrics.print_report();

    if let Some(open) = orchestrator.venue().ledger().open_position() {
        println!(
            "Open {} position: {} @ {} (SL {}, TP {})",
            open.signal, open.size, open.entry_price, open.stop_loss_price, open.take_profit_price
        );
    }

    export_trades(settings, &orchestrator).await;
    Ok(())
}

async fn run_live<F: SignalFilter, M: DecisionModel>(
    settings: &Settings,
    orchestrator: CycleOrchestrator<F, M, SimulatedVenue>,
) -> Result<()> {
    let feed = KrakenOhlcFeed::from_settings(&settings.feed)?;
    let mut live = LiveRunner::new(
        feed,
        orchestrator,
        Duration::from_secs(settings.run.cycle_interval_secs),
    );

    live.run().await.map_err(|e| anyhow!(e))?;

    let balance = live.orchestrator().venue().balance().await?;
    tracing::info!("Paper balance at shutdown: ${:.2}", balance);

    export_trades(settings, live.orchestrator()).await;
    Ok(())
}

async fn export_trades<F: SignalFilter, M: DecisionModel>(
    settings: &Settings,
    orchestrator: &CycleOrchestrator<F, M, SimulatedVenue>,
) {
    let Some(path) = &settings.run.trades_out else {
        return;
    };

    let positions = orchestrator.venue().ledger().closed_positions();
    if let Err(e) = export_positions(path, positions).await {
        tracing::warn!("Failed to write trades to {}: {}", path.display(), e);
    }
}

async fn reconcile(args: ReconcileArgs) -> Result<()> {
    let json = tokio::fs::read_to_string(&args.fills)
        .await
        .with_context(|| format!("reading {}", args.fills.display()))?;
    let fills = parse_fills(&json).with_context(|| format!("parsing fills in {}", args.fills.display()))?;

    let result = FillReconciler::reconcile(&fills);

    println!("\n📒 RECONCILED ROUND TRIPS ({} of {})", result.recent(args.recent).len(), result.trades.len());
    for trade in result.recent(args.recent) {
        println!(
            "  {:<5} {:>10.4} @ {:>10.2} -> {:>10.2}  P&L {:>+10.2}  ({} -> {})",
            trade.side.to_string(),
            trade.size,
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            perpbot::unix_to_utc(trade.entry_time).to_rfc3339(),
            perpbot::unix_to_utc(trade.exit_time).to_rfc3339()
        );
    }

    println!("\n  Realized P&L:          ${:.2}", result.realized_pnl());
    match result.residual_side() {
        Some(side) => println!("  Residual Position:     {} {:.4}", side, result.residual_size()),
        None => println!("  Residual Position:     flat"),
    }

    Ok(())
}
