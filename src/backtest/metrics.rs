use crate::execution::{ExitReason, Position};
use crate::models::{unix_to_utc, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a single trade for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    /// Price move in the position's favour, in percent
    pub pnl_pct: f64,
    pub holding_period_minutes: i64,
    pub exit_reason: Option<ExitReason>,
}

impl TradeRecord {
    pub fn from_position(position: &Position) -> Option<Self> {
        if let (Some(exit_price), Some(exit_time), Some(realized_pnl)) = (
            position.exit_price,
            position.exit_time,
            position.realized_pnl,
        ) {
            let holding_period = (exit_time - position.entry_time) / 60;
            let pnl_pct = ((exit_price - position.entry_price) / position.entry_price)
                * 100.0
                * position.signal.sign();

            Some(Self {
                side: position.signal,
                entry_time: unix_to_utc(position.entry_time),
                exit_time: unix_to_utc(exit_time),
                entry_price: position.entry_price,
                exit_price,
                size: position.size,
                pnl: realized_pnl,
                pnl_pct,
                holding_period_minutes: holding_period,
                exit_reason: position.exit_reason,
            })
        } else {
            None
        }
    }
}

/// Complete backtest performance metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // P&L Metrics
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub initial_balance: f64,
    pub final_balance: f64,

    // Trade Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L Distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Total wins / Total losses

    // Risk Metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // Holding Period
    pub avg_holding_period_minutes: f64,
    pub max_holding_period_minutes: i64,
    pub min_holding_period_minutes: i64,

    // Run
    pub oracle_calls: u32,
    pub open_at_end: bool,

    // Trade Records
    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    /// Calculate metrics from closed positions
    pub fn from_positions(
        positions: &[Position],
        initial_balance: f64,
        final_balance: f64,
        oracle_calls: u32,
        open_at_end: bool,
    ) -> Self {
        let trades: Vec<TradeRecord> = positions.iter().filter_map(TradeRecord::from_position).collect();

        let total_trades = trades.len();

        if total_trades == 0 {
            return Self::empty(initial_balance, final_balance, oracle_calls, open_at_end);
        }

        // P&L calculations
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_return_pct = ((final_balance - initial_balance) / initial_balance) * 100.0;

        // Win/Loss statistics
        let winning_trades: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > 0.0).collect();
        let losing_trades: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl <= 0.0).collect();

        let winning_count = winning_trades.len();
        let losing_count = losing_trades.len();
        let win_rate = (winning_count as f64 / total_trades as f64) * 100.0;

        // Average wins/losses
        let total_wins: f64 = winning_trades.iter().map(|t| t.pnl).sum();
        let total_losses: f64 = losing_trades.iter().map(|t| t.pnl.abs()).sum();

        let avg_win = if winning_count > 0 {
            total_wins / winning_count as f64
        } else {
            0.0
        };

        let avg_loss = if losing_count > 0 {
            total_losses / losing_count as f64
        } else {
            0.0
        };

        // Largest win/loss
        let largest_win = winning_trades.iter().map(|t| t.pnl).fold(0.0, f64::max);
        let largest_loss = losing_trades.iter().map(|t| t.pnl).fold(0.0, f64::min);

        // Profit factor
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(&trades, initial_balance);

        let sharpe_ratio = Self::calculate_sharpe_ratio(&trades);

        // Holding periods
        let holding_periods: Vec<i64> = trades.iter().map(|t| t.holding_period_minutes).collect();
        let avg_holding_period_minutes =
            holding_periods.iter().sum::<i64>() as f64 / holding_periods.len() as f64;
        let max_holding_period_minutes = holding_periods.iter().copied().max().unwrap_or(0);
        let min_holding_period_minutes = holding_periods.iter().copied().min().unwrap_or(0);

        Self {
            total_pnl,
            total_return_pct,
            initial_balance,
            final_balance,
            total_trades,
            winning_trades: winning_count,
            losing_trades: losing_count,
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            avg_holding_period_minutes,
            max_holding_period_minutes,
            min_holding_period_minutes,
            oracle_calls,
            open_at_end,
            trades,
        }
    }

    /// Empty metrics for when no trades occurred
    fn empty(initial_balance: f64, final_balance: f64, oracle_calls: u32, open_at_end: bool) -> Self {
        Self {
            total_pnl: 0.0,
            total_return_pct: 0.0,
            initial_balance,
            final_balance,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            avg_holding_period_minutes: 0.0,
            max_holding_period_minutes: 0,
            min_holding_period_minutes: 0,
            oracle_calls,
            open_at_end,
            trades: vec![],
        }
    }

    /// Largest peak-to-trough fall of the closed-trade equity curve
    fn calculate_drawdown(trades: &[TradeRecord], initial_balance: f64) -> (f64, f64) {
        let mut peak = initial_balance;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;
        let mut equity = initial_balance;

        for trade in trades {
            equity += trade.pnl;

            if equity > peak {
                peak = equity;
            }

            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { (drawdown / peak) * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Sharpe ratio over per-trade percentage returns, risk-free rate 0
    fn calculate_sharpe_ratio(trades: &[TradeRecord]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();

        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;

        let variance = returns
            .iter()
            .map(|r| {
                let diff = r - mean_return;
                diff * diff
            })
            .sum::<f64>()
            / returns.len() as f64;

        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            mean_return / std_dev
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Balance:       ${:.2}", self.initial_balance);
        println!("  Final Balance:         ${:.2}", self.final_balance);
        println!(
            "  Total P&L:             ${:.2} ({:+.2}%)",
            self.total_pnl, self.total_return_pct
        );

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);

            println!("\n⚠️  RISK METRICS");
            println!(
                "  Max Drawdown:          ${:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

            println!("\n⏱️  HOLDING PERIODS");
            println!(
                "  Average:               {:.1} hours",
                self.avg_holding_period_minutes / 60.0
            );
            println!(
                "  Max:                   {:.1} hours",
                self.max_holding_period_minutes as f64 / 60.0
            );
            println!(
                "  Min:                   {:.1} hours",
                self.min_holding_period_minutes as f64 / 60.0
            );
        }

        println!("\n🤖 ORACLE");
        println!("  Calls Used:            {}", self.oracle_calls);
        if self.open_at_end {
            println!("  A position was still open when the run ended");
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}
