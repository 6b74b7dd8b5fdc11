use crate::execution::{ExitReason, Position, PositionStatus};
use crate::models::{unix_to_utc, Direction};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use uuid::Uuid;

/// Postgres journal of closed positions
pub struct PostgresJournal {
    pool: PgPool,
    symbol: String,
}

impl PostgresJournal {
    /// Connect to Postgres
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    /// * `symbol` - Instrument the positions belong to
    pub async fn new(database_url: &str, symbol: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres journal");

        Ok(Self {
            pool,
            symbol: symbol.to_string(),
        })
    }

    /// Save position to Postgres
    pub async fn save_position(&self, position: &Position) -> Result<()> {
        let status_str = match position.status {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        };

        sqlx::query(
            r#"
            INSERT INTO positions (
                id, symbol, signal, entry_time, entry_price, size,
                stop_loss_price, take_profit_price, reason, status,
                exit_time, exit_price, realized_pnl, exit_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                exit_time = EXCLUDED.exit_time,
                exit_price = EXCLUDED.exit_price,
                realized_pnl = EXCLUDED.realized_pnl,
                exit_reason = EXCLUDED.exit_reason,
                updated_at = NOW()
            "#,
        )
        .bind(position.id)
        .bind(&self.symbol)
        .bind(position.signal.to_string())
        .bind(unix_to_utc(position.entry_time))
        .bind(position.entry_price)
        .bind(position.size)
        .bind(position.stop_loss_price)
        .bind(position.take_profit_price)
        .bind(&position.reason)
        .bind(status_str)
        .bind(position.exit_time.map(unix_to_utc))
        .bind(position.exit_price)
        .bind(position.realized_pnl)
        .bind(position.exit_reason.map(|r| r.to_string()))
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved position {} for {} to Postgres", position.id, self.symbol);

        Ok(())
    }

    /// Last `limit` closed positions, oldest first
    pub async fn recent_closed(&self, limit: i64) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, signal, entry_time, entry_price, size,
                       stop_loss_price, take_profit_price, reason, status,
                       exit_time, exit_price, realized_pnl, exit_reason
                FROM positions
                WHERE symbol = $1 AND status = 'CLOSED'
                ORDER BY exit_time DESC
                LIMIT $2
            ) recent
            ORDER BY exit_time ASC
            "#,
        )
        .bind(&self.symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let positions = rows.iter().map(position_from_row).collect::<Result<Vec<_>>>()?;

        tracing::info!("Loaded {} closed positions for {} from Postgres", positions.len(), self.symbol);

        Ok(positions)
    }

    /// Get total realized P&L for the instrument
    pub async fn total_pnl(&self) -> Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) AS total
            FROM positions
            WHERE symbol = $1 AND status = 'CLOSED'
            "#,
        )
        .bind(&self.symbol)
        .fetch_one(&self.pool)
        .await?;

        let total: rust_decimal::Decimal = row.get("total");
        Ok(total.to_string().parse()?)
    }

    /// Delete every position for the instrument
    #[cfg(test)]
    pub async fn clear_all_positions(&self) -> Result<()> {
        sqlx::query("DELETE FROM positions WHERE symbol = $1")
            .bind(&self.symbol)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn position_from_row(row: &PgRow) -> Result<Position> {
    let signal_str: String = row.get("signal");
    let entry_price: rust_decimal::Decimal = row.get("entry_price");
    let size: rust_decimal::Decimal = row.get("size");
    let stop_loss_price: rust_decimal::Decimal = row.get("stop_loss_price");
    let take_profit_price: rust_decimal::Decimal = row.get("take_profit_price");
    let entry_time: DateTime<Utc> = row.get("entry_time");
    let status_str: String = row.get("status");
    let exit_time: Option<DateTime<Utc>> = row.get("exit_time");
    let exit_price: Option<rust_decimal::Decimal> = row.get("exit_price");
    let realized_pnl: Option<rust_decimal::Decimal> = row.get("realized_pnl");
    let exit_reason_str: Option<String> = row.get("exit_reason");

    let signal = match signal_str.as_str() {
        "LONG" => Direction::Long,
        "SHORT" => Direction::Short,
        _ => return Err(format!("Invalid position signal {}", signal_str).into()),
    };

    let status = match status_str.as_str() {
        "OPEN" => PositionStatus::Open,
        "CLOSED" => PositionStatus::Closed,
        _ => return Err("Invalid position status".into()),
    };

    let exit_reason = match exit_reason_str.as_deref() {
        Some("Stop-Loss") => Some(ExitReason::StopLoss),
        Some("Take-Profit") => Some(ExitReason::TakeProfit),
        None => None,
        _ => return Err("Invalid exit reason".into()),
    };

    Ok(Position {
        id: row.get::<Uuid, _>("id"),
        signal,
        entry_time: entry_time.timestamp(),
        entry_price: entry_price.to_string().parse()?,
        size: size.to_string().parse()?,
        stop_loss_price: stop_loss_price.to_string().parse()?,
        take_profit_price: take_profit_price.to_string().parse()?,
        reason: row.get("reason"),
        status,
        exit_time: exit_time.map(|t| t.timestamp()),
        exit_price: exit_price.map(|v| v.to_string().parse()).transpose()?,
        realized_pnl: realized_pnl.map(|v| v.to_string().parse()).transpose()?,
        exit_reason,
    })
}
