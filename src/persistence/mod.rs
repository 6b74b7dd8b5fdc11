use crate::db::PostgresJournal;
use crate::execution::Position;
use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// JSON-lines file of closed positions
    pub path: Option<PathBuf>,
    /// Postgres URL; takes precedence over `path`
    pub database_url: Option<String>,
}

/// Append-only JSON-lines file of closed positions
///
/// One position per line, oldest first. Unreadable lines are skipped on load.
#[derive(Debug, Clone)]
pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, position: &Position) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(position)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("Journaled position {} to {}", position.id, self.path.display());

        Ok(())
    }

    /// Load the last `limit` positions (oldest first); a missing file is empty
    pub async fn recent(&self, limit: usize) -> Result<Vec<Position>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut positions = Vec::new();
        for (number, line) in content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str::<Position>(line) {
                Ok(position) => positions.push(position),
                Err(e) => tracing::warn!("Skipping journal line {} in {}: {}", number + 1, self.path.display(), e),
            }
        }

        let skip = positions.len().saturating_sub(limit);
        Ok(positions.into_iter().skip(skip).collect())
    }

    /// Sum of realized P&L over every journaled position
    pub async fn total_pnl(&self) -> Result<f64> {
        let positions = self.recent(usize::MAX).await?;
        Ok(positions.iter().filter_map(|p| p.realized_pnl).sum())
    }
}

/// Where closed positions are recorded across restarts
pub enum Journal {
    File(TradeJournal),
    Postgres(PostgresJournal),
}

impl Journal {
    /// Open the configured journal, None when neither backend is set
    pub async fn from_settings(settings: &JournalSettings, symbol: &str) -> Result<Option<Self>> {
        if let Some(url) = &settings.database_url {
            return Ok(Some(Journal::Postgres(PostgresJournal::new(url, symbol).await?)));
        }
        Ok(settings.path.as_ref().map(|p| Journal::File(TradeJournal::new(p))))
    }

    pub async fn append(&self, position: &Position) -> Result<()> {
        match self {
            Journal::File(journal) => journal.append(position).await,
            Journal::Postgres(journal) => journal.save_position(position).await,
        }
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Position>> {
        match self {
            Journal::File(journal) => journal.recent(limit).await,
            Journal::Postgres(journal) => journal.recent_closed(limit as i64).await,
        }
    }

    pub async fn total_pnl(&self) -> Result<f64> {
        match self {
            Journal::File(journal) => journal.total_pnl().await,
            Journal::Postgres(journal) => journal.total_pnl().await,
        }
    }
}

/// Write positions as a pretty JSON array
pub async fn export_positions(path: &Path, positions: &[Position]) -> Result<()> {
    let json = serde_json::to_string_pretty(positions)?;
    tokio::fs::write(path, json).await?;
    tracing::info!("Wrote {} positions to {}", positions.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExitReason, PositionStatus};
    use crate::models::Direction;
    use uuid::Uuid;

    fn closed_position(entry_time: i64, pnl: f64) -> Position {
        Position {
            id: Uuid::new_v4(),
            signal: Direction::Long,
            entry_time,
            entry_price: 30_000.0,
            size: 0.01,
            stop_loss_price: 29_000.0,
            take_profit_price: 32_000.0,
            reason: "test".to_string(),
            status: PositionStatus::Closed,
            exit_time: Some(entry_time + 3600),
            exit_price: Some(30_000.0 + pnl * 100.0),
            realized_pnl: Some(pnl),
            exit_reason: Some(ExitReason::TakeProfit),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("perpbot-{}-{}.jsonl", name, Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_append_and_load_recent() {
        let path = temp_path("journal");
        let journal = TradeJournal::new(&path);

        for i in 0..5 {
            journal.append(&closed_position(i * 7200, i as f64)).await.unwrap();
        }

        let recent = journal.recent(3).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].entry_time, 2 * 7200);
        assert_eq!(recent[2].realized_pnl, Some(4.0));
        assert_eq!(recent[2].exit_reason, Some(ExitReason::TakeProfit));
    }

    #[tokio::test]
    async fn test_total_pnl_covers_whole_journal() {
        let path = temp_path("total");
        let journal = Journal::File(TradeJournal::new(&path));
        assert_eq!(journal.total_pnl().await.unwrap(), 0.0);

        for pnl in [12.5, -4.0, 1.5] {
            journal.append(&closed_position(0, pnl)).await.unwrap();
        }

        let total = journal.total_pnl().await.unwrap();
        tokio::fs::remove_file(&path).await.ok();
        assert_eq!(total, 10.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let journal = TradeJournal::new(temp_path("missing"));
        assert!(journal.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_lines_skipped() {
        let path = temp_path("corrupt");
        let journal = TradeJournal::new(&path);
        journal.append(&closed_position(0, 1.0)).await.unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"{not json}\n")
            .await
            .unwrap();
        journal.append(&closed_position(7200, 2.0)).await.unwrap();

        let recent = journal.recent(10).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_file_journal_selected_without_database() {
        let settings = JournalSettings {
            path: Some(temp_path("settings")),
            database_url: None,
        };
        let journal = Journal::from_settings(&settings, "PF_XBTUSD").await.unwrap();
        assert!(matches!(journal, Some(Journal::File(_))));

        let none = Journal::from_settings(&JournalSettings::default(), "PF_XBTUSD").await.unwrap();
        assert!(none.is_none());
    }
}
