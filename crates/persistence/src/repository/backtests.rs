//! Backtest run repository — cache of completed backtests keyed by params hash

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A cached backtest result
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BacktestRunRecord {
    pub id: Option<i64>,
    pub params_hash: String,
    pub strategy_id: i64,
    pub strategy_name: String,
    pub stock_code: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: String,
    pub final_equity: String,
    pub net_pnl: String,
    pub net_pnl_pct: String,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: String,
    pub max_drawdown: String,
    pub max_drawdown_pct: String,
    pub sharpe_ratio: String,
    pub profit_factor: String,
}

const RUN_COLUMNS: &str = "id, params_hash, strategy_id, strategy_name, stock_code, \
                           start_date, end_date, initial_capital, final_equity, \
                           net_pnl, net_pnl_pct, total_trades, winning_trades, losing_trades, \
                           win_rate, max_drawdown, max_drawdown_pct, sharpe_ratio, profit_factor";

/// Repository for cached backtest runs
pub struct BacktestRunRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BacktestRunRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a run (INSERT OR IGNORE — skips if params_hash already exists)
    pub async fn save(&self, record: &BacktestRunRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO backtest_runs (
                params_hash, strategy_id, strategy_name, stock_code,
                start_date, end_date, initial_capital, final_equity,
                net_pnl, net_pnl_pct, total_trades, winning_trades, losing_trades,
                win_rate, max_drawdown, max_drawdown_pct, sharpe_ratio, profit_factor
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.params_hash)
        .bind(record.strategy_id)
        .bind(&record.strategy_name)
        .bind(&record.stock_code)
        .bind(&record.start_date)
        .bind(&record.end_date)
        .bind(&record.initial_capital)
        .bind(&record.final_equity)
        .bind(&record.net_pnl)
        .bind(&record.net_pnl_pct)
        .bind(record.total_trades)
        .bind(record.winning_trades)
        .bind(record.losing_trades)
        .bind(&record.win_rate)
        .bind(&record.max_drawdown)
        .bind(&record.max_drawdown_pct)
        .bind(&record.sharpe_ratio)
        .bind(&record.profit_factor)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_hash(&self, hash: &str) -> DbResult<Option<BacktestRunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM backtest_runs WHERE params_hash = ?");
        let record = sqlx::query_as::<_, BacktestRunRecord>(&sql)
            .bind(hash)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// Paginated history, newest first, optional strategy filter
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        strategy_name: Option<&str>,
    ) -> DbResult<(Vec<BacktestRunRecord>, i64)> {
        let (total, records) = if let Some(name) = strategy_name {
            let (total,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM backtest_runs WHERE strategy_name = ?")
                    .bind(name)
                    .fetch_one(self.pool)
                    .await?;

            let sql = format!(
                "SELECT {RUN_COLUMNS} FROM backtest_runs WHERE strategy_name = ? \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            );
            let records = sqlx::query_as::<_, BacktestRunRecord>(&sql)
                .bind(name)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool)
                .await?;
            (total, records)
        } else {
            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backtest_runs")
                .fetch_one(self.pool)
                .await?;

            let sql = format!(
                "SELECT {RUN_COLUMNS} FROM backtest_runs \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            );
            let records = sqlx::query_as::<_, BacktestRunRecord>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool)
                .await?;
            (total, records)
        };

        Ok((records, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn run(hash: &str) -> BacktestRunRecord {
        BacktestRunRecord {
            id: None,
            params_hash: hash.to_string(),
            strategy_id: 1,
            strategy_name: "golden-cross".to_string(),
            stock_code: "005930".to_string(),
            start_date: "2023-01-02".to_string(),
            end_date: "2023-12-28".to_string(),
            initial_capital: "1000000".to_string(),
            final_equity: "1100000".to_string(),
            net_pnl: "100000".to_string(),
            net_pnl_pct: "10".to_string(),
            total_trades: 12,
            winning_trades: 7,
            losing_trades: 5,
            win_rate: "58.33".to_string(),
            max_drawdown: "40000".to_string(),
            max_drawdown_pct: "3.8".to_string(),
            sharpe_ratio: "0.92".to_string(),
            profit_factor: "1.61".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_hash_is_ignored() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRunRepository::new(db.pool());

        repo.save(&run("abc")).await.unwrap();
        repo.save(&run("abc")).await.unwrap();

        let (records, total) = repo.list(10, 0, None).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records.len(), 1);
        assert!(repo.get_by_hash("abc").await.unwrap().is_some());
        assert!(repo.get_by_hash("missing").await.unwrap().is_none());
    }
}
