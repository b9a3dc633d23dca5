//! Price bar repository — append-only daily OHLCV rows

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A single daily price bar as stored
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceBarRecord {
    pub stock_code: String,
    pub trade_date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: i64,
    pub change_rate: String,
}

/// Repository for daily price bars
pub struct BarRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BarRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a single bar (re-ingest replaces the existing row for that day)
    pub async fn upsert(&self, bar: &PriceBarRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO price_bars (stock_code, trade_date, open, high, low, close, volume, change_rate)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_code, trade_date) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                change_rate = excluded.change_rate
            "#,
        )
        .bind(&bar.stock_code)
        .bind(&bar.trade_date)
        .bind(&bar.open)
        .bind(&bar.high)
        .bind(&bar.low)
        .bind(&bar.close)
        .bind(bar.volume)
        .bind(&bar.change_rate)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a batch of bars, returning how many were written
    pub async fn upsert_many(&self, bars: &[PriceBarRecord]) -> DbResult<usize> {
        for bar in bars {
            self.upsert(bar).await?;
        }
        Ok(bars.len())
    }

    /// Fetch bars for a stock in [start, end], oldest first
    pub async fn get_range(
        &self,
        stock_code: &str,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<PriceBarRecord>> {
        let records = sqlx::query_as::<_, PriceBarRecord>(
            r#"
            SELECT stock_code, trade_date, open, high, low, close, volume, change_rate
            FROM price_bars
            WHERE stock_code = ? AND trade_date >= ? AND trade_date <= ?
            ORDER BY trade_date ASC
            "#,
        )
        .bind(stock_code)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Most recent trade_date stored for a stock, if any
    pub async fn latest_date(&self, stock_code: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT trade_date FROM price_bars WHERE stock_code = ? ORDER BY trade_date DESC LIMIT 1",
        )
        .bind(stock_code)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(d,)| d))
    }

    /// Number of bars stored for a stock
    pub async fn count(&self, stock_code: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_bars WHERE stock_code = ?")
            .bind(stock_code)
            .fetch_one(self.pool)
            .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn bar(code: &str, date: &str, close: &str) -> PriceBarRecord {
        PriceBarRecord {
            stock_code: code.to_string(),
            trade_date: date.to_string(),
            open: close.to_string(),
            high: close.to_string(),
            low: close.to_string(),
            close: close.to_string(),
            volume: 1000,
            change_rate: "0".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_same_day_row() {
        let db = Database::in_memory().await.unwrap();
        let repo = BarRepository::new(db.pool());

        repo.upsert(&bar("005930", "2024-03-04", "72000")).await.unwrap();
        repo.upsert(&bar("005930", "2024-03-04", "72500")).await.unwrap();

        let rows = repo.get_range("005930", "2024-01-01", "2024-12-31").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, "72500");
    }

    #[tokio::test]
    async fn range_is_ordered_and_bounded() {
        let db = Database::in_memory().await.unwrap();
        let repo = BarRepository::new(db.pool());

        repo.upsert_many(&[
            bar("005930", "2024-03-06", "73000"),
            bar("005930", "2024-03-04", "72000"),
            bar("005930", "2024-03-05", "72500"),
            bar("000660", "2024-03-05", "150000"),
        ])
        .await
        .unwrap();

        let rows = repo.get_range("005930", "2024-03-04", "2024-03-05").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_date, "2024-03-04");
        assert_eq!(rows[1].trade_date, "2024-03-05");

        assert_eq!(repo.latest_date("005930").await.unwrap().as_deref(), Some("2024-03-06"));
        assert_eq!(repo.count("000660").await.unwrap(), 1);
    }
}
