//! Strategy and indicator-definition repositories

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A strategy configuration row.
/// Condition and indicator lists are stored as JSON arrays of strings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StrategyRecord {
    pub id: Option<i64>,
    pub name: String,
    pub active: i64,
    pub capital: String,
    pub buy_conditions: String,
    pub sell_conditions: String,
    pub indicators: String,
}

/// A stored indicator definition (formula interpreted at evaluation time)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IndicatorDefRecord {
    pub id: Option<i64>,
    pub name: String,
    pub kind: String,
    pub formula: String,
    pub default_params: String,
}

/// Repository for strategy configuration
pub struct StrategyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StrategyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a strategy, or update an existing one with the same name
    pub async fn upsert(&self, record: &StrategyRecord) -> DbResult<i64> {
        sqlx::query(
            r#"
            INSERT INTO strategies (name, active, capital, buy_conditions, sell_conditions, indicators)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                active = excluded.active,
                capital = excluded.capital,
                buy_conditions = excluded.buy_conditions,
                sell_conditions = excluded.sell_conditions,
                indicators = excluded.indicators,
                updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(&record.name)
        .bind(record.active)
        .bind(&record.capital)
        .bind(&record.buy_conditions)
        .bind(&record.sell_conditions)
        .bind(&record.indicators)
        .execute(self.pool)
        .await?;

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM strategies WHERE name = ?")
            .bind(&record.name)
            .fetch_one(self.pool)
            .await?;

        Ok(id)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<StrategyRecord>> {
        let record = sqlx::query_as::<_, StrategyRecord>(
            r#"
            SELECT id, name, active, capital, buy_conditions, sell_conditions, indicators
            FROM strategies WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<StrategyRecord>> {
        let record = sqlx::query_as::<_, StrategyRecord>(
            r#"
            SELECT id, name, active, capital, buy_conditions, sell_conditions, indicators
            FROM strategies WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// List strategies, optionally only active ones
    pub async fn list(&self, active_only: bool) -> DbResult<Vec<StrategyRecord>> {
        let sql = if active_only {
            r#"
            SELECT id, name, active, capital, buy_conditions, sell_conditions, indicators
            FROM strategies WHERE active = 1 ORDER BY name ASC
            "#
        } else {
            r#"
            SELECT id, name, active, capital, buy_conditions, sell_conditions, indicators
            FROM strategies ORDER BY name ASC
            "#
        };

        let records = sqlx::query_as::<_, StrategyRecord>(sql)
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    pub async fn set_active(&self, id: i64, active: bool) -> DbResult<()> {
        sqlx::query(
            "UPDATE strategies SET active = ?, updated_at = strftime('%s', 'now') WHERE id = ?",
        )
        .bind(active as i64)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

/// Repository for stored indicator definitions
pub struct IndicatorRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> IndicatorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &IndicatorDefRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO indicator_definitions (name, kind, formula, default_params)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                formula = excluded.formula,
                default_params = excluded.default_params
            "#,
        )
        .bind(&record.name)
        .bind(&record.kind)
        .bind(&record.formula)
        .bind(&record.default_params)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<IndicatorDefRecord>> {
        let record = sqlx::query_as::<_, IndicatorDefRecord>(
            "SELECT id, name, kind, formula, default_params FROM indicator_definitions WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list(&self) -> DbResult<Vec<IndicatorDefRecord>> {
        let records = sqlx::query_as::<_, IndicatorDefRecord>(
            "SELECT id, name, kind, formula, default_params FROM indicator_definitions ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn strategy(name: &str, active: i64) -> StrategyRecord {
        StrategyRecord {
            id: None,
            name: name.to_string(),
            active,
            capital: "1000000".to_string(),
            buy_conditions: r#"["CROSS_ABOVE(SMA(5), SMA(20))"]"#.to_string(),
            sell_conditions: r#"["CROSS_BELOW(SMA(5), SMA(20))"]"#.to_string(),
            indicators: r#"["SMA(5)", "SMA(20)"]"#.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_by_name_updates_in_place() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        let first_id = repo.upsert(&strategy("golden-cross", 1)).await.unwrap();

        let mut changed = strategy("golden-cross", 0);
        changed.capital = "2000000".to_string();
        let second_id = repo.upsert(&changed).await.unwrap();

        assert_eq!(first_id, second_id);
        let stored = repo.get_by_id(first_id).await.unwrap().unwrap();
        assert_eq!(stored.capital, "2000000");
        assert_eq!(stored.active, 0);
    }

    #[tokio::test]
    async fn active_filter_excludes_disabled() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        repo.upsert(&strategy("alpha", 1)).await.unwrap();
        repo.upsert(&strategy("beta", 0)).await.unwrap();

        let all = repo.list(false).await.unwrap();
        let active = repo.list(true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "alpha");
    }

    #[tokio::test]
    async fn indicator_definitions_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let repo = IndicatorRepository::new(db.pool());

        repo.upsert(&IndicatorDefRecord {
            id: None,
            name: "disparity_20".to_string(),
            kind: "formula".to_string(),
            formula: "close / SMA(20) * 100".to_string(),
            default_params: r#"{"period": 20}"#.to_string(),
        })
        .await
        .unwrap();

        let stored = repo.get_by_name("disparity_20").await.unwrap().unwrap();
        assert_eq!(stored.formula, "close / SMA(20) * 100");
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
