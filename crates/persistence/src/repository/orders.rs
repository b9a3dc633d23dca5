//! Order and signal repositories
//!
//! The order status machine is enforced twice: `OrderStatus::can_transition`
//! rejects illegal edges before any SQL runs, and the UPDATE itself is
//! guarded on the expected source status, so a concurrent sync cannot
//! silently overwrite a terminal state.

use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;

/// Side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("unknown order side: {other}")),
        }
    }
}

/// Order lifecycle status.
/// `pending → ordered → filled`, with `cancelled` reachable from pending
/// and `rejected` reachable from ordered. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ordered,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Ordered => "ordered",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Ordered) | (Pending, Cancelled) | (Ordered, Filled) | (Ordered, Rejected)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "ordered" => Ok(OrderStatus::Ordered),
            "filled" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// An order row (created pending, advanced by account sync)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    pub id: Option<i64>,
    pub strategy_id: i64,
    pub stock_code: String,
    pub side: String,
    pub quantity: i64,
    pub price: Option<String>,
    pub status: String,
    pub order_ref: Option<String>,
    pub broker_order_no: Option<String>,
    pub filled_price: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

const ORDER_COLUMNS: &str = "id, strategy_id, stock_code, side, quantity, price, status, \
                             order_ref, broker_order_no, filled_price, created_at, updated_at";

/// A signal row recording the evaluation that produced an order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub order_id: Option<i64>,
    pub stock_code: String,
    pub side: String,
    pub trade_date: String,
    pub rule: Option<String>,
    pub created_at: Option<i64>,
}

/// Repository for orders
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new pending order, returning its id
    pub async fn insert(&self, record: &OrderRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (strategy_id, stock_code, side, quantity, price, status, order_ref)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.strategy_id)
        .bind(&record.stock_code)
        .bind(&record.side)
        .bind(record.quantity)
        .bind(&record.price)
        .bind(&record.status)
        .bind(&record.order_ref)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        let record = sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// List orders in a given status, oldest first
    pub async fn list_by_status(&self, status: OrderStatus) -> DbResult<Vec<OrderRecord>> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE status = ? ORDER BY created_at ASC");
        let records = sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(status.as_str())
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    /// The newest still-open (pending or ordered) order for a strategy/stock,
    /// if one exists
    pub async fn find_open(
        &self,
        strategy_id: i64,
        stock_code: &str,
    ) -> DbResult<Option<OrderRecord>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE strategy_id = ? AND stock_code = ? AND status IN ('pending', 'ordered') \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let record = sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(strategy_id)
            .bind(stock_code)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// Transition an order from `from` to `to`.
    /// Errors with `DbError::Conflict` when the edge is illegal or the row
    /// is not in `from` anymore.
    pub async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus) -> DbResult<()> {
        if !from.can_transition(to) {
            return Err(DbError::Conflict(format!(
                "illegal order transition {from} -> {to}"
            )));
        }

        let result = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = strftime('%s', 'now') WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "order {id} is not in status '{from}'"
            )));
        }
        Ok(())
    }

    /// Record broker submission: pending → ordered with the broker order number
    pub async fn mark_ordered(&self, id: i64, broker_order_no: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'ordered', broker_order_no = ?, updated_at = strftime('%s', 'now')
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(broker_order_no)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("order {id} is not pending")));
        }
        Ok(())
    }

    /// Record a fill: ordered → filled with the execution price
    pub async fn mark_filled(&self, id: i64, filled_price: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'filled', filled_price = ?,
                filled_at = strftime('%s', 'now'), updated_at = strftime('%s', 'now')
            WHERE id = ? AND status = 'ordered'
            "#,
        )
        .bind(filled_price)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("order {id} is not ordered")));
        }
        Ok(())
    }
}

/// Repository for signals
pub struct SignalRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SignalRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &SignalRecord) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO signals (order_id, stock_code, side, trade_date, rule) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.order_id)
        .bind(&record.stock_code)
        .bind(&record.side)
        .bind(&record.trade_date)
        .bind(&record.rule)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Recent signals, newest first, optionally filtered by order status
    pub async fn list_recent(
        &self,
        limit: i64,
        order_status: Option<OrderStatus>,
    ) -> DbResult<Vec<SignalRecord>> {
        let records = if let Some(status) = order_status {
            sqlx::query_as::<_, SignalRecord>(
                r#"
                SELECT s.id, s.order_id, s.stock_code, s.side, s.trade_date, s.rule, s.created_at
                FROM signals s
                JOIN orders o ON o.id = s.order_id
                WHERE o.status = ?
                ORDER BY s.created_at DESC, s.id DESC
                LIMIT ?
                "#,
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query_as::<_, SignalRecord>(
                r#"
                SELECT id, order_id, stock_code, side, trade_date, rule, created_at
                FROM signals
                ORDER BY created_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool)
            .await?
        };

        Ok(records)
    }
}
