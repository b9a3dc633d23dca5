//! Account synchronization against the broker
//!
//! Sync walks every order sitting in `ordered`, asks the broker what became
//! of it, and advances the status machine accordingly. A fill that lands
//! between the read and the update surfaces as a repository conflict and is
//! skipped rather than overwritten.

use anyhow::Result;
use persistence::repository::{
    OrderRecord, OrderRepository, OrderStatus, Side, SignalRecord, SignalRepository,
};
use persistence::{DbError, SqlitePool};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::BrokerApi;
use crate::strategy::{Signal, Strategy};
use crate::types::Position;

/// Outcome of one sync pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub checked: u32,
    pub filled: u32,
    pub rejected: u32,
    pub cash: Decimal,
    pub positions: Vec<Position>,
}

/// Reconcile open orders and refresh the balance snapshot
pub async fn sync_account(broker: &dyn BrokerApi, pool: &SqlitePool) -> Result<SyncReport> {
    let orders = OrderRepository::new(pool);

    let open = orders.list_by_status(OrderStatus::Ordered).await?;
    let mut checked = 0u32;
    let mut filled = 0u32;
    let mut rejected = 0u32;

    for order in &open {
        let Some(order_no) = order.broker_order_no.as_deref() else {
            warn!(order_id = ?order.id, "Ordered row has no broker order number, skipping");
            continue;
        };
        let Some(id) = order.id else { continue };

        checked += 1;
        let status = broker.get_order_status(order_no).await?;

        match status.status.as_str() {
            "filled" => {
                let price = status
                    .filled_price
                    .map(|p| p.to_string())
                    .or_else(|| order.price.clone())
                    .unwrap_or_default();
                match orders.mark_filled(id, &price).await {
                    Ok(()) => filled += 1,
                    Err(DbError::Conflict(msg)) => {
                        warn!(order_id = id, %msg, "Fill already recorded elsewhere")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            "rejected" => {
                match orders
                    .transition(id, OrderStatus::Ordered, OrderStatus::Rejected)
                    .await
                {
                    Ok(()) => rejected += 1,
                    Err(DbError::Conflict(msg)) => {
                        warn!(order_id = id, %msg, "Rejection already recorded elsewhere")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            // Still open at the broker
            _ => {}
        }
    }

    let balance = broker.get_balance().await?;

    info!(
        checked,
        filled,
        rejected,
        cash = %balance.cash,
        positions = balance.positions.len(),
        "Account sync complete"
    );

    Ok(SyncReport {
        checked,
        filled,
        rejected,
        cash: balance.cash,
        positions: balance.positions,
    })
}

/// Create a pending order for a fired signal, plus the signal row that
/// records why. Returns the new order id.
pub async fn place_pending_order(
    pool: &SqlitePool,
    strategy: &Strategy,
    stock_code: &str,
    signal: Signal,
    quantity: i64,
    price: Option<Decimal>,
    trade_date: chrono::NaiveDate,
) -> Result<i64> {
    let side = match signal {
        Signal::Buy => Side::Buy,
        Signal::Sell => Side::Sell,
        Signal::Hold => anyhow::bail!("Cannot place an order for a hold signal"),
    };

    let order_ref = format!("SB{:06}", rand::thread_rng().gen_range(0..1_000_000));

    let order_id = OrderRepository::new(pool)
        .insert(&OrderRecord {
            id: None,
            strategy_id: strategy.id.unwrap_or(0),
            stock_code: stock_code.to_string(),
            side: side.as_str().to_string(),
            quantity,
            price: price.map(|p| p.to_string()),
            status: OrderStatus::Pending.as_str().to_string(),
            order_ref: Some(order_ref),
            broker_order_no: None,
            filled_price: None,
            created_at: None,
            updated_at: None,
        })
        .await?;

    SignalRepository::new(pool)
        .insert(&SignalRecord {
            id: None,
            order_id: Some(order_id),
            stock_code: stock_code.to_string(),
            side: side.as_str().to_string(),
            trade_date: trade_date.to_string(),
            rule: strategy.rule_text(signal),
            created_at: None,
        })
        .await?;

    info!(
        order_id,
        strategy = %strategy.name,
        stock_code,
        side = %side,
        quantity,
        "Placed pending order"
    );
    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BrokerApi;
    use crate::types::{AccountBalance, BrokerOrderStatus, PriceBar, Quote};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use persistence::repository::{StrategyRecord, StrategyRepository};
    use persistence::Database;
    use std::collections::HashMap;

    /// Canned broker responses keyed by order number
    struct FakeBroker {
        statuses: HashMap<String, BrokerOrderStatus>,
    }

    #[async_trait]
    impl BrokerApi for FakeBroker {
        async fn get_price(&self, _stock_code: &str) -> Result<Quote> {
            anyhow::bail!("not used")
        }

        async fn get_daily_bars(
            &self,
            _stock_code: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Vec<PriceBar>> {
            anyhow::bail!("not used")
        }

        async fn get_balance(&self) -> Result<AccountBalance> {
            Ok(AccountBalance {
                cash: Decimal::from(500_000),
                positions: vec![],
            })
        }

        async fn get_order_status(&self, order_no: &str) -> Result<BrokerOrderStatus> {
            self.statuses
                .get(order_no)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown order {order_no}"))
        }
    }

    async fn seed_strategy(pool: &SqlitePool) -> Strategy {
        let id = StrategyRepository::new(pool)
            .upsert(&StrategyRecord {
                id: None,
                name: "test".to_string(),
                active: 1,
                capital: "1000000".to_string(),
                buy_conditions: r#"["ABOVE(close, 0)"]"#.to_string(),
                sell_conditions: "[]".to_string(),
                indicators: "[]".to_string(),
            })
            .await
            .unwrap();
        let record = StrategyRepository::new(pool)
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap();
        Strategy::from_record(&record).unwrap()
    }

    #[tokio::test]
    async fn sync_advances_filled_and_rejected_orders() {
        let db = Database::in_memory().await.unwrap();
        let strategy = seed_strategy(db.pool()).await;
        let orders = OrderRepository::new(db.pool());
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let fill_id = place_pending_order(
            db.pool(),
            &strategy,
            "005930",
            Signal::Buy,
            10,
            Some(Decimal::from(72000)),
            date,
        )
        .await
        .unwrap();
        orders.mark_ordered(fill_id, "B-1").await.unwrap();

        let reject_id = place_pending_order(
            db.pool(),
            &strategy,
            "000660",
            Signal::Buy,
            5,
            Some(Decimal::from(130000)),
            date,
        )
        .await
        .unwrap();
        orders.mark_ordered(reject_id, "B-2").await.unwrap();

        let mut statuses = HashMap::new();
        statuses.insert(
            "B-1".to_string(),
            BrokerOrderStatus {
                order_no: "B-1".to_string(),
                status: "filled".to_string(),
                filled_price: Some(Decimal::from(72100)),
            },
        );
        statuses.insert(
            "B-2".to_string(),
            BrokerOrderStatus {
                order_no: "B-2".to_string(),
                status: "rejected".to_string(),
                filled_price: None,
            },
        );

        let report = sync_account(&FakeBroker { statuses }, db.pool())
            .await
            .unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.filled, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.cash, Decimal::from(500_000));

        let filled = orders.get_by_id(fill_id).await.unwrap().unwrap();
        assert_eq!(filled.status, "filled");
        assert_eq!(filled.filled_price.as_deref(), Some("72100"));

        let rejected = orders.get_by_id(reject_id).await.unwrap().unwrap();
        assert_eq!(rejected.status, "rejected");
    }

    #[tokio::test]
    async fn still_open_orders_stay_ordered() {
        let db = Database::in_memory().await.unwrap();
        let strategy = seed_strategy(db.pool()).await;
        let orders = OrderRepository::new(db.pool());
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let id = place_pending_order(db.pool(), &strategy, "005930", Signal::Buy, 1, None, date)
            .await
            .unwrap();
        orders.mark_ordered(id, "B-9").await.unwrap();

        let mut statuses = HashMap::new();
        statuses.insert(
            "B-9".to_string(),
            BrokerOrderStatus {
                order_no: "B-9".to_string(),
                status: "open".to_string(),
                filled_price: None,
            },
        );

        let report = sync_account(&FakeBroker { statuses }, db.pool())
            .await
            .unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.filled, 0);

        let order = orders.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(order.status, "ordered");
    }

    #[tokio::test]
    async fn hold_signal_places_no_order() {
        let db = Database::in_memory().await.unwrap();
        let strategy = seed_strategy(db.pool()).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let err = place_pending_order(db.pool(), &strategy, "005930", Signal::Hold, 1, None, date)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("hold"));
    }
}
