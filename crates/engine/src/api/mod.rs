//! External service clients

pub mod broker;
pub mod notify;

pub use broker::BrokerClient;
pub use notify::{Notification, Notifier};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{AccountBalance, BrokerOrderStatus, PriceBar, Quote};

/// Broker REST operations the engine depends on.
/// Abstracted behind a trait so account sync can be tested without a broker.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Current quote for a stock
    async fn get_price(&self, stock_code: &str) -> Result<Quote>;

    /// Daily bars for a date range (inclusive)
    async fn get_daily_bars(
        &self,
        stock_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>>;

    /// Cash and held positions
    async fn get_balance(&self) -> Result<AccountBalance>;

    /// Broker-side status of a submitted order
    async fn get_order_status(&self, order_no: &str) -> Result<BrokerOrderStatus>;
}
