//! Core domain types shared across the engine

use chrono::NaiveDate;
use persistence::repository::PriceBarRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single daily price bar (OHLCV plus day-over-day change rate)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub stock_code: String,
    pub trade_date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub change_rate: Decimal,
}

impl PriceBar {
    /// Convert a stored row into a domain bar.
    /// Returns None when any numeric column fails to parse.
    pub fn from_record(record: &PriceBarRecord) -> Option<Self> {
        Some(Self {
            stock_code: record.stock_code.clone(),
            trade_date: record.trade_date.parse().ok()?,
            open: Decimal::from_str(&record.open).ok()?,
            high: Decimal::from_str(&record.high).ok()?,
            low: Decimal::from_str(&record.low).ok()?,
            close: Decimal::from_str(&record.close).ok()?,
            volume: record.volume,
            change_rate: Decimal::from_str(&record.change_rate).ok()?,
        })
    }

    pub fn to_record(&self) -> PriceBarRecord {
        PriceBarRecord {
            stock_code: self.stock_code.clone(),
            trade_date: self.trade_date.to_string(),
            open: self.open.to_string(),
            high: self.high.to_string(),
            low: self.low.to_string(),
            close: self.close.to_string(),
            volume: self.volume,
            change_rate: self.change_rate.to_string(),
        }
    }
}

// The order status machine lives with the rows it guards
pub use persistence::repository::{OrderStatus, Side};

/// A current-price quote from the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub stock_code: String,
    pub price: Decimal,
    pub change_rate: Decimal,
    pub volume: i64,
}

/// A held position reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub stock_code: String,
    pub quantity: i64,
    pub avg_price: Decimal,
}

/// Account balance snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub cash: Decimal,
    pub positions: Vec<Position>,
}

/// Broker-side view of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderStatus {
    pub order_no: String,
    /// "open", "filled" or "rejected"
    pub status: String,
    pub filled_price: Option<Decimal>,
}

/// A single round-trip trade executed during a backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: i64,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

/// A point on the equity curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: Decimal,
}

/// Result of a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub stock_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    pub net_pnl: Decimal,
    pub net_pnl_pct: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: Decimal,
    pub profit_factor: Decimal,
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_record_round_trip() {
        let bar = PriceBar {
            stock_code: "005930".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            open: Decimal::from(72000),
            high: Decimal::from(72800),
            low: Decimal::from(71900),
            close: Decimal::from(72500),
            volume: 123456,
            change_rate: Decimal::from_str("0.69").unwrap(),
        };

        let restored = PriceBar::from_record(&bar.to_record()).unwrap();
        assert_eq!(restored.trade_date, bar.trade_date);
        assert_eq!(restored.close, bar.close);
        assert_eq!(restored.change_rate, bar.change_rate);
    }

    #[test]
    fn bad_record_is_rejected() {
        let mut record = PriceBar {
            stock_code: "005930".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: 0,
            change_rate: Decimal::ZERO,
        }
        .to_record();
        record.close = "not-a-number".to_string();
        assert!(PriceBar::from_record(&record).is_none());
    }
}
