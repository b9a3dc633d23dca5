//! Stockbridge Engine — strategy evaluation, backtesting, and broker access
//!
//! Self-contained crate behind the HTTP server.
//! Provides:
//! - Formula language for indicator and rule text stored in the database
//! - Per-bar strategy evaluation over daily price bars
//! - Bar-by-bar backtesting engine with a hash-keyed result cache
//! - Broker REST client, account sync, and webhook notifications

pub mod account;
pub mod api;
pub mod backtest;
pub mod eval;
pub mod formula;
pub mod indicators;
pub mod strategy;
pub mod types;

// Re-exports for convenience
pub use account::{place_pending_order, sync_account, SyncReport};
pub use api::{BrokerApi, BrokerClient, Notification, Notifier};
pub use backtest::{params_hash, to_run_record, BacktestEngine};
pub use eval::{eval_condition, eval_expr};
pub use formula::{parse_condition, parse_expr, Condition, Expr, ParseError};
pub use strategy::{Signal, Strategy, StrategyError};
pub use types::*;
