//! Database schema definitions
//!
//! NOTE: All prices/amounts stored as TEXT to preserve rust_decimal::Decimal
//! precision. Trade dates stored as ISO-8601 TEXT (YYYY-MM-DD) so lexical
//! ordering matches chronological ordering.

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Daily price bars, one row per stock per day
CREATE TABLE IF NOT EXISTS price_bars (
    stock_code TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    open TEXT NOT NULL,
    high TEXT NOT NULL,
    low TEXT NOT NULL,
    close TEXT NOT NULL,
    volume INTEGER NOT NULL DEFAULT 0,
    change_rate TEXT NOT NULL DEFAULT '0',
    PRIMARY KEY (stock_code, trade_date)
);

-- Strategy configuration (mutable)
CREATE TABLE IF NOT EXISTS strategies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    capital TEXT NOT NULL DEFAULT '0',
    buy_conditions TEXT NOT NULL DEFAULT '[]',
    sell_conditions TEXT NOT NULL DEFAULT '[]',
    indicators TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Named indicator formulas, interpreted at evaluation time
CREATE TABLE IF NOT EXISTS indicator_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    formula TEXT NOT NULL,
    default_params TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Orders produced by strategy evaluation (status machine lives here)
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id INTEGER NOT NULL REFERENCES strategies(id),
    stock_code TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 0,
    price TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    order_ref TEXT,
    broker_order_no TEXT,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Signals record the evaluation that triggered an order
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER REFERENCES orders(id),
    stock_code TEXT NOT NULL,
    side TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    rule TEXT,
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Cached backtest results, keyed by params hash
CREATE TABLE IF NOT EXISTS backtest_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    params_hash TEXT NOT NULL UNIQUE,
    strategy_id INTEGER NOT NULL,
    strategy_name TEXT NOT NULL,
    stock_code TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    initial_capital TEXT NOT NULL DEFAULT '0',
    final_equity TEXT NOT NULL DEFAULT '0',
    net_pnl TEXT NOT NULL DEFAULT '0',
    net_pnl_pct TEXT NOT NULL DEFAULT '0',
    total_trades INTEGER NOT NULL DEFAULT 0,
    winning_trades INTEGER NOT NULL DEFAULT 0,
    losing_trades INTEGER NOT NULL DEFAULT 0,
    win_rate TEXT NOT NULL DEFAULT '0',
    max_drawdown TEXT NOT NULL DEFAULT '0',
    max_drawdown_pct TEXT NOT NULL DEFAULT '0',
    sharpe_ratio TEXT NOT NULL DEFAULT '0',
    profit_factor TEXT NOT NULL DEFAULT '0',
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_bars_code_date ON price_bars(stock_code, trade_date);
CREATE INDEX IF NOT EXISTS idx_orders_strategy ON orders(strategy_id);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_signals_order ON signals(order_id);
CREATE INDEX IF NOT EXISTS idx_signals_code_date ON signals(stock_code, trade_date);
CREATE INDEX IF NOT EXISTS idx_backtest_hash ON backtest_runs(params_hash);
CREATE INDEX IF NOT EXISTS idx_backtest_strategy ON backtest_runs(strategy_name, stock_code)
"#;

/// ALTER TABLE migrations, run after table creation.
/// "duplicate column name" errors are tolerated on subsequent runs.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE orders ADD COLUMN filled_price TEXT",
    "ALTER TABLE orders ADD COLUMN filled_at INTEGER",
];
