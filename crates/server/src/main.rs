//! Stockbridge — broker bridge and strategy server for daily stock trading
//!
//! Usage:
//!   stockbridge serve --port 8400              — Launch the HTTP API
//!   stockbridge sync                           — One-shot account sync
//!   stockbridge scan --codes 005930,000660     — Evaluate strategies from CLI
//!   stockbridge backtest --strategy golden-cross --code 005930 \
//!       --start 2023-01-02 --end 2023-12-28

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use engine::{
    params_hash, place_pending_order, sync_account, to_run_record, BacktestEngine, BrokerApi,
    BrokerClient, Notification, Notifier, PriceBar, Signal, Strategy,
};
use persistence::repository::{
    BacktestRunRepository, BarRepository, IndicatorDefRecord, IndicatorRepository,
    OrderRepository, OrderStatus, SignalRepository, StrategyRecord, StrategyRepository,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "stockbridge")]
#[command(about = "Broker bridge and strategy server for daily stock trading", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 8400)]
        port: u16,
    },
    /// Reconcile open orders and balance against the broker, then exit
    Sync,
    /// Evaluate active strategies over stored bars and queue pending orders
    Scan {
        /// Stock codes to scan (comma-separated)
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
        /// How many recent bars to evaluate over
        #[arg(long, default_value_t = 200)]
        lookback: i64,
    },
    /// Run a backtest from CLI
    Backtest {
        /// Strategy name (must exist in the database)
        #[arg(long)]
        strategy: String,
        /// Stock code
        #[arg(long)]
        code: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Ignore the cached result and recompute
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone)]
struct AppState {
    broker: Arc<BrokerClient>,
    notifier: Arc<Notifier>,
    db: Arc<persistence::Database>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,stockbridge=debug")
    } else {
        EnvFilter::new("info,engine=info,stockbridge=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn broker_from_env() -> anyhow::Result<BrokerClient> {
    let base_url = std::env::var("BROKER_BASE_URL")
        .map_err(|_| anyhow::anyhow!("BROKER_BASE_URL is not set"))?;
    let access_token = std::env::var("BROKER_ACCESS_TOKEN")
        .map_err(|_| anyhow::anyhow!("BROKER_ACCESS_TOKEN is not set"))?;
    Ok(BrokerClient::new(base_url, access_token))
}

async fn open_database() -> anyhow::Result<(persistence::Database, String)> {
    let db_path =
        std::env::var("STOCKBRIDGE_DB_PATH").unwrap_or_else(|_| "data/stockbridge.db".to_string());
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    Ok((db, db_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(&host, port).await?,
        Commands::Sync => cmd_sync().await?,
        Commands::Scan { codes, lookback } => cmd_scan(codes, lookback).await?,
        Commands::Backtest {
            strategy,
            code,
            start,
            end,
            force,
        } => cmd_backtest(strategy, code, start, end, force).await?,
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Stockbridge v{} starting...", APP_VERSION);

    let (db, db_path) = open_database().await?;
    info!("Database initialized: {}", db_path);

    let state = AppState {
        broker: Arc::new(broker_from_env()?),
        notifier: Arc::new(Notifier::new(std::env::var("NOTIFY_WEBHOOK_URL").ok())),
        db: Arc::new(db),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/price/:code", get(api_price))
        .route("/bars", get(api_bars))
        .route("/bars/ingest", post(api_ingest_bars))
        .route("/strategies", get(api_list_strategies).post(api_save_strategy))
        .route("/indicators", get(api_list_indicators).post(api_save_indicator))
        .route("/signals", get(api_signals))
        .route("/backtest", post(api_backtest))
        .route("/backtest/runs", get(api_backtest_runs))
        .route("/account/sync", post(api_account_sync))
        .route("/notify", post(api_notify))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Stockbridge v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health           - Health check");
    println!("  GET  /api/price/:code      - Current quote from the broker");
    println!("  GET  /api/bars             - Stored daily bars");
    println!("  POST /api/bars/ingest      - Pull daily bars from the broker");
    println!("  GET  /api/strategies       - List strategies");
    println!("  POST /api/strategies       - Create or update a strategy");
    println!("  GET  /api/indicators       - List indicator definitions");
    println!("  POST /api/indicators       - Create or update an indicator");
    println!("  GET  /api/signals          - Recent signals");
    println!("  POST /api/backtest         - Run (or replay) a backtest");
    println!("  GET  /api/backtest/runs    - Backtest history");
    println!("  POST /api/account/sync     - Reconcile orders and balance");
    println!("  POST /api/notify           - Relay a webhook notification");
    println!("\n  Database: {}", db_path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Sync command — one-shot reconcile
// ============================================================================

async fn cmd_sync() -> anyhow::Result<()> {
    println!("\n=== Stockbridge v{} ===", APP_VERSION);

    let (db, db_path) = open_database().await?;
    println!("Database: {}", db_path);

    let broker = broker_from_env()?;
    let report = sync_account(&broker, db.pool()).await?;

    println!(
        "Sync complete: {} checked, {} filled, {} rejected",
        report.checked, report.filled, report.rejected
    );
    println!("Cash: {}", report.cash);
    for position in &report.positions {
        println!(
            "  {} x{} @ {}",
            position.stock_code, position.quantity, position.avg_price
        );
    }
    Ok(())
}

// ============================================================================
// Scan command — evaluate strategies from CLI
// ============================================================================

async fn cmd_scan(codes: Vec<String>, lookback: i64) -> anyhow::Result<()> {
    println!("\n=== Stockbridge v{} ===", APP_VERSION);
    if codes.is_empty() {
        anyhow::bail!("No stock codes given (use --codes)");
    }

    let (db, db_path) = open_database().await?;
    println!("Database: {}", db_path);

    let strategies = StrategyRepository::new(db.pool()).list(true).await?;
    if strategies.is_empty() {
        println!("No active strategies.");
        return Ok(());
    }

    let mut placed = 0u32;
    for record in &strategies {
        let strategy = match Strategy::from_record(record) {
            Ok(s) => s,
            Err(e) => {
                warn!(strategy = %record.name, error = %e, "Skipping unparsable strategy");
                continue;
            }
        };

        for code in &codes {
            let bars = load_recent_bars(&db, code, lookback).await?;
            if bars.is_empty() {
                warn!(code, "No stored bars, skipping (ingest first)");
                continue;
            }

            let signal = strategy.latest_signal(&bars);
            if signal == Signal::Hold {
                continue;
            }

            // One open order per strategy/stock: repeat scans must not
            // re-queue the same signal
            if let Some(open) = OrderRepository::new(db.pool())
                .find_open(strategy.id.unwrap_or(0), code)
                .await?
            {
                info!(
                    code,
                    strategy = %strategy.name,
                    open_order = ?open.id,
                    "Open order exists, skipping signal"
                );
                continue;
            }

            let last = bars.last().unwrap();
            let quantity = match signal {
                Signal::Buy if last.close > Decimal::ZERO => {
                    let q: i64 = (strategy.capital / last.close)
                        .trunc()
                        .to_string()
                        .parse()
                        .unwrap_or(0);
                    q
                }
                _ => 0,
            };
            if signal == Signal::Buy && quantity == 0 {
                warn!(code, strategy = %strategy.name, "Capital buys no share, skipping");
                continue;
            }

            let order_id = place_pending_order(
                db.pool(),
                &strategy,
                code,
                signal,
                quantity,
                Some(last.close),
                last.trade_date,
            )
            .await?;

            println!(
                "  {} {} {:?} x{} @ {} (order {})",
                strategy.name, code, signal, quantity, last.close, order_id
            );
            placed += 1;
        }
    }

    println!("Scan complete: {} pending order(s) queued.", placed);
    Ok(())
}

async fn load_recent_bars(
    db: &persistence::Database,
    code: &str,
    lookback: i64,
) -> anyhow::Result<Vec<PriceBar>> {
    let records = BarRepository::new(db.pool())
        .get_range(code, "0000-01-01", "9999-12-31")
        .await?;
    let skip = records.len().saturating_sub(lookback.max(0) as usize);
    Ok(records[skip..]
        .iter()
        .filter_map(PriceBar::from_record)
        .collect())
}

// ============================================================================
// Backtest command — CLI mode
// ============================================================================

async fn cmd_backtest(
    strategy_name: String,
    code: String,
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
) -> anyhow::Result<()> {
    println!("\n=== Stockbridge v{} ===", APP_VERSION);

    let (db, db_path) = open_database().await?;
    println!("Database: {}", db_path);

    let record = StrategyRepository::new(db.pool())
        .get_by_name(&strategy_name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No strategy named '{strategy_name}'"))?;
    let strategy = Strategy::from_record(&record)?;
    let strategy_id = strategy.id.unwrap_or(0);

    let hash = params_hash(&strategy, &code, start, end);
    let runs = BacktestRunRepository::new(db.pool());

    if !force {
        if let Some(cached) = runs.get_by_hash(&hash).await? {
            println!("Cached result (use --force to recompute):");
            println!(
                "  PnL: {} ({}%) | trades: {} | win rate: {}% | sharpe: {}",
                cached.net_pnl,
                cached.net_pnl_pct,
                cached.total_trades,
                cached.win_rate,
                cached.sharpe_ratio
            );
            return Ok(());
        }
    }

    let bars = load_bar_range(&db, &code, start, end).await?;
    if bars.is_empty() {
        anyhow::bail!("No stored bars for {code} in {start}..{end} (ingest first)");
    }

    let result = BacktestEngine::run(&strategy, &bars);
    runs.save(&to_run_record(&result, strategy_id, &hash)).await?;

    println!(
        "  PnL: {} ({}%) | trades: {} | win rate: {}% | max drawdown: {}%",
        result.net_pnl, result.net_pnl_pct, result.total_trades, result.win_rate,
        result.max_drawdown_pct
    );
    println!(
        "  Sharpe: {} | profit factor: {} | final equity: {}",
        result.sharpe_ratio, result.profit_factor, result.final_equity
    );
    Ok(())
}

async fn load_bar_range(
    db: &persistence::Database,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<PriceBar>> {
    let records = BarRepository::new(db.pool())
        .get_range(code, &start.to_string(), &end.to_string())
        .await?;
    Ok(records.iter().filter_map(PriceBar::from_record).collect())
}

// ============================================================================
// API Handlers — health and market data
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stockbridge",
        "version": APP_VERSION,
    }))
}

/// GET /api/price/:code — current quote from the broker
async fn api_price(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Json<serde_json::Value> {
    match state.broker.get_price(&code).await {
        Ok(quote) => Json(serde_json::json!({
            "success": true,
            "quote": quote,
        })),
        Err(e) => {
            error!("Quote fetch failed: {}", e);
            Json(serde_json::json!({
                "success": false,
                "message": format!("Failed to fetch quote: {}", e),
            }))
        }
    }
}

/// GET /api/bars?code=&start=&end= — stored daily bars
async fn api_bars(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let Some(code) = params.get("code") else {
        return Json(serde_json::json!({
            "success": false,
            "message": "Missing 'code' parameter",
        }));
    };
    let start = params.get("start").map(String::as_str).unwrap_or("0000-01-01");
    let end = params.get("end").map(String::as_str).unwrap_or("9999-12-31");

    match BarRepository::new(state.db.pool()).get_range(code, start, end).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "code": code,
            "count": records.len(),
            "bars": records,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to query bars: {}", e),
        })),
    }
}

/// Body for POST /api/bars/ingest
#[derive(Deserialize)]
struct IngestRequest {
    code: String,
    start: NaiveDate,
    end: NaiveDate,
}

/// POST /api/bars/ingest — pull daily bars from the broker into storage
async fn api_ingest_bars(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Json<serde_json::Value> {
    info!(code = %request.code, start = %request.start, end = %request.end, "Ingesting bars");

    let bars = match state
        .broker
        .get_daily_bars(&request.code, request.start, request.end)
        .await
    {
        Ok(bars) => bars,
        Err(e) => {
            error!("Bar fetch failed: {}", e);
            return Json(serde_json::json!({
                "success": false,
                "message": format!("Failed to fetch bars: {}", e),
            }));
        }
    };

    let records: Vec<_> = bars.iter().map(PriceBar::to_record).collect();
    match BarRepository::new(state.db.pool()).upsert_many(&records).await {
        Ok(written) => Json(serde_json::json!({
            "success": true,
            "code": request.code,
            "written": written,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to store bars: {}", e),
        })),
    }
}

// ============================================================================
// API Handlers — strategies and indicators
// ============================================================================

/// GET /api/strategies?active=true
async fn api_list_strategies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let active_only = params.get("active").map(|s| s == "true").unwrap_or(false);

    match StrategyRepository::new(state.db.pool()).list(active_only).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "total": records.len(),
            "strategies": records,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to list strategies: {}", e),
        })),
    }
}

/// Body for POST /api/strategies
#[derive(Deserialize)]
struct SaveStrategyRequest {
    name: String,
    #[serde(default)]
    active: bool,
    capital: String,
    #[serde(default)]
    buy_conditions: Vec<String>,
    #[serde(default)]
    sell_conditions: Vec<String>,
    #[serde(default)]
    indicators: Vec<String>,
}

/// POST /api/strategies — create or update; every rule must parse
async fn api_save_strategy(
    State(state): State<AppState>,
    Json(request): Json<SaveStrategyRequest>,
) -> Json<serde_json::Value> {
    let record = StrategyRecord {
        id: None,
        name: request.name.clone(),
        active: request.active as i64,
        capital: request.capital,
        buy_conditions: serde_json::to_string(&request.buy_conditions).unwrap_or_default(),
        sell_conditions: serde_json::to_string(&request.sell_conditions).unwrap_or_default(),
        indicators: serde_json::to_string(&request.indicators).unwrap_or_default(),
    };

    // Reject before storing anything the evaluator would choke on
    if let Err(e) = Strategy::from_record(&record) {
        return Json(serde_json::json!({
            "success": false,
            "message": format!("Invalid strategy: {}", e),
        }));
    }

    match StrategyRepository::new(state.db.pool()).upsert(&record).await {
        Ok(id) => {
            info!(strategy = %request.name, id, "Strategy saved");
            Json(serde_json::json!({
                "success": true,
                "id": id,
                "name": request.name,
            }))
        }
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to save strategy: {}", e),
        })),
    }
}

/// GET /api/indicators
async fn api_list_indicators(State(state): State<AppState>) -> Json<serde_json::Value> {
    match IndicatorRepository::new(state.db.pool()).list().await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "total": records.len(),
            "indicators": records,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to list indicators: {}", e),
        })),
    }
}

/// Body for POST /api/indicators
#[derive(Deserialize)]
struct SaveIndicatorRequest {
    name: String,
    #[serde(default = "default_indicator_kind")]
    kind: String,
    formula: String,
    #[serde(default)]
    default_params: serde_json::Value,
}

fn default_indicator_kind() -> String {
    "formula".to_string()
}

/// POST /api/indicators — the formula must parse before it is stored
async fn api_save_indicator(
    State(state): State<AppState>,
    Json(request): Json<SaveIndicatorRequest>,
) -> Json<serde_json::Value> {
    if let Err(e) = engine::parse_expr(&request.formula) {
        return Json(serde_json::json!({
            "success": false,
            "message": format!("Invalid formula: {}", e),
        }));
    }

    let record = IndicatorDefRecord {
        id: None,
        name: request.name.clone(),
        kind: request.kind,
        formula: request.formula,
        default_params: request.default_params.to_string(),
    };

    match IndicatorRepository::new(state.db.pool()).upsert(&record).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "name": request.name,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to save indicator: {}", e),
        })),
    }
}

// ============================================================================
// API Handlers — signals and backtests
// ============================================================================

/// GET /api/signals?limit=&status= — recent signals, newest first
async fn api_signals(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit: i64 = params.get("limit").and_then(|s| s.parse().ok()).unwrap_or(50);
    let status = match params.get("status") {
        Some(raw) => match raw.parse::<OrderStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                return Json(serde_json::json!({
                    "success": false,
                    "message": e,
                }))
            }
        },
        None => None,
    };

    match SignalRepository::new(state.db.pool()).list_recent(limit, status).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "total": records.len(),
            "signals": records,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to list signals: {}", e),
        })),
    }
}

/// Body for POST /api/backtest
#[derive(Deserialize)]
struct BacktestRequest {
    strategy: String,
    code: String,
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    force: bool,
}

/// POST /api/backtest — run a backtest, replaying from cache when possible
async fn api_backtest(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Json<serde_json::Value> {
    let record = match StrategyRepository::new(state.db.pool())
        .get_by_name(&request.strategy)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Json(serde_json::json!({
                "success": false,
                "message": format!("No strategy named '{}'", request.strategy),
            }))
        }
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "message": format!("Failed to load strategy: {}", e),
            }))
        }
    };

    let strategy = match Strategy::from_record(&record) {
        Ok(s) => s,
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "message": format!("Stored strategy does not parse: {}", e),
            }))
        }
    };
    let strategy_id = strategy.id.unwrap_or(0);

    let hash = params_hash(&strategy, &request.code, request.start, request.end);
    let runs = BacktestRunRepository::new(state.db.pool());

    if !request.force {
        if let Ok(Some(cached)) = runs.get_by_hash(&hash).await {
            return Json(serde_json::json!({
                "success": true,
                "cached": true,
                "run": cached,
            }));
        }
    }

    let records = match BarRepository::new(state.db.pool())
        .get_range(
            &request.code,
            &request.start.to_string(),
            &request.end.to_string(),
        )
        .await
    {
        Ok(records) => records,
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "message": format!("Failed to load bars: {}", e),
            }))
        }
    };
    let bars: Vec<PriceBar> = records.iter().filter_map(PriceBar::from_record).collect();

    if bars.is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "message": format!(
                "No stored bars for {} in {}..{} (ingest first)",
                request.code, request.start, request.end
            ),
        }));
    }

    let result = BacktestEngine::run(&strategy, &bars);
    if let Err(e) = runs.save(&to_run_record(&result, strategy_id, &hash)).await {
        warn!("Failed to cache backtest run: {}", e);
    }

    Json(serde_json::json!({
        "success": true,
        "cached": false,
        "params_hash": hash,
        "result": result,
    }))
}

/// GET /api/backtest/runs?limit=&offset=&strategy= — cached run history
async fn api_backtest_runs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit: i64 = params.get("limit").and_then(|s| s.parse().ok()).unwrap_or(20);
    let offset: i64 = params.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0);
    let strategy = params.get("strategy").map(String::as_str);

    match BacktestRunRepository::new(state.db.pool())
        .list(limit, offset, strategy)
        .await
    {
        Ok((records, total)) => Json(serde_json::json!({
            "success": true,
            "runs": records,
            "total": total,
            "limit": limit,
            "offset": offset,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Failed to query runs: {}", e),
        })),
    }
}

// ============================================================================
// API Handlers — account and notifications
// ============================================================================

/// POST /api/account/sync — reconcile open orders and refresh balance
async fn api_account_sync(State(state): State<AppState>) -> Json<serde_json::Value> {
    match sync_account(state.broker.as_ref(), state.db.pool()).await {
        Ok(report) => {
            if report.filled > 0 && state.notifier.is_configured() {
                let notification = Notification {
                    title: "Orders filled".to_string(),
                    message: format!("{} order(s) filled during sync", report.filled),
                    level: "info".to_string(),
                };
                if let Err(e) = state.notifier.send(&notification).await {
                    warn!("Fill notification failed: {}", e);
                }
            }
            Json(serde_json::json!({
                "success": true,
                "report": report,
            }))
        }
        Err(e) => {
            error!("Account sync failed: {}", e);
            Json(serde_json::json!({
                "success": false,
                "message": format!("Sync failed: {}", e),
            }))
        }
    }
}

/// POST /api/notify — relay a message to the configured webhook
async fn api_notify(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> Json<serde_json::Value> {
    if !state.notifier.is_configured() {
        return Json(serde_json::json!({
            "success": false,
            "message": "NOTIFY_WEBHOOK_URL is not configured",
        }));
    }

    match state.notifier.send(&notification).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "message": format!("Notification failed: {}", e),
        })),
    }
}
