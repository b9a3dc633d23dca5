//! Bar-by-bar backtesting engine

use chrono::NaiveDate;
use persistence::repository::BacktestRunRecord;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::strategy::{Signal, Strategy};
use crate::types::{BacktestResult, BacktestTrade, EquityPoint, PriceBar};

/// Position state during simulation
struct OpenPosition {
    entry_date: NaiveDate,
    entry_price: Decimal,
    quantity: i64,
}

/// Backtesting engine that simulates bar-by-bar execution.
/// Long only: a buy opens a whole-share position sized from available
/// capital, a sell closes it. Signals while a position is open (or while
/// flat, on the sell side) are ignored.
pub struct BacktestEngine;

impl BacktestEngine {
    pub fn run(strategy: &Strategy, bars: &[PriceBar]) -> BacktestResult {
        let signals = strategy.signals(bars);

        let mut equity = strategy.capital;
        let mut peak_equity = equity;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_pct = Decimal::ZERO;

        let mut trades: Vec<BacktestTrade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();
        let mut position: Option<OpenPosition> = None;

        let hundred = dec!(100);

        info!(
            strategy = %strategy.name,
            bars = bars.len(),
            capital = %strategy.capital,
            "Starting backtest"
        );

        for (bar, signal) in bars.iter().zip(&signals) {
            match signal {
                Signal::Buy => {
                    if position.is_none() && bar.close > Decimal::ZERO {
                        // Whole shares only; skip when capital buys none
                        let quantity = (equity / bar.close).trunc();
                        if quantity >= Decimal::ONE {
                            let quantity: i64 =
                                quantity.to_string().parse().unwrap_or(0);
                            position = Some(OpenPosition {
                                entry_date: bar.trade_date,
                                entry_price: bar.close,
                                quantity,
                            });

                            debug!(
                                price = %bar.close,
                                quantity,
                                date = %bar.trade_date,
                                "Opened position"
                            );
                        }
                    }
                }
                Signal::Sell => {
                    if let Some(pos) = position.take() {
                        let trade = close_trade(&pos, bar.trade_date, bar.close, hundred);
                        equity += trade.pnl;

                        debug!(
                            entry = %pos.entry_price,
                            exit = %bar.close,
                            pnl = %trade.pnl,
                            "Closed position"
                        );
                        trades.push(trade);
                    }
                }
                Signal::Hold => {}
            }

            // Track equity curve with unrealized PnL
            let unrealized = position
                .as_ref()
                .map(|pos| (bar.close - pos.entry_price) * Decimal::from(pos.quantity))
                .unwrap_or(Decimal::ZERO);
            let current_equity = equity + unrealized;

            equity_curve.push(EquityPoint {
                date: bar.trade_date,
                equity: current_equity,
            });

            if current_equity > peak_equity {
                peak_equity = current_equity;
            }
            let drawdown = peak_equity - current_equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                if peak_equity > Decimal::ZERO {
                    max_drawdown_pct = drawdown / peak_equity * hundred;
                }
            }
        }

        // Close any remaining open position at the last bar
        if let Some(pos) = position.take() {
            if let Some(last) = bars.last() {
                let trade = close_trade(&pos, last.trade_date, last.close, hundred);
                equity += trade.pnl;
                trades.push(trade);
            }
        }

        let total_trades = trades.len() as u32;
        let winning_trades = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count() as u32;
        let losing_trades = trades.iter().filter(|t| t.pnl <= Decimal::ZERO).count() as u32;

        let win_rate = if total_trades > 0 {
            Decimal::from(winning_trades) / Decimal::from(total_trades) * hundred
        } else {
            Decimal::ZERO
        };

        let net_pnl = equity - strategy.capital;
        let net_pnl_pct = if strategy.capital > Decimal::ZERO {
            net_pnl / strategy.capital * hundred
        } else {
            Decimal::ZERO
        };

        // Profit factor = gross profits / gross losses
        let gross_profits: Decimal = trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .sum();
        let gross_losses: Decimal = trades
            .iter()
            .filter(|t| t.pnl < Decimal::ZERO)
            .map(|t| t.pnl.abs())
            .sum();
        let profit_factor = if gross_losses > Decimal::ZERO {
            gross_profits / gross_losses
        } else if gross_profits > Decimal::ZERO {
            dec!(999.99) // Infinite profit factor capped
        } else {
            Decimal::ZERO
        };

        let sharpe_ratio = Self::calculate_sharpe(&trades);

        let today = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let start_date = bars.first().map(|b| b.trade_date).unwrap_or(today);
        let end_date = bars.last().map(|b| b.trade_date).unwrap_or(today);

        info!(
            total_trades,
            winning_trades,
            win_rate = %win_rate,
            net_pnl = %net_pnl,
            max_drawdown = %max_drawdown,
            "Backtest complete"
        );

        BacktestResult {
            strategy_name: strategy.name.clone(),
            stock_code: bars
                .first()
                .map(|b| b.stock_code.clone())
                .unwrap_or_default(),
            start_date,
            end_date,
            initial_capital: strategy.capital,
            final_equity: equity,
            net_pnl,
            net_pnl_pct,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            profit_factor,
            trades,
            equity_curve,
        }
    }

    /// Calculate simplified Sharpe ratio from trade returns
    fn calculate_sharpe(trades: &[BacktestTrade]) -> Decimal {
        if trades.len() < 2 {
            return Decimal::ZERO;
        }

        let returns: Vec<f64> = trades
            .iter()
            .map(|t| t.pnl_pct.to_string().parse::<f64>().unwrap_or(0.0))
            .collect();

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;

        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();

        if std_dev < 1e-10 {
            return Decimal::ZERO;
        }

        Decimal::from_str_exact(&format!("{:.2}", mean / std_dev)).unwrap_or(Decimal::ZERO)
    }
}

fn close_trade(
    pos: &OpenPosition,
    exit_date: NaiveDate,
    exit_price: Decimal,
    hundred: Decimal,
) -> BacktestTrade {
    let pnl = (exit_price - pos.entry_price) * Decimal::from(pos.quantity);
    let pnl_pct = if pos.entry_price > Decimal::ZERO {
        (exit_price - pos.entry_price) / pos.entry_price * hundred
    } else {
        Decimal::ZERO
    };

    BacktestTrade {
        entry_date: pos.entry_date,
        exit_date,
        entry_price: pos.entry_price,
        exit_price,
        quantity: pos.quantity,
        pnl,
        pnl_pct,
    }
}

/// Deterministic cache key for a run: strategy rules + instrument + window
pub fn params_hash(
    strategy: &Strategy,
    stock_code: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(strategy.name.as_bytes());
    hasher.update(b"|");
    hasher.update(strategy.buy_sources.join(";").as_bytes());
    hasher.update(b"|");
    hasher.update(strategy.sell_sources.join(";").as_bytes());
    hasher.update(b"|");
    hasher.update(stock_code.as_bytes());
    hasher.update(b"|");
    hasher.update(start_date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(end_date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(strategy.capital.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Flatten a result into its cache row
pub fn to_run_record(
    result: &BacktestResult,
    strategy_id: i64,
    params_hash: &str,
) -> BacktestRunRecord {
    BacktestRunRecord {
        id: None,
        params_hash: params_hash.to_string(),
        strategy_id,
        strategy_name: result.strategy_name.clone(),
        stock_code: result.stock_code.clone(),
        start_date: result.start_date.to_string(),
        end_date: result.end_date.to_string(),
        initial_capital: result.initial_capital.to_string(),
        final_equity: result.final_equity.to_string(),
        net_pnl: result.net_pnl.to_string(),
        net_pnl_pct: result.net_pnl_pct.to_string(),
        total_trades: result.total_trades as i64,
        winning_trades: result.winning_trades as i64,
        losing_trades: result.losing_trades as i64,
        win_rate: result.win_rate.to_string(),
        max_drawdown: result.max_drawdown.to_string(),
        max_drawdown_pct: result.max_drawdown_pct.to_string(),
        sharpe_ratio: result.sharpe_ratio.to_string(),
        profit_factor: result.profit_factor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::tests::make_bars;
    use persistence::repository::StrategyRecord;

    fn strategy(buy: &str, sell: &str, capital: &str) -> Strategy {
        Strategy::from_record(&StrategyRecord {
            id: Some(1),
            name: "threshold".to_string(),
            active: 1,
            capital: capital.to_string(),
            buy_conditions: buy.to_string(),
            sell_conditions: sell.to_string(),
            indicators: "[]".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn empty_bars_produce_empty_result() {
        let s = strategy(r#"["ABOVE(close, 10)"]"#, r#"["BELOW(close, 5)"]"#, "1000");
        let result = BacktestEngine::run(&s, &[]);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.net_pnl, Decimal::ZERO);
        assert!(result.equity_curve.is_empty());
    }

    #[test]
    fn round_trip_trade_profits() {
        // Buy at 10 (bar 1), sell at 30 (bar 3): 100 shares, +2000
        let s = strategy(
            r#"["BETWEEN(close, 8, 12)"]"#,
            r#"["ABOVE(close, 25)"]"#,
            "1000",
        );
        let bars = make_bars(&[50.0, 10.0, 20.0, 30.0]);

        let result = BacktestEngine::run(&s, &bars);
        assert_eq!(result.total_trades, 1);
        assert_eq!(result.winning_trades, 1);
        assert_eq!(result.trades[0].quantity, 100);
        assert_eq!(result.net_pnl, Decimal::from(2000));
        assert_eq!(result.final_equity, Decimal::from(3000));
        assert_eq!(result.win_rate, Decimal::from(100));
    }

    #[test]
    fn open_position_is_closed_on_last_bar() {
        let s = strategy(r#"["BETWEEN(close, 8, 12)"]"#, "[]", "1000");
        let bars = make_bars(&[10.0, 15.0, 20.0]);

        let result = BacktestEngine::run(&s, &bars);
        assert_eq!(result.total_trades, 1);
        assert_eq!(result.trades[0].exit_date, bars[2].trade_date);
        assert_eq!(result.net_pnl, Decimal::from(1000));
    }

    #[test]
    fn entry_skipped_when_capital_buys_no_share() {
        let s = strategy(r#"["ABOVE(close, 0)"]"#, "[]", "5");
        let bars = make_bars(&[10.0, 20.0]);

        let result = BacktestEngine::run(&s, &bars);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.final_equity, Decimal::from(5));
    }

    #[test]
    fn drawdown_tracks_equity_trough() {
        // Buy at 10, price dips to 5 before recovering: drawdown 500 (50%)
        let s = strategy(r#"["BETWEEN(close, 9, 11)"]"#, "[]", "1000");
        let bars = make_bars(&[10.0, 5.0, 10.0]);

        let result = BacktestEngine::run(&s, &bars);
        assert_eq!(result.max_drawdown, Decimal::from(500));
        assert_eq!(result.max_drawdown_pct, Decimal::from(50));
    }

    #[test]
    fn hash_is_stable_and_parameter_sensitive() {
        let a = strategy(r#"["ABOVE(close, 10)"]"#, "[]", "1000");
        let b = strategy(r#"["ABOVE(close, 11)"]"#, "[]", "1000");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert_eq!(
            params_hash(&a, "005930", start, end),
            params_hash(&a, "005930", start, end)
        );
        assert_ne!(
            params_hash(&a, "005930", start, end),
            params_hash(&b, "005930", start, end)
        );
        assert_ne!(
            params_hash(&a, "005930", start, end),
            params_hash(&a, "000660", start, end)
        );
    }
}
