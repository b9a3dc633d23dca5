//! Formula and condition evaluation over a bar series
//!
//! Expressions evaluate to one `Option<f64>` per bar (None while any
//! referenced indicator is warming up). Conditions evaluate to one bool per
//! bar; a condition over warmup values is false, never an error.

use crate::formula::{BinOp, Condition, Expr, Field, IndicatorCall};
use crate::types::PriceBar;

fn dec_to_f64(d: rust_decimal::Decimal) -> f64 {
    d.to_string().parse::<f64>().unwrap_or(0.0)
}

fn field_series(field: Field, bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .map(|bar| match field {
            Field::Open => dec_to_f64(bar.open),
            Field::High => dec_to_f64(bar.high),
            Field::Low => dec_to_f64(bar.low),
            Field::Close => dec_to_f64(bar.close),
            Field::Volume => bar.volume as f64,
        })
        .collect()
}

fn indicator_series(call: &IndicatorCall, bars: &[PriceBar]) -> Vec<Option<f64>> {
    use crate::indicators::*;

    let closes = field_series(Field::Close, bars);
    match call {
        IndicatorCall::Sma(period) => sma_series(&closes, *period),
        IndicatorCall::Ema(period) => ema_series(&closes, *period),
        IndicatorCall::Rsi(period) => rsi_series(&closes, *period),
        IndicatorCall::Stddev(period) => stddev_series(&closes, *period),
        IndicatorCall::Highest(period) => {
            highest_series(&field_series(Field::High, bars), *period)
        }
        IndicatorCall::Lowest(period) => lowest_series(&field_series(Field::Low, bars), *period),
        IndicatorCall::MacdLine { fast, slow, signal } => {
            macd_series(&closes, *fast, *slow, *signal).line
        }
        IndicatorCall::MacdSignal { fast, slow, signal } => {
            macd_series(&closes, *fast, *slow, *signal).signal
        }
        IndicatorCall::MacdHistogram { fast, slow, signal } => {
            macd_series(&closes, *fast, *slow, *signal).histogram
        }
        IndicatorCall::BollingerUpper { period, mult } => {
            bollinger_series(&closes, *period, *mult).upper
        }
        IndicatorCall::BollingerMiddle { period, mult } => {
            bollinger_series(&closes, *period, *mult).middle
        }
        IndicatorCall::BollingerLower { period, mult } => {
            bollinger_series(&closes, *period, *mult).lower
        }
    }
}

/// Evaluate a value expression over the bar series
pub fn eval_expr(expr: &Expr, bars: &[PriceBar]) -> Vec<Option<f64>> {
    match expr {
        Expr::Const(value) => vec![Some(*value); bars.len()],
        Expr::Field(field) => field_series(*field, bars).into_iter().map(Some).collect(),
        Expr::Indicator(call) => indicator_series(call, bars),
        Expr::Binary { op, left, right } => {
            let left = eval_expr(left, bars);
            let right = eval_expr(right, bars);
            left.into_iter()
                .zip(right)
                .map(|(l, r)| match (l, r) {
                    (Some(l), Some(r)) => match op {
                        BinOp::Add => Some(l + r),
                        BinOp::Sub => Some(l - r),
                        BinOp::Mul => Some(l * r),
                        BinOp::Div => (r != 0.0).then(|| l / r),
                    },
                    _ => None,
                })
                .collect()
        }
    }
}

/// Evaluate a condition over the bar series
pub fn eval_condition(cond: &Condition, bars: &[PriceBar]) -> Vec<bool> {
    match cond {
        Condition::Above { left, right } => compare(left, right, bars, |l, r| l > r),
        Condition::Below { left, right } => compare(left, right, bars, |l, r| l < r),
        Condition::CrossAbove { left, right } => cross(left, right, bars, true),
        Condition::CrossBelow { left, right } => cross(left, right, bars, false),
        Condition::Between { expr, lower, upper } => eval_expr(expr, bars)
            .into_iter()
            .map(|v| v.is_some_and(|v| v >= *lower && v <= *upper))
            .collect(),
        Condition::And(conditions) => {
            let mut out = vec![true; bars.len()];
            for cond in conditions {
                for (acc, value) in out.iter_mut().zip(eval_condition(cond, bars)) {
                    *acc = *acc && value;
                }
            }
            out
        }
        Condition::Or(conditions) => {
            let mut out = vec![false; bars.len()];
            for cond in conditions {
                for (acc, value) in out.iter_mut().zip(eval_condition(cond, bars)) {
                    *acc = *acc || value;
                }
            }
            out
        }
        Condition::Not(inner) => eval_condition(inner, bars).into_iter().map(|v| !v).collect(),
    }
}

fn compare(
    left: &Expr,
    right: &Expr,
    bars: &[PriceBar],
    cmp: impl Fn(f64, f64) -> bool,
) -> Vec<bool> {
    eval_expr(left, bars)
        .into_iter()
        .zip(eval_expr(right, bars))
        .map(|(l, r)| matches!((l, r), (Some(l), Some(r)) if cmp(l, r)))
        .collect()
}

/// A cross fires on the first bar where the relation holds after a bar
/// where it did not (both sides defined on both bars).
fn cross(left: &Expr, right: &Expr, bars: &[PriceBar], above: bool) -> Vec<bool> {
    let l = eval_expr(left, bars);
    let r = eval_expr(right, bars);

    let mut out = vec![false; bars.len()];
    for i in 1..bars.len() {
        let (Some(pl), Some(pr), Some(cl), Some(cr)) = (l[i - 1], r[i - 1], l[i], r[i]) else {
            continue;
        };
        out[i] = if above {
            pl <= pr && cl > cr
        } else {
            pl >= pr && cl < cr
        };
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::formula::{parse_condition, parse_expr};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    pub(crate) fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let price = Decimal::from_str_exact(&format!("{close:.2}")).unwrap();
                PriceBar {
                    stock_code: "005930".to_string(),
                    trade_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Days::new(i as u64),
                    open: price,
                    high: price + Decimal::ONE,
                    low: price - Decimal::ONE,
                    close: price,
                    volume: 1000,
                    change_rate: Decimal::ZERO,
                }
            })
            .collect()
    }

    #[test]
    fn constant_and_field_expressions() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        assert_eq!(
            eval_expr(&parse_expr("close").unwrap(), &bars),
            vec![Some(10.0), Some(20.0), Some(30.0)]
        );
        assert_eq!(
            eval_expr(&parse_expr("2").unwrap(), &bars),
            vec![Some(2.0); 3]
        );
    }

    #[test]
    fn arithmetic_over_series() {
        let bars = make_bars(&[10.0, 20.0]);
        let expr = parse_expr("close * 2 + 1").unwrap();
        assert_eq!(eval_expr(&expr, &bars), vec![Some(21.0), Some(41.0)]);
    }

    #[test]
    fn division_by_zero_is_undefined_not_panic() {
        let bars = make_bars(&[10.0]);
        let expr = parse_expr("close / 0").unwrap();
        assert_eq!(eval_expr(&expr, &bars), vec![None]);
    }

    #[test]
    fn indicator_warmup_propagates_through_arithmetic() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let expr = parse_expr("close / SMA(3) * 100").unwrap();
        let values = eval_expr(&expr, &bars);
        assert_eq!(values[0], None);
        assert_eq!(values[1], None);
        assert!((values[2].unwrap() - 150.0).abs() < 1e-9); // 3 / 2 * 100
        assert!((values[3].unwrap() - (4.0 / 3.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn above_and_below() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let above = eval_condition(&parse_condition("ABOVE(close, 15)").unwrap(), &bars);
        assert_eq!(above, vec![false, true, true]);
        let below = eval_condition(&parse_condition("BELOW(close, 15)").unwrap(), &bars);
        assert_eq!(below, vec![true, false, false]);
    }

    #[test]
    fn cross_above_fires_once() {
        // close crosses the constant 25 exactly between bar 1 and 2
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let fired = eval_condition(&parse_condition("CROSS_ABOVE(close, 25)").unwrap(), &bars);
        assert_eq!(fired, vec![false, false, true, false]);
    }

    #[test]
    fn cross_below_sma() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..5).map(|i| 109.0 - (i as f64) * 10.0));
        let bars = make_bars(&closes);

        let fired = eval_condition(
            &parse_condition("CROSS_BELOW(close, SMA(5))").unwrap(),
            &bars,
        );
        assert_eq!(fired.iter().filter(|&&f| f).count(), 1);
    }

    #[test]
    fn combinators() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let both = eval_condition(
            &parse_condition("AND(ABOVE(close, 15), BELOW(close, 25))").unwrap(),
            &bars,
        );
        assert_eq!(both, vec![false, true, false]);

        let either = eval_condition(
            &parse_condition("OR(BELOW(close, 15), ABOVE(close, 25))").unwrap(),
            &bars,
        );
        assert_eq!(either, vec![true, false, true]);

        let negated = eval_condition(&parse_condition("NOT(ABOVE(close, 15))").unwrap(), &bars);
        assert_eq!(negated, vec![true, false, false]);
    }

    #[test]
    fn warmup_comparison_is_false() {
        let bars = make_bars(&[1.0, 2.0]);
        // SMA(5) never warms up on two bars
        let fired = eval_condition(&parse_condition("ABOVE(close, SMA(5))").unwrap(), &bars);
        assert_eq!(fired, vec![false, false]);
    }

    #[test]
    fn between_bounds_inclusive() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let inside = eval_condition(&parse_condition("BETWEEN(close, 10, 20)").unwrap(), &bars);
        assert_eq!(inside, vec![true, true, false]);
    }
}
