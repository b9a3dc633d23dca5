//! Strategy model and per-bar signal evaluation
//!
//! A strategy row stores its buy/sell rules as JSON arrays of condition
//! text. All buy conditions must hold on a bar to emit a buy signal; the
//! same goes for the sell side. A bar where both sides fire is a hold.

use crate::eval::eval_condition;
use crate::formula::{parse_condition, Condition, ParseError};
use crate::types::PriceBar;
use persistence::repository::StrategyRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid condition list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid condition '{source}': {error}")]
    Formula {
        source: String,
        #[source]
        error: ParseError,
    },

    #[error("Invalid capital amount: {0}")]
    Capital(String),
}

/// Per-bar strategy verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// A parsed, ready-to-evaluate strategy
#[derive(Debug, Clone)]
pub struct Strategy {
    pub id: Option<i64>,
    pub name: String,
    pub active: bool,
    pub capital: Decimal,
    pub buy_conditions: Vec<Condition>,
    pub sell_conditions: Vec<Condition>,
    /// Original rule text, kept for signal records and error messages
    pub buy_sources: Vec<String>,
    pub sell_sources: Vec<String>,
}

fn parse_condition_list(json: &str) -> Result<(Vec<Condition>, Vec<String>), StrategyError> {
    let sources: Vec<String> = serde_json::from_str(json)?;
    let mut conditions = Vec::with_capacity(sources.len());
    for source in &sources {
        let cond = parse_condition(source).map_err(|error| StrategyError::Formula {
            source: source.clone(),
            error,
        })?;
        conditions.push(cond);
    }
    Ok((conditions, sources))
}

impl Strategy {
    /// Parse a stored strategy row, validating every rule up front
    pub fn from_record(record: &StrategyRecord) -> Result<Self, StrategyError> {
        let (buy_conditions, buy_sources) = parse_condition_list(&record.buy_conditions)?;
        let (sell_conditions, sell_sources) = parse_condition_list(&record.sell_conditions)?;
        let capital = Decimal::from_str(&record.capital)
            .map_err(|_| StrategyError::Capital(record.capital.clone()))?;

        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            active: record.active != 0,
            capital,
            buy_conditions,
            sell_conditions,
            buy_sources,
            sell_sources,
        })
    }

    /// Evaluate the strategy over the bar series, one signal per bar.
    /// An empty buy (or sell) side never fires.
    pub fn signals(&self, bars: &[PriceBar]) -> Vec<Signal> {
        let buy = all_of(&self.buy_conditions, bars);
        let sell = all_of(&self.sell_conditions, bars);

        buy.into_iter()
            .zip(sell)
            .map(|(b, s)| match (b, s) {
                (true, false) => Signal::Buy,
                (false, true) => Signal::Sell,
                _ => Signal::Hold,
            })
            .collect()
    }

    /// The signal on the most recent bar
    pub fn latest_signal(&self, bars: &[PriceBar]) -> Signal {
        self.signals(bars).last().copied().unwrap_or(Signal::Hold)
    }

    /// One-line description of the side that fired, for signal records
    pub fn rule_text(&self, signal: Signal) -> Option<String> {
        match signal {
            Signal::Buy => Some(self.buy_sources.join(" AND ")),
            Signal::Sell => Some(self.sell_sources.join(" AND ")),
            Signal::Hold => None,
        }
    }
}

fn all_of(conditions: &[Condition], bars: &[PriceBar]) -> Vec<bool> {
    if conditions.is_empty() {
        return vec![false; bars.len()];
    }
    let mut out = vec![true; bars.len()];
    for cond in conditions {
        for (acc, value) in out.iter_mut().zip(eval_condition(cond, bars)) {
            *acc = *acc && value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::tests::make_bars;

    fn record(buy: &str, sell: &str) -> StrategyRecord {
        StrategyRecord {
            id: Some(1),
            name: "golden-cross".to_string(),
            active: 1,
            capital: "1000000".to_string(),
            buy_conditions: buy.to_string(),
            sell_conditions: sell.to_string(),
            indicators: "[]".to_string(),
        }
    }

    #[test]
    fn parses_stored_rules() {
        let strategy = Strategy::from_record(&record(
            r#"["CROSS_ABOVE(SMA(5), SMA(20))", "ABOVE(close, 1000)"]"#,
            r#"["CROSS_BELOW(SMA(5), SMA(20))"]"#,
        ))
        .unwrap();

        assert_eq!(strategy.buy_conditions.len(), 2);
        assert_eq!(strategy.sell_conditions.len(), 1);
        assert!(strategy.active);
        assert_eq!(strategy.capital, Decimal::from(1_000_000));
    }

    #[test]
    fn bad_rule_names_the_offender() {
        let err = Strategy::from_record(&record(r#"["ABOVE(close, )"]"#, "[]")).unwrap_err();
        match err {
            StrategyError::Formula { source, .. } => assert_eq!(source, "ABOVE(close, )"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn buy_requires_all_conditions() {
        let strategy = Strategy::from_record(&record(
            r#"["ABOVE(close, 15)", "BELOW(close, 35)"]"#,
            r#"["ABOVE(close, 35)"]"#,
        ))
        .unwrap();

        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let signals = strategy.signals(&bars);
        assert_eq!(
            signals,
            vec![Signal::Hold, Signal::Buy, Signal::Buy, Signal::Sell]
        );
        assert_eq!(strategy.latest_signal(&bars), Signal::Sell);
    }

    #[test]
    fn both_sides_firing_is_a_hold() {
        let strategy = Strategy::from_record(&record(
            r#"["ABOVE(close, 15)"]"#,
            r#"["ABOVE(close, 15)"]"#,
        ))
        .unwrap();

        let bars = make_bars(&[10.0, 20.0]);
        assert_eq!(strategy.signals(&bars), vec![Signal::Hold, Signal::Hold]);
    }

    #[test]
    fn empty_side_never_fires() {
        let strategy =
            Strategy::from_record(&record("[]", r#"["ABOVE(close, 0)"]"#)).unwrap();
        let bars = make_bars(&[10.0]);
        assert_eq!(strategy.signals(&bars), vec![Signal::Sell]);
        assert_eq!(strategy.rule_text(Signal::Sell).unwrap(), "ABOVE(close, 0)");
        assert!(strategy.rule_text(Signal::Hold).is_none());
    }
}
