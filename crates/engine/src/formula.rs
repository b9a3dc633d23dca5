//! Indicator formula language — AST and recursive descent parser
//!
//! Formulas and strategy conditions are stored in the database as text and
//! interpreted at evaluation time. The language is closed: price fields,
//! numeric literals, arithmetic, a fixed set of indicator calls, and boolean
//! combinators. Nothing in a formula can execute arbitrary code.
//!
//! Value grammar:
//!   expr    := term (('+' | '-') term)*
//!   term    := primary (('*' | '/') primary)*
//!   primary := number | field | indicator | '(' expr ')'
//!
//! Condition grammar:
//!   ABOVE(e, e) | BELOW(e, e) | CROSS_ABOVE(e, e) | CROSS_BELOW(e, e)
//!   | BETWEEN(e, n, n) | AND(c, c, ...) | OR(c, c, ...) | NOT(c)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse failure with character offset into the source text
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

/// A raw price series field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// An indicator invocation with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndicatorCall {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Stddev(usize),
    Highest(usize),
    Lowest(usize),
    MacdLine { fast: usize, slow: usize, signal: usize },
    MacdSignal { fast: usize, slow: usize, signal: usize },
    MacdHistogram { fast: usize, slow: usize, signal: usize },
    BollingerUpper { period: usize, mult: f64 },
    BollingerMiddle { period: usize, mult: f64 },
    BollingerLower { period: usize, mult: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A value expression evaluated per bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Field(Field),
    Const(f64),
    Indicator(IndicatorCall),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A boolean condition evaluated per bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Above { left: Expr, right: Expr },
    Below { left: Expr, right: Expr },
    CrossAbove { left: Expr, right: Expr },
    CrossBelow { left: Expr, right: Expr },
    Between { expr: Expr, lower: f64, upper: f64 },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// Parse a value expression (an indicator formula body)
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a boolean condition (a strategy buy/sell rule)
pub fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    let mut parser = Parser::new(input);
    let cond = parser.parse_condition()?;
    parser.expect_end()?;
    Ok(cond)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{expected}', found '{ch}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!("unexpected input: '{}'", self.remaining())));
        }
        Ok(())
    }

    fn peek_word(&self) -> String {
        let mut word = String::new();
        for ch in self.remaining().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
            } else {
                break;
            }
        }
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false)
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            self.pos = start;
            return Err(self.error("expected number"));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {num_str}")))
    }

    fn parse_period(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected integer period"));
        }

        let num_str = &self.input[start..self.pos];
        let period: usize = num_str
            .parse()
            .map_err(|_| self.error(format!("invalid integer: {num_str}")))?;

        if period == 0 {
            self.pos = start;
            return Err(self.error("period must be at least 1"));
        }
        Ok(period)
    }

    // ---- value expressions ----

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if self.peek() == Some('(') {
            self.advance();
            let expr = self.parse_expr()?;
            self.expect_char(')')?;
            return Ok(expr);
        }

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            return Ok(Expr::Const(self.parse_number()?));
        }

        let word = self.peek_word();
        match word.as_str() {
            "open" | "high" | "low" | "close" | "volume" => {
                self.pos += word.len();
                let field = match word.as_str() {
                    "open" => Field::Open,
                    "high" => Field::High,
                    "low" => Field::Low,
                    "close" => Field::Close,
                    _ => Field::Volume,
                };
                Ok(Expr::Field(field))
            }
            _ => self.parse_indicator().map(Expr::Indicator),
        }
    }

    // Caller consumed "NAME(" already
    fn parse_single_period(&mut self) -> Result<usize, ParseError> {
        let period = self.parse_period()?;
        self.expect_char(')')?;
        Ok(period)
    }

    fn parse_macd_params(&mut self) -> Result<(usize, usize, usize), ParseError> {
        let fast = self.parse_period()?;
        self.expect_char(',')?;
        let slow = self.parse_period()?;
        self.expect_char(',')?;
        let signal = self.parse_period()?;
        self.expect_char(')')?;
        if fast >= slow {
            return Err(self.error("MACD fast period must be below slow period"));
        }
        Ok((fast, slow, signal))
    }

    fn parse_bollinger_params(&mut self) -> Result<(usize, f64), ParseError> {
        let period = self.parse_period()?;
        self.expect_char(',')?;
        let mult = self.parse_number()?;
        self.expect_char(')')?;
        if mult <= 0.0 {
            return Err(self.error("Bollinger multiplier must be positive"));
        }
        Ok((period, mult))
    }

    fn parse_indicator(&mut self) -> Result<IndicatorCall, ParseError> {
        self.skip_whitespace();

        if self.consume_exact("SMA(") {
            return Ok(IndicatorCall::Sma(self.parse_single_period()?));
        }
        if self.consume_exact("EMA(") {
            return Ok(IndicatorCall::Ema(self.parse_single_period()?));
        }
        if self.consume_exact("RSI(") {
            return Ok(IndicatorCall::Rsi(self.parse_single_period()?));
        }
        if self.consume_exact("STDDEV(") {
            return Ok(IndicatorCall::Stddev(self.parse_single_period()?));
        }
        if self.consume_exact("HIGHEST(") {
            return Ok(IndicatorCall::Highest(self.parse_single_period()?));
        }
        if self.consume_exact("LOWEST(") {
            return Ok(IndicatorCall::Lowest(self.parse_single_period()?));
        }

        if self.consume_exact("MACD_LINE(") {
            let (fast, slow, signal) = self.parse_macd_params()?;
            return Ok(IndicatorCall::MacdLine { fast, slow, signal });
        }
        if self.consume_exact("MACD_SIGNAL(") {
            let (fast, slow, signal) = self.parse_macd_params()?;
            return Ok(IndicatorCall::MacdSignal { fast, slow, signal });
        }
        if self.consume_exact("MACD_HISTOGRAM(") {
            let (fast, slow, signal) = self.parse_macd_params()?;
            return Ok(IndicatorCall::MacdHistogram { fast, slow, signal });
        }

        if self.consume_exact("BOLLINGER_UPPER(") {
            let (period, mult) = self.parse_bollinger_params()?;
            return Ok(IndicatorCall::BollingerUpper { period, mult });
        }
        if self.consume_exact("BOLLINGER_MIDDLE(") {
            let (period, mult) = self.parse_bollinger_params()?;
            return Ok(IndicatorCall::BollingerMiddle { period, mult });
        }
        if self.consume_exact("BOLLINGER_LOWER(") {
            let (period, mult) = self.parse_bollinger_params()?;
            return Ok(IndicatorCall::BollingerLower { period, mult });
        }

        let word = self.peek_word();
        Err(self.error(format!("expected indicator, found '{word}'")))
    }

    // ---- conditions ----

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        self.skip_whitespace();

        for keyword in ["CROSS_ABOVE", "CROSS_BELOW", "ABOVE", "BELOW"] {
            if self.peek_keyword(keyword) {
                self.pos += keyword.len();
                self.expect_char('(')?;
                let left = self.parse_expr()?;
                self.expect_char(',')?;
                let right = self.parse_expr()?;
                self.expect_char(')')?;
                return Ok(match keyword {
                    "CROSS_ABOVE" => Condition::CrossAbove { left, right },
                    "CROSS_BELOW" => Condition::CrossBelow { left, right },
                    "ABOVE" => Condition::Above { left, right },
                    _ => Condition::Below { left, right },
                });
            }
        }

        if self.peek_keyword("BETWEEN") {
            self.pos += "BETWEEN".len();
            self.expect_char('(')?;
            let expr = self.parse_expr()?;
            self.expect_char(',')?;
            let lower = self.parse_number()?;
            self.expect_char(',')?;
            let upper = self.parse_number()?;
            self.expect_char(')')?;
            return Ok(Condition::Between { expr, lower, upper });
        }

        if self.peek_keyword("AND") {
            self.pos += "AND".len();
            return self.parse_condition_list(true);
        }
        if self.peek_keyword("OR") {
            self.pos += "OR".len();
            return self.parse_condition_list(false);
        }
        if self.peek_keyword("NOT") {
            self.pos += "NOT".len();
            self.expect_char('(')?;
            let inner = self.parse_condition()?;
            self.expect_char(')')?;
            return Ok(Condition::Not(Box::new(inner)));
        }

        let word = self.peek_word();
        Err(self.error(format!("expected condition, found '{word}'")))
    }

    fn parse_condition_list(&mut self, is_and: bool) -> Result<Condition, ParseError> {
        self.expect_char('(')?;

        let mut conditions = vec![self.parse_condition()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            conditions.push(self.parse_condition()?);
        }

        if conditions.len() < 2 {
            let keyword = if is_and { "AND" } else { "OR" };
            return Err(self.error(format!("{keyword} requires at least 2 conditions")));
        }

        Ok(if is_and {
            Condition::And(conditions)
        } else {
            Condition::Or(conditions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_and_constant() {
        assert_eq!(parse_expr("close").unwrap(), Expr::Field(Field::Close));
        assert_eq!(parse_expr("42.5").unwrap(), Expr::Const(42.5));
        assert_eq!(parse_expr("-3").unwrap(), Expr::Const(-3.0));
    }

    #[test]
    fn parse_indicator_calls() {
        assert_eq!(
            parse_expr("SMA(20)").unwrap(),
            Expr::Indicator(IndicatorCall::Sma(20))
        );
        assert_eq!(
            parse_expr("MACD_LINE(12, 26, 9)").unwrap(),
            Expr::Indicator(IndicatorCall::MacdLine {
                fast: 12,
                slow: 26,
                signal: 9
            })
        );
        assert_eq!(
            parse_expr("BOLLINGER_UPPER(20, 2.5)").unwrap(),
            Expr::Indicator(IndicatorCall::BollingerUpper {
                period: 20,
                mult: 2.5
            })
        );
    }

    #[test]
    fn arithmetic_precedence() {
        // close / SMA(20) * 100 groups left-to-right at equal precedence
        let expr = parse_expr("close + volume * 2").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected Add at the top, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_expression() {
        let expr = parse_expr("(close + open) / 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Div, .. }));
    }

    #[test]
    fn disparity_formula_parses() {
        parse_expr("close / SMA(20) * 100").unwrap();
    }

    #[test]
    fn parse_conditions() {
        let cond = parse_condition("CROSS_ABOVE(SMA(5), SMA(20))").unwrap();
        assert!(matches!(cond, Condition::CrossAbove { .. }));

        let cond = parse_condition("BETWEEN(RSI(14), 30, 70)").unwrap();
        assert!(matches!(cond, Condition::Between { .. }));

        let cond =
            parse_condition("AND(ABOVE(close, SMA(20)), NOT(BELOW(volume, 1000)))").unwrap();
        match cond {
            Condition::And(list) => assert_eq!(list.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn variadic_or() {
        let cond = parse_condition(
            "OR(ABOVE(close, 100), BELOW(close, 50), CROSS_ABOVE(close, SMA(5)))",
        )
        .unwrap();
        match cond {
            Condition::Or(list) => assert_eq!(list.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn whitespace_is_insignificant() {
        parse_condition("  ABOVE ( close ,  SMA( 20 ) ) ").unwrap();
    }

    #[test]
    fn error_positions_are_reported() {
        let err = parse_condition("ABOVE(close, )").unwrap_err();
        assert!(err.message.contains("expected"));
        assert_eq!(err.position, 13);

        let err = parse_expr("SMA(0)").unwrap_err();
        assert!(err.message.contains("at least 1"));
    }

    #[test]
    fn error_trailing_garbage() {
        let err = parse_condition("ABOVE(close, 100) extra").unwrap_err();
        assert!(err.message.contains("unexpected input"));
    }

    #[test]
    fn error_single_element_and() {
        let err = parse_condition("AND(ABOVE(close, 100))").unwrap_err();
        assert!(err.message.contains("at least 2"));
    }

    #[test]
    fn error_macd_fast_not_below_slow() {
        let err = parse_expr("MACD_LINE(26, 12, 9)").unwrap_err();
        assert!(err.message.contains("fast"));
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert!(parse_condition("above(close, 100)").is_err());
    }
}
