//! Indicator series computation
//!
//! Each function consumes a close-price series and returns one value per
//! input bar, with `None` during the indicator's warmup window. The `ta`
//! crate supplies the streaming math where it has the indicator; rolling
//! windows are hand-rolled for the rest.

use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

/// Simple moving average, `None` until `period` bars are seen
pub fn sma_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sma = SimpleMovingAverage::new(period).expect("Invalid SMA period");
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = sma.next(close);
            (i + 1 >= period).then_some(value)
        })
        .collect()
}

/// Exponential moving average, `None` until `period` bars are seen
pub fn ema_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut ema = ExponentialMovingAverage::new(period).expect("Invalid EMA period");
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = ema.next(close);
            (i + 1 >= period).then_some(value)
        })
        .collect()
}

/// Relative strength index, `None` until `period` bars are seen
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut rsi = RelativeStrengthIndex::new(period).expect("Invalid RSI period");
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = rsi.next(close);
            (i + 1 >= period).then_some(value)
        })
        .collect()
}

/// MACD line/signal/histogram series
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// MACD: the line warms up with the slow EMA, the signal (and histogram)
/// need `signal_period - 1` further bars on top of that.
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal_period)
        .expect("Invalid MACD params");

    let mut line = Vec::with_capacity(closes.len());
    let mut signal = Vec::with_capacity(closes.len());
    let mut histogram = Vec::with_capacity(closes.len());

    let signal_warmup = slow + signal_period - 1;
    for (i, &close) in closes.iter().enumerate() {
        let out = macd.next(close);
        line.push((i + 1 >= slow).then_some(out.macd));
        signal.push((i + 1 >= signal_warmup).then_some(out.signal));
        histogram.push((i + 1 >= signal_warmup).then_some(out.histogram));
    }

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

/// Bollinger band series (upper/middle/lower)
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn bollinger_series(closes: &[f64], period: usize, mult: f64) -> BollingerSeries {
    let mut bb = BollingerBands::new(period, mult).expect("Invalid Bollinger params");

    let mut upper = Vec::with_capacity(closes.len());
    let mut middle = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());

    for (i, &close) in closes.iter().enumerate() {
        let out = bb.next(close);
        let warm = i + 1 >= period;
        upper.push(warm.then_some(out.upper));
        middle.push(warm.then_some(out.average));
        lower.push(warm.then_some(out.lower));
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}

/// Rolling population standard deviation over `period` bars
pub fn stddev_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(closes, period, |window| {
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    })
}

/// Rolling maximum over `period` bars
pub fn highest_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Rolling minimum over `period` bars
pub fn lowest_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().cloned().fold(f64::INFINITY, f64::min)
    })
}

fn rolling(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 >= period {
            out.push(Some(f(&values[i + 1 - period..=i])));
        } else {
            out.push(None);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warmup_and_values() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = sma_series(&closes, 3);
        assert_eq!(sma[0], None);
        assert_eq!(sma[1], None);
        assert!((sma[2].unwrap() - 2.0).abs() < 1e-9);
        assert!((sma[3].unwrap() - 3.0).abs() < 1e-9);
        assert!((sma[4].unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_bounds() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 % 7.0)).collect();
        for value in rsi_series(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn rsi_saturates_on_monotonic_rise() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi.last().unwrap().unwrap() > 90.0);
    }

    #[test]
    fn macd_warmups_are_staggered() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin()).collect();
        let macd = macd_series(&closes, 12, 26, 9);
        assert_eq!(macd.line[24], None);
        assert!(macd.line[25].is_some());
        assert_eq!(macd.signal[32], None);
        assert!(macd.signal[33].is_some());
        assert_eq!(macd.histogram.len(), closes.len());
    }

    #[test]
    fn bollinger_orders_bands() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 13) % 7) as f64).collect();
        let bb = bollinger_series(&closes, 20, 2.0);
        for i in 19..closes.len() {
            let (upper, middle, lower) = (
                bb.upper[i].unwrap(),
                bb.middle[i].unwrap(),
                bb.lower[i].unwrap(),
            );
            assert!(upper >= middle);
            assert!(middle >= lower);
        }
    }

    #[test]
    fn stddev_of_constant_series_is_zero() {
        let closes = [5.0; 10];
        let sd = stddev_series(&closes, 4);
        assert_eq!(sd[2], None);
        assert!(sd[3].unwrap().abs() < 1e-12);
    }

    #[test]
    fn highest_lowest_windows() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0];
        let hi = highest_series(&values, 3);
        let lo = lowest_series(&values, 3);
        assert_eq!(hi[1], None);
        assert_eq!(hi[2], Some(4.0));
        assert_eq!(hi[5], Some(9.0));
        assert_eq!(lo[4], Some(1.0));
        assert_eq!(lo[6], Some(2.0));
    }
}
