//! Descriptive statistics and trend backtesting for price windows.

use statrs::statistics::Statistics;

use crate::analytics::regression::LinearTrend;

/// How many of the newest observations the MAPE backtest covers.
pub const MAPE_LOOKBACK: usize = 10;

/// Summary statistics over one pair's price window.
#[derive(Debug, Clone, Copy)]
pub struct SeriesStats {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// Coefficient of variation, stddev/mean x 100. Scale-independent
    /// volatility; 0.0 for an empty or constant-zero series.
    pub cv_percent: f64,
}

impl SeriesStats {
    pub fn describe(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                variance: 0.0,
                std_dev: 0.0,
                cv_percent: 0.0,
            };
        }

        let mean = values.mean();
        let variance = if values.len() < 2 {
            0.0
        } else {
            values.variance()
        };
        let std_dev = variance.sqrt();

        let cv_percent = if mean.abs() <= f64::EPSILON {
            // All-zero prices: constant -> stable, anything else -> untrustworthy
            if std_dev <= f64::EPSILON {
                0.0
            } else {
                100.0
            }
        } else {
            std_dev / mean * 100.0
        };

        Self {
            mean,
            variance,
            std_dev,
            cv_percent,
        }
    }
}

/// Mean absolute percentage error of the fitted line against the newest
/// `MAPE_LOOKBACK` observations at their historical x positions.
///
/// Zero-price points are skipped to avoid division by zero; if nothing
/// usable remains the error is 0.
pub fn mape_backtest(trend: &LinearTrend, values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }

    let start = n.saturating_sub(MAPE_LOOKBACK);
    let mut total = 0.0;
    let mut counted = 0usize;

    for (x, &actual) in values.iter().enumerate().skip(start) {
        if actual.abs() <= f64::EPSILON {
            continue;
        }
        let fitted = trend.predict(x as f64);
        total += ((actual - fitted) / actual).abs() * 100.0;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}
