//! Numerical core: least-squares trend fitting and descriptive statistics.

pub mod regression;
pub mod stats;

pub use regression::LinearTrend;
pub use stats::{mape_backtest, SeriesStats, MAPE_LOOKBACK};
