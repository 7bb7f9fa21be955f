//! Error taxonomy for the forecasting engine.
//!
//! Nothing here is globally fatal: a failing pair or chunk is isolated and
//! surfaced through aggregate counters, never by aborting a batch run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fewer history points than the regression minimum. The pair is skipped,
    /// not failed; callers log and move on.
    #[error(
        "insufficient data for product {product_id} @ market {market_id}: \
         {points} points, need {required}"
    )]
    InsufficientData {
        product_id: i64,
        market_id: i64,
        points: usize,
        required: usize,
    },

    /// Unknown product or market id in a request. Only the offending pair
    /// fails; the rest of a bulk request proceeds.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Unrecognized trend directive. The override falls back to an unchanged
    /// price and the request still succeeds.
    #[error("unparseable trend directive '{0}'")]
    ParseFailure(String),

    /// Unexpected failure during one pair's generation or one chunk's
    /// processing, isolated to that unit of work.
    #[error("system failure: {0}")]
    SystemFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ForecastError {
    /// Skips are reported separately from failures in batch aggregates.
    pub fn is_skip(&self) -> bool {
        matches!(self, ForecastError::InsufficientData { .. })
    }
}

impl From<anyhow::Error> for ForecastError {
    fn from(err: anyhow::Error) -> Self {
        ForecastError::SystemFailure(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
