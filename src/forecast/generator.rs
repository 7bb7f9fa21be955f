//! Single-pair forecast generation.
//!
//! Pulls the price window, fits the trend, scores confidence, classifies
//! each horizon day, and writes the rows. One call handles exactly one
//! (product, market) pair; fan-out across pairs belongs to the orchestrator.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::analytics::{mape_backtest, LinearTrend, SeriesStats};
use crate::error::{ForecastError, Result};
use crate::forecast::classifier::{classify, DayAssessment};
use crate::forecast::confidence::{base_confidence, decayed, ConfidenceInputs};
use crate::forecast::history::{
    dedupe_newest_first, oldest_first_prices, HISTORY_WINDOW, MIN_HISTORY_POINTS,
};
use crate::forecast::store::ForecastStore;
use crate::models::{Forecast, ForecastStatus, PairKey};

/// Forecasts are produced for the next 7 calendar days.
pub const FORECAST_HORIZON_DAYS: u32 = 7;

/// What one generation pass did for one pair.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub product_id: i64,
    pub market_id: i64,
    /// Rows written this pass.
    pub written: usize,
    /// Horizon days left alone because an override pins them.
    pub skipped_pinned: usize,
    /// Days classified ANOMALY among the written rows.
    pub anomalies: usize,
    /// Undecayed confidence the horizon was scored from.
    pub base_confidence: f64,
}

/// Generate and persist the 7-day horizon for one pair as of `as_of`.
///
/// Fails with `InsufficientData` when fewer than [`MIN_HISTORY_POINTS`]
/// distinct-date observations exist; in that case nothing is written and any
/// previously stored rows for the pair are left as they were. With `force`,
/// pinned rows are regenerated like any other and their override metadata is
/// cleared.
pub fn generate_for_pair(
    store: &ForecastStore,
    pair: PairKey,
    as_of: NaiveDate,
    force: bool,
) -> Result<GenerationOutcome> {
    let raw = store.recent_prices(pair, HISTORY_WINDOW)?;
    let window = dedupe_newest_first(raw);
    if window.len() < MIN_HISTORY_POINTS {
        return Err(ForecastError::InsufficientData {
            product_id: pair.product_id,
            market_id: pair.market_id,
            points: window.len(),
            required: MIN_HISTORY_POINTS,
        });
    }

    let values = oldest_first_prices(&window);
    let points = values.len();
    let latest_actual = values[points - 1];

    let trend = LinearTrend::fit(&values);
    let stats = SeriesStats::describe(&values);
    let mape = mape_backtest(&trend, &values);
    let base = base_confidence(&ConfidenceInputs {
        r_squared: trend.r_squared,
        cv_percent: stats.cv_percent,
        mape,
        points,
    });

    let horizon: Vec<NaiveDate> = (1..=FORECAST_HORIZON_DAYS)
        .map(|day| as_of + Duration::days(i64::from(day)))
        .collect();
    let pinned = if force {
        Vec::new()
    } else {
        store.overridden_dates(pair, &horizon)?
    };

    let mut rows = Vec::with_capacity(FORECAST_HORIZON_DAYS as usize);
    let mut anomalies = 0usize;
    for day in 1..=FORECAST_HORIZON_DAYS {
        let target_date = as_of + Duration::days(i64::from(day));
        if pinned.contains(&target_date) {
            continue;
        }

        // The horizon continues the window's x axis: last observation sits
        // at index points-1, so day d lands at (points-1)+d.
        let x = (points - 1) as f64 + f64::from(day);
        let predicted = trend.predict(x).max(0.0);
        let confidence = decayed(base, day);

        let change_percent = if latest_actual.abs() <= f64::EPSILON {
            0.0
        } else {
            (predicted - latest_actual) / latest_actual * 100.0
        };

        let verdict = classify(&DayAssessment {
            change_percent,
            confidence,
            cv_percent: stats.cv_percent,
            mape,
            day,
        });
        if verdict.status == ForecastStatus::Anomaly {
            anomalies += 1;
            debug!(
                "⚠️ {} day {} flagged {} ({:+.1}% vs latest actual)",
                pair,
                day,
                verdict.rule.unwrap_or("anomaly"),
                change_percent
            );
        }

        rows.push(Forecast::new(pair, target_date, predicted, confidence, verdict.status));
    }

    let (written, skipped_in_write) = store.upsert_pair_batch(&rows, force)?;
    let skipped_pinned = pinned.len() + skipped_in_write;

    debug!(
        "{}: {} rows written, {} pinned, base confidence {:.3}",
        pair, written, skipped_pinned, base
    );

    Ok(GenerationOutcome {
        product_id: pair.product_id,
        market_id: pair.market_id,
        written,
        skipped_pinned,
        anomalies,
        base_confidence: base,
    })
}
