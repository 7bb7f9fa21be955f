//! Composite confidence model.
//!
//! Four normalized sub-scores are blended into one [0,1] score: regression
//! fit, price stability, backtest accuracy, and data sufficiency. Forecast
//! days further out decay multiplicatively, floored so a published score
//! never drops below `CONFIDENCE_FLOOR`.

use crate::forecast::history::HISTORY_WINDOW;

pub const WEIGHT_FIT: f64 = 0.30;
pub const WEIGHT_STABILITY: f64 = 0.30;
pub const WEIGHT_ACCURACY: f64 = 0.25;
pub const WEIGHT_SUFFICIENCY: f64 = 0.15;

/// Multiplicative decay per day of forecast horizon.
pub const DAILY_DECAY: f64 = 0.97;
pub const CONFIDENCE_FLOOR: f64 = 0.30;

/// Everything the scorer needs, computed once per pair per run.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs {
    /// R² of the fitted trend; NaN for degenerate fits.
    pub r_squared: f64,
    pub cv_percent: f64,
    pub mape: f64,
    pub points: usize,
}

/// R² clamped to [0,1]; a degenerate fit scores neutral.
pub fn fit_score(r_squared: f64) -> f64 {
    if r_squared.is_nan() {
        0.5
    } else {
        r_squared.clamp(0.0, 1.0)
    }
}

/// Inverse coefficient of variation: full marks below 10%, nothing above 50%.
pub fn stability_score(cv_percent: f64) -> f64 {
    if cv_percent < 10.0 {
        1.0
    } else if cv_percent > 50.0 {
        0.0
    } else {
        1.0 - (cv_percent - 10.0) / 40.0
    }
}

/// Inverse MAPE: full marks below 5%, nothing above 25%.
pub fn accuracy_score(mape: f64) -> f64 {
    if mape < 5.0 {
        1.0
    } else if mape > 25.0 {
        0.0
    } else {
        1.0 - (mape - 5.0) / 20.0
    }
}

/// A full window scores 1.0; the 14-point minimum scores 0.7, ramping
/// linearly between; anything shorter is capped at 0.5.
pub fn sufficiency_score(points: usize) -> f64 {
    if points >= HISTORY_WINDOW {
        1.0
    } else if points < 14 {
        0.5
    } else {
        0.7 + (points - 14) as f64 / 16.0 * 0.3
    }
}

/// Weighted blend, clamped to [0,1]. Never NaN.
pub fn base_confidence(inputs: &ConfidenceInputs) -> f64 {
    let score = WEIGHT_FIT * fit_score(inputs.r_squared)
        + WEIGHT_STABILITY * stability_score(inputs.cv_percent)
        + WEIGHT_ACCURACY * accuracy_score(inputs.mape)
        + WEIGHT_SUFFICIENCY * sufficiency_score(inputs.points);
    score.clamp(0.0, 1.0)
}

/// Day-`day` confidence for a base score, `day` counted 1..=horizon.
/// Applied only at generation time; the base itself is never stored.
pub fn decayed(base: f64, day: u32) -> f64 {
    (base * DAILY_DECAY.powi(day as i32)).max(CONFIDENCE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let total = WEIGHT_FIT + WEIGHT_STABILITY + WEIGHT_ACCURACY + WEIGHT_SUFFICIENCY;
        assert!((total - 1.0).abs() < 1e-12);

        // A perfect pair scores exactly 1.0
        let perfect = ConfidenceInputs {
            r_squared: 1.0,
            cv_percent: 5.0,
            mape: 2.0,
            points: 30,
        };
        assert!((base_confidence(&perfect) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_fit_scores_neutral() {
        assert_eq!(fit_score(f64::NAN), 0.5);
        assert_eq!(fit_score(-0.4), 0.0);
        assert_eq!(fit_score(1.7), 1.0);

        let inputs = ConfidenceInputs {
            r_squared: f64::NAN,
            cv_percent: 5.0,
            mape: 2.0,
            points: 30,
        };
        let score = base_confidence(&inputs);
        assert!(!score.is_nan());
        assert!((score - (0.5 * WEIGHT_FIT + WEIGHT_STABILITY + WEIGHT_ACCURACY + WEIGHT_SUFFICIENCY)).abs() < 1e-12);
    }

    #[test]
    fn stability_band_edges() {
        assert_eq!(stability_score(9.99), 1.0);
        assert!((stability_score(10.0) - 1.0).abs() < 1e-12);
        assert!((stability_score(30.0) - 0.5).abs() < 1e-12);
        assert!((stability_score(50.0) - 0.0).abs() < 1e-12);
        assert_eq!(stability_score(50.01), 0.0);
    }

    #[test]
    fn accuracy_band_edges() {
        assert_eq!(accuracy_score(4.99), 1.0);
        assert!((accuracy_score(5.0) - 1.0).abs() < 1e-12);
        assert!((accuracy_score(15.0) - 0.5).abs() < 1e-12);
        assert_eq!(accuracy_score(25.01), 0.0);
    }

    #[test]
    fn sufficiency_band_edges() {
        assert_eq!(sufficiency_score(30), 1.0);
        assert_eq!(sufficiency_score(45), 1.0);
        assert!((sufficiency_score(14) - 0.7).abs() < 1e-12);
        assert!((sufficiency_score(22) - 0.85).abs() < 1e-12);
        assert_eq!(sufficiency_score(13), 0.5);
        assert_eq!(sufficiency_score(0), 0.5);
    }

    #[test]
    fn decay_is_monotonic_and_floored() {
        let base = 0.9;
        let series: Vec<f64> = (1..=7).map(|d| decayed(base, d)).collect();
        for pair in series.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert!((series[0] - 0.9 * 0.97).abs() < 1e-12);

        // The floor holds even for weak bases on far days
        assert_eq!(decayed(0.31, 7), CONFIDENCE_FLOOR);
        assert!(decayed(0.05, 1) >= CONFIDENCE_FLOOR);
    }
}
