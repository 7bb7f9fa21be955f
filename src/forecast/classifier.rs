//! Rule-based anomaly classification for generated forecast days.
//!
//! Stateless first-match rule table. Evaluation order is part of the
//! contract: an extreme move is an anomaly no matter how confident the
//! model is. Manual overrides never pass through here.

use crate::models::ForecastStatus;

pub const EXTREME_MOVE_PCT: f64 = 40.0;
pub const LARGE_MOVE_PCT: f64 = 30.0;
pub const LOW_CONFIDENCE: f64 = 0.40;
pub const CRITICAL_CONFIDENCE: f64 = 0.20;
pub const VOLATILE_CV_PCT: f64 = 60.0;
pub const FAR_HORIZON_DAY: u32 = 5;
pub const POOR_BACKTEST_MAPE_PCT: f64 = 30.0;

/// Per-day inputs to the rule table.
#[derive(Debug, Clone, Copy)]
pub struct DayAssessment {
    /// Percent change of the predicted price against the latest actual
    /// observation (never against a previous forecasted day).
    pub change_percent: f64,
    /// Decayed confidence for this day.
    pub confidence: f64,
    pub cv_percent: f64,
    pub mape: f64,
    /// 1-based offset into the forecast horizon.
    pub day: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: ForecastStatus,
    /// Which rule fired, for logs; `None` for a normal day.
    pub rule: Option<&'static str>,
}

impl Verdict {
    fn anomaly(rule: &'static str) -> Self {
        Self {
            status: ForecastStatus::Anomaly,
            rule: Some(rule),
        }
    }

    fn normal() -> Self {
        Self {
            status: ForecastStatus::Normal,
            rule: None,
        }
    }
}

/// First matching rule wins.
pub fn classify(a: &DayAssessment) -> Verdict {
    let magnitude = a.change_percent.abs();

    if magnitude > EXTREME_MOVE_PCT {
        return Verdict::anomaly("extreme_move");
    }
    if magnitude > LARGE_MOVE_PCT && a.confidence < LOW_CONFIDENCE {
        return Verdict::anomaly("large_uncertain_move");
    }
    if a.confidence < CRITICAL_CONFIDENCE {
        return Verdict::anomaly("critical_confidence");
    }
    if a.cv_percent > VOLATILE_CV_PCT {
        return Verdict::anomaly("volatile_series");
    }
    if a.day >= FAR_HORIZON_DAY && a.confidence < LOW_CONFIDENCE {
        return Verdict::anomaly("far_horizon_low_confidence");
    }
    if a.mape > POOR_BACKTEST_MAPE_PCT {
        return Verdict::anomaly("poor_backtest");
    }

    Verdict::normal()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_day() -> DayAssessment {
        DayAssessment {
            change_percent: 2.0,
            confidence: 0.8,
            cv_percent: 12.0,
            mape: 6.0,
            day: 1,
        }
    }

    #[test]
    fn calm_day_is_normal() {
        let verdict = classify(&calm_day());
        assert_eq!(verdict.status, ForecastStatus::Normal);
        assert!(verdict.rule.is_none());
    }

    #[test]
    fn extreme_move_fires_regardless_of_confidence() {
        // High confidence does not save a +45% jump.
        let a = DayAssessment {
            change_percent: 45.0,
            confidence: 0.9,
            ..calm_day()
        };
        let verdict = classify(&a);
        assert_eq!(verdict.status, ForecastStatus::Anomaly);
        assert_eq!(verdict.rule, Some("extreme_move"));

        let down = DayAssessment {
            change_percent: -41.0,
            ..a
        };
        assert_eq!(classify(&down).rule, Some("extreme_move"));
    }

    #[test]
    fn extreme_move_outranks_later_rules() {
        // Confidence is below the critical threshold too, but rule order
        // attributes the anomaly to the move.
        let a = DayAssessment {
            change_percent: 45.0,
            confidence: 0.15,
            ..calm_day()
        };
        assert_eq!(classify(&a).rule, Some("extreme_move"));
    }

    #[test]
    fn large_move_needs_low_confidence() {
        let uncertain = DayAssessment {
            change_percent: 35.0,
            confidence: 0.35,
            ..calm_day()
        };
        assert_eq!(classify(&uncertain).rule, Some("large_uncertain_move"));

        let confident = DayAssessment {
            change_percent: 35.0,
            confidence: 0.75,
            ..calm_day()
        };
        assert_eq!(classify(&confident).status, ForecastStatus::Normal);
    }

    #[test]
    fn critical_confidence_alone_is_anomalous() {
        let a = DayAssessment {
            confidence: 0.19,
            ..calm_day()
        };
        assert_eq!(classify(&a).rule, Some("critical_confidence"));
    }

    #[test]
    fn volatile_source_data_is_anomalous() {
        let a = DayAssessment {
            cv_percent: 61.0,
            ..calm_day()
        };
        assert_eq!(classify(&a).rule, Some("volatile_series"));
    }

    #[test]
    fn far_horizon_requires_day_five() {
        let far = DayAssessment {
            day: 5,
            confidence: 0.39,
            ..calm_day()
        };
        assert_eq!(classify(&far).rule, Some("far_horizon_low_confidence"));

        let near = DayAssessment {
            day: 4,
            confidence: 0.39,
            ..calm_day()
        };
        assert_eq!(classify(&near).status, ForecastStatus::Normal);
    }

    #[test]
    fn poor_backtest_is_anomalous() {
        let a = DayAssessment {
            mape: 30.5,
            ..calm_day()
        };
        assert_eq!(classify(&a).rule, Some("poor_backtest"));
    }

    #[test]
    fn boundary_values_stay_normal() {
        // Rules use strict inequalities.
        let a = DayAssessment {
            change_percent: 40.0,
            confidence: 0.40,
            cv_percent: 60.0,
            mape: 30.0,
            day: 5,
        };
        assert_eq!(classify(&a).status, ForecastStatus::Normal);
    }
}
