//! Price window shaping rules.
//!
//! The store returns raw rows; this module owns the window contract: newest
//! first, at most one observation per calendar date, latest recorded wins.

use std::collections::HashSet;

use crate::models::PriceObservation;

/// Most recent observations fed into one regression.
pub const HISTORY_WINDOW: usize = 30;

/// Below this many deduplicated points a pair is skipped outright.
pub const MIN_HISTORY_POINTS: usize = 14;

/// Collapse duplicate observation dates, keeping the first row seen per
/// date. Input must already be ordered newest-first with the latest
/// recorded row first within a date; output preserves that order.
pub fn dedupe_newest_first(observations: Vec<PriceObservation>) -> Vec<PriceObservation> {
    let mut seen = HashSet::with_capacity(observations.len());
    observations
        .into_iter()
        .filter(|obs| seen.insert(obs.observed_date))
        .collect()
}

/// Re-orient a newest-first window into the oldest-first price series the
/// regression engine expects (x = 0 is the oldest point).
pub fn oldest_first_prices(window: &[PriceObservation]) -> Vec<f64> {
    window.iter().rev().map(|obs| obs.price).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, TimeZone, Utc};

    fn obs(day: u32, price: f64, recorded_hour: u32) -> PriceObservation {
        PriceObservation {
            product_id: 1,
            market_id: 1,
            price,
            observed_date: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            recorded_at: Utc.with_ymd_and_hms(2026, 8, day, recorded_hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn keeps_latest_recorded_per_date() {
        // Newest-first, with two rows for the 20th; the later recording
        // sorts first and must win.
        let raw = vec![obs(21, 105.0, 9), obs(20, 104.0, 15), obs(20, 99.0, 9), obs(19, 101.0, 9)];
        let deduped = dedupe_newest_first(raw);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[1].price, 104.0);
        assert_eq!(
            deduped.iter().map(|o| o.observed_date.day()).collect::<Vec<_>>(),
            vec![21, 20, 19]
        );
    }

    #[test]
    fn passes_clean_windows_through() {
        let raw = vec![obs(22, 103.0, 9), obs(21, 102.0, 9), obs(20, 101.0, 9)];
        let deduped = dedupe_newest_first(raw.clone());
        assert_eq!(deduped.len(), raw.len());
    }

    #[test]
    fn reorients_for_regression() {
        let raw = vec![obs(22, 103.0, 9), obs(21, 102.0, 9), obs(20, 101.0, 9)];
        assert_eq!(oldest_first_prices(&raw), vec![101.0, 102.0, 103.0]);
    }
}
