//! Manual override subsystem.
//!
//! Operators pin forecast rows to a chosen price, either pair by pair or in
//! bulk. Pinned rows carry status OVERRIDDEN and confidence 1.0 and are
//! untouchable by automated generation until a forced regeneration releases
//! them. Overrides bypass the classifier entirely: a pinned row is never
//! ANOMALY, whatever the price move.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ForecastError, Result};
use crate::forecast::store::ForecastStore;
use crate::models::{ForecastStatus, PairKey};

/// Parsed form of the `force_trend` request field.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Signed percent applied to the current price, e.g. "+10% Increase".
    Percent(f64),
    /// Pin the price exactly where it stands today.
    Stabilize,
    /// Explicit no-op: leave the pair untouched and report success.
    NoOverride,
    /// Anything else; applied as an unchanged-price pin with a warning.
    Unknown(String),
}

/// Accepts the operator-facing directive strings: a signed percentage with
/// optional trailing label ("+10% Increase", "-20% Decrease") or the
/// keywords STABILIZE / NO_OVERRIDE in any case.
pub fn parse_directive(raw: &str) -> Directive {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("STABILIZE") {
        return Directive::Stabilize;
    }
    if trimmed.eq_ignore_ascii_case("NO_OVERRIDE") {
        return Directive::NoOverride;
    }
    if let Some(prefix) = trimmed.split('%').next() {
        if prefix.len() < trimmed.len() {
            if let Ok(pct) = prefix.trim().parse::<f64>() {
                return Directive::Percent(pct);
            }
        }
    }
    Directive::Unknown(trimmed.to_string())
}

/// Override request. Targets may be given three ways and are unioned:
/// a single pair, a cross-product of id lists, or explicit pairs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideRequest {
    pub product_id: Option<i64>,
    pub market_id: Option<i64>,
    pub product_ids: Option<Vec<i64>>,
    pub market_ids: Option<Vec<i64>>,
    pub pairs: Option<Vec<PairKey>>,
    /// Defaults to the day after `as_of` when absent.
    pub target_date: Option<NaiveDate>,
    /// Trend directive; ignored when `manual_price` is set.
    pub force_trend: Option<String>,
    /// Literal price, takes precedence over `force_trend`.
    pub manual_price: Option<f64>,
    pub reason: Option<String>,
}

impl OverrideRequest {
    /// Union of all target forms, first occurrence wins for duplicates.
    fn target_pairs(&self) -> Vec<PairKey> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |pair: PairKey| {
            if seen.insert(pair) {
                out.push(pair);
            }
        };

        if let (Some(product_id), Some(market_id)) = (self.product_id, self.market_id) {
            push(PairKey::new(product_id, market_id));
        }
        if let (Some(products), Some(markets)) = (&self.product_ids, &self.market_ids) {
            for &product_id in products {
                for &market_id in markets {
                    push(PairKey::new(product_id, market_id));
                }
            }
        }
        if let Some(pairs) = &self.pairs {
            for &pair in pairs {
                push(pair);
            }
        }
        out
    }
}

/// Outcome for one targeted pair.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideOutcome {
    pub product_id: i64,
    pub product_name: Option<String>,
    pub market_id: i64,
    pub market_name: Option<String>,
    pub success: bool,
    pub message: String,
    pub old_price: Option<f64>,
    pub new_price: Option<f64>,
    pub status: Option<ForecastStatus>,
}

/// Aggregate response; `success` is true only when no pair failed.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideReport {
    pub success: bool,
    pub message: String,
    pub total_processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<OverrideOutcome>,
}

/// Apply one override request against every targeted pair.
///
/// Request-shape problems (no targets, no price or directive, blank reason)
/// fail the whole call; everything past that point is isolated per pair,
/// with each pair's outcome reported individually.
pub fn apply_bulk_override(
    store: &ForecastStore,
    request: &OverrideRequest,
    as_of: NaiveDate,
) -> Result<OverrideReport> {
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ForecastError::InvalidTarget("override reason is required".into()))?;

    if request.manual_price.is_none() && request.force_trend.is_none() {
        return Err(ForecastError::InvalidTarget(
            "either manual_price or force_trend is required".into(),
        ));
    }

    let targets = request.target_pairs();
    if targets.is_empty() {
        return Err(ForecastError::InvalidTarget(
            "no target pairs in override request".into(),
        ));
    }

    let target_date = request
        .target_date
        .unwrap_or_else(|| as_of + Duration::days(1));

    // One catalog round-trip for the whole request, not one per pair
    let product_ids: Vec<i64> = dedup_ids(targets.iter().map(|p| p.product_id));
    let market_ids: Vec<i64> = dedup_ids(targets.iter().map(|p| p.market_id));
    let products = store.products_by_ids(&product_ids)?;
    let markets = store.markets_by_ids(&market_ids)?;

    let directive = request.force_trend.as_deref().map(parse_directive);

    let mut results = Vec::with_capacity(targets.len());
    let mut success_count = 0usize;
    let mut failed_count = 0usize;

    for pair in targets {
        let product_name = products.get(&pair.product_id).map(|p| p.name.clone());
        let market_name = markets.get(&pair.market_id).map(|m| m.name.clone());

        let mut outcome = OverrideOutcome {
            product_id: pair.product_id,
            product_name,
            market_id: pair.market_id,
            market_name,
            success: false,
            message: String::new(),
            old_price: None,
            new_price: None,
            status: None,
        };

        if outcome.product_name.is_none() || outcome.market_name.is_none() {
            outcome.message = format!("unknown {pair}");
            warn!("Override target rejected: {}", outcome.message);
            failed_count += 1;
            results.push(outcome);
            continue;
        }

        match apply_one(store, pair, target_date, request, &directive, reason) {
            Ok(applied) => {
                outcome.success = true;
                outcome.message = applied.message;
                outcome.old_price = applied.old_price;
                outcome.new_price = applied.new_price;
                outcome.status = applied.status;
                success_count += 1;
            }
            Err(err) => {
                outcome.message = err.to_string();
                warn!("Override failed for {}: {}", pair, err);
                failed_count += 1;
            }
        }
        results.push(outcome);
    }

    let total_processed = results.len();
    info!(
        "✅ Override applied to {}/{} pairs for {} (reason: {})",
        success_count, total_processed, target_date, reason
    );

    Ok(OverrideReport {
        success: failed_count == 0,
        message: format!("{success_count} of {total_processed} overrides applied"),
        total_processed,
        success_count,
        failed_count,
        results,
    })
}

struct Applied {
    message: String,
    old_price: Option<f64>,
    new_price: Option<f64>,
    status: Option<ForecastStatus>,
}

fn apply_one(
    store: &ForecastStore,
    pair: PairKey,
    target_date: NaiveDate,
    request: &OverrideRequest,
    directive: &Option<Directive>,
    reason: &str,
) -> Result<Applied> {
    let latest_actual = store.latest_price(pair)?.map(|obs| obs.price);

    // Price in effect for this key right now: the stored forecast if one
    // exists, otherwise the latest actual observation.
    let current = match store.find_forecast(pair, target_date)? {
        Some(row) => Some(row.predicted_price),
        None => latest_actual,
    };

    let (new_price, note) = if let Some(price) = request.manual_price {
        (price, "manual price applied".to_string())
    } else {
        match directive {
            Some(Directive::Percent(pct)) => {
                let base = current.ok_or_else(|| {
                    ForecastError::InvalidTarget(format!("no current price for {pair}"))
                })?;
                (base * (1.0 + pct / 100.0), format!("{pct:+.0}% applied"))
            }
            Some(Directive::Stabilize) => {
                let base = current.ok_or_else(|| {
                    ForecastError::InvalidTarget(format!("no current price for {pair}"))
                })?;
                (base, "price stabilized".to_string())
            }
            Some(Directive::NoOverride) => {
                return Ok(Applied {
                    message: "no override requested, pair left unchanged".to_string(),
                    old_price: current,
                    new_price: current,
                    status: None,
                });
            }
            Some(Directive::Unknown(raw)) => {
                let base = current.ok_or_else(|| {
                    ForecastError::InvalidTarget(format!("no current price for {pair}"))
                })?;
                warn!("Unrecognized directive '{}', price left unchanged", raw);
                (base, format!("directive '{raw}' not recognized, price unchanged"))
            }
            None => unreachable!("validated before dispatch"),
        }
    };

    let new_price = new_price.max(0.0);
    let (row, old_price) =
        store.apply_override_row(pair, target_date, new_price, reason, latest_actual)?;

    Ok(Applied {
        message: note,
        old_price,
        new_price: Some(row.predicted_price),
        status: Some(row.status),
    })
}

fn dedup_ids(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Forecast, Market, PriceObservation, Product};
    use chrono::{TimeZone, Utc};

    fn store_with_catalog() -> ForecastStore {
        let store = ForecastStore::open(":memory:").unwrap();
        for id in 1..=3 {
            store
                .put_product(&Product {
                    id,
                    name: format!("Product {id}"),
                    category: None,
                })
                .unwrap();
            store
                .put_market(&Market {
                    id,
                    name: format!("Market {id}"),
                    region: None,
                })
                .unwrap();
        }
        store
    }

    fn record_price(store: &ForecastStore, pair: PairKey, price: f64) {
        store
            .record_observation(&PriceObservation {
                product_id: pair.product_id,
                market_id: pair.market_id,
                price,
                observed_date: NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
                recorded_at: Utc.with_ymd_and_hms(2026, 8, 20, 9, 0, 0).unwrap(),
            })
            .unwrap();
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()
    }

    #[test]
    fn directive_grammar() {
        assert_eq!(parse_directive("+10% Increase"), Directive::Percent(10.0));
        assert_eq!(parse_directive("-20% Decrease"), Directive::Percent(-20.0));
        assert_eq!(parse_directive("+200% Increase"), Directive::Percent(200.0));
        assert_eq!(parse_directive("  stabilize  "), Directive::Stabilize);
        assert_eq!(parse_directive("no_override"), Directive::NoOverride);
        assert_eq!(
            parse_directive("Hold Steady"),
            Directive::Unknown("Hold Steady".to_string())
        );
        // A stray percent sign with no number is not a percent directive
        assert_eq!(
            parse_directive("%"),
            Directive::Unknown("%".to_string())
        );
    }

    #[test]
    fn manual_price_pins_the_row() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        record_price(&store, pair, 100.0);

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            manual_price: Some(150.0),
            reason: Some("flood damage".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        assert!(report.success);
        assert_eq!(report.success_count, 1);

        let row = store
            .find_forecast(pair, as_of() + Duration::days(1))
            .unwrap()
            .unwrap();
        assert_eq!(row.predicted_price, 150.0);
        assert_eq!(row.confidence, 1.0);
        assert_eq!(row.status, ForecastStatus::Overridden);
        assert_eq!(row.override_reason.as_deref(), Some("flood damage"));
        assert_eq!(row.override_price, Some(100.0));
    }

    #[test]
    fn percent_applies_to_the_existing_forecast_price() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        let date = as_of() + Duration::days(1);
        store
            .upsert_forecast(
                &Forecast::new(pair, date, 100.0, 0.8, ForecastStatus::Normal),
                false,
            )
            .unwrap();

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            force_trend: Some("+10% Increase".into()),
            reason: Some("festival demand".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        let result = &report.results[0];
        assert!(result.success);
        assert_eq!(result.old_price, Some(100.0));
        assert_eq!(result.new_price, Some(110.0));
        assert_eq!(result.status, Some(ForecastStatus::Overridden));
    }

    #[test]
    fn tripling_directive_resolves_against_latest_actual_without_a_row() {
        let store = store_with_catalog();
        let pair = PairKey::new(2, 2);
        record_price(&store, pair, 80.0);

        let request = OverrideRequest {
            product_id: Some(2),
            market_id: Some(2),
            force_trend: Some("+200% Increase".into()),
            reason: Some("speculative surge".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        let result = &report.results[0];
        assert_eq!(result.old_price, Some(80.0));
        assert_eq!(result.new_price, Some(240.0));
        // Overrides bypass classification entirely
        assert_eq!(result.status, Some(ForecastStatus::Overridden));
    }

    #[test]
    fn stabilize_pins_at_the_current_price() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 2);
        record_price(&store, pair, 64.0);

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(2),
            force_trend: Some("STABILIZE".into()),
            reason: Some("market closed this week".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        let result = &report.results[0];
        assert_eq!(result.new_price, Some(64.0));
        assert_eq!(result.status, Some(ForecastStatus::Overridden));
    }

    #[test]
    fn no_override_touches_nothing_and_still_succeeds() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        record_price(&store, pair, 100.0);

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            force_trend: Some("NO_OVERRIDE".into()),
            reason: Some("reviewed, leaving as is".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        assert!(report.success);
        assert!(report.results[0].status.is_none());
        assert!(store
            .find_forecast(pair, as_of() + Duration::days(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_directive_pins_with_unchanged_price() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        record_price(&store, pair, 90.0);

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            force_trend: Some("Hold Steady".into()),
            reason: Some("typo in directive".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        let result = &report.results[0];
        assert!(result.success);
        assert_eq!(result.new_price, Some(90.0));
        assert_eq!(result.status, Some(ForecastStatus::Overridden));
        assert!(result.message.contains("not recognized"));
    }

    #[test]
    fn cross_product_targets_with_one_bad_id_isolate_the_failure() {
        let store = store_with_catalog();
        for product_id in [1, 2] {
            for market_id in [1, 2] {
                record_price(&store, PairKey::new(product_id, market_id), 50.0);
            }
        }

        let request = OverrideRequest {
            product_ids: Some(vec![1, 2, 99]),
            market_ids: Some(vec![1, 2]),
            manual_price: Some(75.0),
            reason: Some("region-wide adjustment".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        assert_eq!(report.total_processed, 6);
        assert_eq!(report.success_count, 4);
        assert_eq!(report.failed_count, 2);
        assert!(!report.success);

        let failed: Vec<_> = report.results.iter().filter(|r| !r.success).collect();
        assert!(failed.iter().all(|r| r.product_id == 99));
    }

    #[test]
    fn manual_price_wins_over_directive() {
        let store = store_with_catalog();
        let pair = PairKey::new(3, 3);
        record_price(&store, pair, 100.0);

        let request = OverrideRequest {
            product_id: Some(3),
            market_id: Some(3),
            force_trend: Some("+10% Increase".into()),
            manual_price: Some(42.0),
            reason: Some("direct entry".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        assert_eq!(report.results[0].new_price, Some(42.0));
    }

    #[test]
    fn negative_manual_price_clamps_to_zero() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        record_price(&store, pair, 10.0);

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            manual_price: Some(-5.0),
            reason: Some("bad input".into()),
            ..Default::default()
        };

        let report = apply_bulk_override(&store, &request, as_of()).unwrap();
        assert_eq!(report.results[0].new_price, Some(0.0));
    }

    #[test]
    fn request_without_reason_is_rejected() {
        let store = store_with_catalog();
        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            manual_price: Some(10.0),
            reason: Some("   ".into()),
            ..Default::default()
        };

        let err = apply_bulk_override(&store, &request, as_of()).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidTarget(_)));
    }

    #[test]
    fn request_without_price_or_directive_is_rejected() {
        let store = store_with_catalog();
        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            reason: Some("nothing to do".into()),
            ..Default::default()
        };

        let err = apply_bulk_override(&store, &request, as_of()).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidTarget(_)));
    }

    #[test]
    fn explicit_target_date_is_honored() {
        let store = store_with_catalog();
        let pair = PairKey::new(1, 1);
        record_price(&store, pair, 100.0);
        let date = NaiveDate::from_ymd_opt(2026, 9, 15).unwrap();

        let request = OverrideRequest {
            product_id: Some(1),
            market_id: Some(1),
            target_date: Some(date),
            manual_price: Some(111.0),
            reason: Some("advance booking".into()),
            ..Default::default()
        };

        apply_bulk_override(&store, &request, as_of()).unwrap();
        assert!(store.find_forecast(pair, date).unwrap().is_some());
    }
}
