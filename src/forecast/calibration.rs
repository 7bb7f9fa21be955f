//! Read views over the forecast rows: the per-market calibration table and
//! the dashboard stat cards. Pure queries, no writes.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{ForecastError, Result};
use crate::forecast::store::ForecastStore;

/// Page sizes are capped so one request cannot drag the whole catalog over
/// the wire.
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Confidence bands shown alongside the numeric score.
pub fn confidence_level(score: f64) -> &'static str {
    let percent = score * 100.0;
    if percent >= 70.0 {
        "HIGH"
    } else if percent >= 50.0 {
        "MEDIUM"
    } else if percent >= 30.0 {
        "LOW"
    } else {
        "VERY_LOW"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    ProductName,
    CurrentPrice,
    ForecastPrice,
    Trend,
    Confidence,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "product_name" => Some(SortKey::ProductName),
            "current_price" => Some(SortKey::CurrentPrice),
            "forecast_price" => Some(SortKey::ForecastPrice),
            "trend" => Some(SortKey::Trend),
            "confidence" => Some(SortKey::Confidence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationQuery {
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
    pub sort_by: SortKey,
    pub sort_direction: SortDirection,
}

impl Default for CalibrationQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_by: SortKey::ProductName,
            sort_direction: SortDirection::Asc,
        }
    }
}

/// One product's calibration line for a market: where the price stands,
/// where tomorrow's forecast puts it, and how much to trust that.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationRow {
    pub product_id: i64,
    pub product_name: String,
    pub market_id: i64,
    pub market_name: String,
    pub current_price: f64,
    pub forecast_price: f64,
    pub trend_percentage: f64,
    pub confidence_score: f64,
    pub confidence_level: &'static str,
    /// NORMAL / ANOMALY / OVERRIDDEN, or PENDING when no forecast exists yet.
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationPage {
    pub market_id: i64,
    pub market_name: String,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub rows: Vec<CalibrationRow>,
}

/// Build the calibration table for one market as of `as_of`; forecasts are
/// read for the following day. Every ACTIVE product appears, with zeros and
/// PENDING filling the gaps for products this market has no data on.
pub fn calibration_table(
    store: &ForecastStore,
    market_id: i64,
    query: &CalibrationQuery,
    as_of: NaiveDate,
) -> Result<CalibrationPage> {
    let market = store
        .get_market(market_id)?
        .ok_or_else(|| ForecastError::InvalidTarget(format!("market {market_id} not found")))?;

    let products = store.active_products()?;
    let current_prices = store.latest_prices_for_market(market_id)?;
    let tomorrow = as_of + Duration::days(1);
    let forecasts = store.forecasts_for_market_date(market_id, tomorrow)?;

    let mut rows: Vec<CalibrationRow> = products
        .into_iter()
        .map(|product| {
            let current_price = current_prices.get(&product.id).copied().unwrap_or(0.0);
            let forecast = forecasts.get(&product.id);
            let forecast_price = forecast.map(|f| f.predicted_price).unwrap_or(0.0);
            let confidence_score = forecast.map(|f| f.confidence).unwrap_or(0.0);
            let status = forecast
                .map(|f| f.status.to_string())
                .unwrap_or_else(|| "PENDING".to_string());
            let trend_percentage = if current_price > 0.0 {
                (forecast_price - current_price) / current_price * 100.0
            } else {
                0.0
            };

            CalibrationRow {
                product_id: product.id,
                product_name: product.name,
                market_id,
                market_name: market.name.clone(),
                current_price,
                forecast_price,
                trend_percentage,
                confidence_score,
                confidence_level: confidence_level(confidence_score),
                status,
            }
        })
        .collect();

    sort_rows(&mut rows, query.sort_by, query.sort_direction);

    let size = query.size.clamp(1, MAX_PAGE_SIZE);
    let total_items = rows.len();
    let total_pages = total_items.div_ceil(size);
    let start = query.page.saturating_mul(size).min(total_items);
    let end = (start + size).min(total_items);
    let rows = rows[start..end].to_vec();

    Ok(CalibrationPage {
        market_id,
        market_name: market.name,
        page: query.page,
        size,
        total_items,
        total_pages,
        rows,
    })
}

fn sort_rows(rows: &mut [CalibrationRow], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::ProductName => a.product_name.cmp(&b.product_name),
            SortKey::CurrentPrice => a.current_price.total_cmp(&b.current_price),
            SortKey::ForecastPrice => a.forecast_price.total_cmp(&b.forecast_price),
            SortKey::Trend => a.trend_percentage.total_cmp(&b.trend_percentage),
            SortKey::Confidence => a.confidence_score.total_cmp(&b.confidence_score),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Stat-card numbers for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_products: i64,
    pub active_markets: i64,
    /// Mean confidence over the live horizon, as a percentage.
    pub model_accuracy: Option<f64>,
    /// ANOMALY days in the live horizon.
    pub anomalies: i64,
    pub total_predictions: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub fn dashboard_stats(store: &ForecastStore, as_of: NaiveDate) -> Result<DashboardStats> {
    let totals = store.stats()?;
    Ok(DashboardStats {
        total_products: store.count_active_products()?,
        active_markets: store.count_active_markets()?,
        model_accuracy: store
            .average_confidence_after(as_of)?
            .map(|avg| avg * 100.0),
        anomalies: store.anomaly_count_after(as_of)?,
        total_predictions: totals.forecast_rows,
        last_updated: store.last_forecast_update()?,
    })
}
