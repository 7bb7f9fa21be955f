use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one forecast row.
///
/// `Overridden` pins the row: automated generation must leave it untouched
/// unless the caller explicitly forces regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastStatus {
    Normal,
    Anomaly,
    Overridden,
}

impl ForecastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastStatus::Normal => "NORMAL",
            ForecastStatus::Anomaly => "ANOMALY",
            ForecastStatus::Overridden => "OVERRIDDEN",
        }
    }

    /// Inverse of `as_str`, used when mapping storage rows.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(ForecastStatus::Normal),
            "ANOMALY" => Some(ForecastStatus::Anomaly),
            "OVERRIDDEN" => Some(ForecastStatus::Overridden),
            _ => None,
        }
    }
}

impl fmt::Display for ForecastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (product, market) combination tracked independently for forecasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub product_id: i64,
    pub market_id: i64,
}

impl PairKey {
    pub fn new(product_id: i64, market_id: i64) -> Self {
        Self {
            product_id,
            market_id,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product {} @ market {}", self.product_id, self.market_id)
    }
}

/// One observed daily price for a pair. Read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub product_id: i64,
    pub market_id: i64,
    pub price: f64,
    pub observed_date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

/// A persisted forecast row, unique per (product, market, target date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub id: Option<i64>,
    pub product_id: i64,
    pub market_id: i64,
    pub target_date: NaiveDate,
    pub predicted_price: f64,
    /// Composite confidence in [0,1]; 1.0 for manual overrides.
    pub confidence: f64,
    pub status: ForecastStatus,
    /// Price that was in effect before the first override, if any.
    pub override_price: Option<f64>,
    pub override_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Forecast {
    pub fn new(
        pair: PairKey,
        target_date: NaiveDate,
        predicted_price: f64,
        confidence: f64,
        status: ForecastStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            product_id: pair.product_id,
            market_id: pair.market_id,
            target_date,
            predicted_price,
            confidence,
            status,
            override_price: None,
            override_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(self.product_id, self.market_id)
    }

    pub fn is_pinned(&self) -> bool {
        self.status == ForecastStatus::Overridden
    }
}

/// Catalog entry for a tracked commodity. Managed by collaborators; this
/// engine only reads names for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
}

/// Catalog entry for a physical market location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
}
