//! SQLite-backed forecast store.
//!
//! Owns the forecast rows and serves the read views; price history and the
//! product/market catalogs live in the same database but are written by
//! collaborators (and by the seed tooling).
//!
//! Write semantics worth knowing:
//! - Forecast upserts are single atomic statements; the OVERRIDDEN pin guard
//!   is part of the `ON CONFLICT` clause, so the automated path can never
//!   race an override into oblivion.
//! - Batched writes run one `IMMEDIATE` transaction per pair's horizon set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex; // Faster than std::sync::Mutex
use rusqlite::{
    params, params_from_iter, Connection, OpenFlags, OptionalExtension, TransactionBehavior,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Forecast, ForecastStatus, Market, PairKey, PriceObservation, Product};

const SCHEMA_SQL: &str = r#"
-- WAL keeps readers unblocked while chunk workers commit
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -16000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    status TEXT NOT NULL DEFAULT 'ACTIVE'
);

CREATE TABLE IF NOT EXISTS markets (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    region TEXT,
    status TEXT NOT NULL DEFAULT 'ACTIVE'
);

CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    market_id INTEGER NOT NULL,
    price REAL NOT NULL,
    observed_date TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_history_pair_date
    ON price_history(product_id, market_id, observed_date DESC);

CREATE INDEX IF NOT EXISTS idx_price_history_market_date
    ON price_history(market_id, observed_date DESC);

CREATE TABLE IF NOT EXISTS forecasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    market_id INTEGER NOT NULL,
    target_date TEXT NOT NULL,
    predicted_price REAL NOT NULL,
    confidence REAL NOT NULL,
    status TEXT NOT NULL,
    override_price REAL,
    override_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(product_id, market_id, target_date)
);

CREATE INDEX IF NOT EXISTS idx_forecasts_pair_date
    ON forecasts(product_id, market_id, target_date DESC);

CREATE INDEX IF NOT EXISTS idx_forecasts_status_date
    ON forecasts(status, target_date);
"#;

/// Storage totals for the status/dashboard views.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub products: i64,
    pub markets: i64,
    pub price_observations: i64,
    pub forecast_rows: i64,
}

#[derive(Clone)]
pub struct ForecastStore {
    conn: Arc<Mutex<Connection>>,
}

impl ForecastStore {
    /// Open (or create) the database at `path`; `":memory:"` works for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(SCHEMA_SQL)?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if path != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let forecast_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM forecasts", [], |row| row.get(0))
            .unwrap_or(0);
        info!(
            "📊 Forecast store ready at {} ({} existing forecast rows)",
            path, forecast_rows
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ===== Catalog =====

    pub fn put_product(&self, product: &Product) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO products (id, name, category, status) VALUES (?1, ?2, ?3, 'ACTIVE')
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, category = excluded.category",
            params![product.id, product.name, product.category],
        )?;
        Ok(())
    }

    pub fn put_market(&self, market: &Market) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO markets (id, name, region, status) VALUES (?1, ?2, ?3, 'ACTIVE')
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, region = excluded.region",
            params![market.id, market.name, market.region],
        )?;
        Ok(())
    }

    pub fn set_product_status(&self, product_id: i64, status: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE products SET status = ?2 WHERE id = ?1",
            params![product_id, status],
        )?;
        Ok(())
    }

    pub fn set_market_status(&self, market_id: i64, status: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE markets SET status = ?2 WHERE id = ?1",
            params![market_id, status],
        )?;
        Ok(())
    }

    /// ACTIVE products in name order, the backbone of the calibration view.
    pub fn active_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, category FROM products WHERE status = 'ACTIVE' ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_product)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        let product = conn
            .query_row(
                "SELECT id, name, category FROM products WHERE id = ?1",
                params![product_id],
                row_to_product,
            )
            .optional()?;
        Ok(product)
    }

    pub fn get_market(&self, market_id: i64) -> Result<Option<Market>> {
        let conn = self.conn.lock();
        let market = conn
            .query_row(
                "SELECT id, name, region FROM markets WHERE id = ?1",
                params![market_id],
                row_to_market,
            )
            .optional()?;
        Ok(market)
    }

    /// Batch catalog lookup for bulk operations (one query, not one per pair).
    pub fn products_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Product>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql =
            format!("SELECT id, name, category FROM products WHERE id IN ({placeholders})");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_product)?;

        let mut out = HashMap::with_capacity(ids.len());
        for row in rows {
            let product = row?;
            out.insert(product.id, product);
        }
        Ok(out)
    }

    pub fn markets_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Market>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("SELECT id, name, region FROM markets WHERE id IN ({placeholders})");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_market)?;

        let mut out = HashMap::with_capacity(ids.len());
        for row in rows {
            let market = row?;
            out.insert(market.id, market);
        }
        Ok(out)
    }

    // ===== Price history (written by collaborators and the seed tool) =====

    pub fn record_observation(&self, obs: &PriceObservation) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO price_history (product_id, market_id, price, observed_date, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                obs.product_id,
                obs.market_id,
                obs.price,
                obs.observed_date.to_string(),
                obs.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_observations(&self, observations: &[PriceObservation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO price_history (product_id, market_id, price, observed_date, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for obs in observations {
                stmt.execute(params![
                    obs.product_id,
                    obs.market_id,
                    obs.price,
                    obs.observed_date.to_string(),
                    obs.recorded_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(observations.len())
    }

    /// Newest-first raw window for one pair. Duplicate dates are returned as
    /// stored (latest recorded first within a date); the history module owns
    /// deduplication.
    pub fn recent_prices(&self, pair: PairKey, limit: usize) -> Result<Vec<PriceObservation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT product_id, market_id, price, observed_date, recorded_at
             FROM price_history
             WHERE product_id = ?1 AND market_id = ?2
             ORDER BY observed_date DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![pair.product_id, pair.market_id, limit as i64],
            row_to_observation,
        )?;
        let mut out = Vec::with_capacity(limit);
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent actual price for one pair.
    pub fn latest_price(&self, pair: PairKey) -> Result<Option<PriceObservation>> {
        let conn = self.conn.lock();
        let obs = conn
            .query_row(
                "SELECT product_id, market_id, price, observed_date, recorded_at
                 FROM price_history
                 WHERE product_id = ?1 AND market_id = ?2
                 ORDER BY observed_date DESC, id DESC
                 LIMIT 1",
                params![pair.product_id, pair.market_id],
                row_to_observation,
            )
            .optional()?;
        Ok(obs)
    }

    /// Latest actual price per product in one market, in a single query.
    pub fn latest_prices_for_market(&self, market_id: i64) -> Result<HashMap<i64, f64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT p.product_id, p.price
             FROM price_history p
             WHERE p.market_id = ?1 AND p.id = (
                 SELECT p2.id FROM price_history p2
                 WHERE p2.market_id = ?1 AND p2.product_id = p.product_id
                 ORDER BY p2.observed_date DESC, p2.id DESC
                 LIMIT 1
             )",
        )?;
        let rows = stmt.query_map(params![market_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (product_id, price) = row?;
            out.insert(product_id, price);
        }
        Ok(out)
    }

    /// Every (product, market) pair with any history, restricted to ACTIVE
    /// catalog entries, in a stable order for chunk partitioning.
    pub fn list_active_pairs(&self) -> Result<Vec<PairKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT ph.product_id, ph.market_id
             FROM price_history ph
             JOIN products p ON p.id = ph.product_id AND p.status = 'ACTIVE'
             JOIN markets m ON m.id = ph.market_id AND m.status = 'ACTIVE'
             ORDER BY ph.product_id, ph.market_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PairKey::new(row.get(0)?, row.get(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ===== Forecast rows =====

    pub fn find_forecast(&self, pair: PairKey, target_date: NaiveDate) -> Result<Option<Forecast>> {
        let conn = self.conn.lock();
        let forecast = conn
            .query_row(
                "SELECT id, product_id, market_id, target_date, predicted_price, confidence,
                        status, override_price, override_reason, created_at, updated_at
                 FROM forecasts
                 WHERE product_id = ?1 AND market_id = ?2 AND target_date = ?3",
                params![pair.product_id, pair.market_id, target_date.to_string()],
                row_to_forecast,
            )
            .optional()?;
        Ok(forecast)
    }

    pub fn forecasts_for_pair(&self, pair: PairKey) -> Result<Vec<Forecast>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, product_id, market_id, target_date, predicted_price, confidence,
                    status, override_price, override_reason, created_at, updated_at
             FROM forecasts
             WHERE product_id = ?1 AND market_id = ?2
             ORDER BY target_date ASC",
        )?;
        let rows = stmt.query_map(params![pair.product_id, pair.market_id], row_to_forecast)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Forecasts for one market on one target date, keyed by product.
    pub fn forecasts_for_market_date(
        &self,
        market_id: i64,
        target_date: NaiveDate,
    ) -> Result<HashMap<i64, Forecast>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, product_id, market_id, target_date, predicted_price, confidence,
                    status, override_price, override_reason, created_at, updated_at
             FROM forecasts
             WHERE market_id = ?1 AND target_date = ?2",
        )?;
        let rows = stmt.query_map(params![market_id, target_date.to_string()], row_to_forecast)?;
        let mut out = HashMap::new();
        for row in rows {
            let forecast = row?;
            out.insert(forecast.product_id, forecast);
        }
        Ok(out)
    }

    /// Which of `dates` are pinned OVERRIDDEN for this pair. Generators drop
    /// these from their write set before building rows.
    pub fn overridden_dates(&self, pair: PairKey, dates: &[NaiveDate]) -> Result<Vec<NaiveDate>> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; dates.len()].join(",");
        let sql = format!(
            "SELECT target_date FROM forecasts
             WHERE product_id = ?1 AND market_id = ?2 AND status = 'OVERRIDDEN'
               AND target_date IN ({placeholders})"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;

        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(dates.len() + 2);
        args.push(Box::new(pair.product_id));
        args.push(Box::new(pair.market_id));
        for date in dates {
            args.push(Box::new(date.to_string()));
        }

        let rows = stmt.query_map(
            params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for row in rows {
            let raw = row?;
            if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                out.push(date);
            }
        }
        Ok(out)
    }

    /// Atomic upsert of one automated forecast row.
    ///
    /// Returns `true` when the row was written. Without `force`, a row
    /// pinned OVERRIDDEN is left untouched and `false` comes back; the guard
    /// lives inside the conflict clause so the check-then-write cannot race
    /// a concurrent override. A forced write releases the pin and clears its
    /// metadata.
    pub fn upsert_forecast(&self, forecast: &Forecast, force: bool) -> Result<bool> {
        let conn = self.conn.lock();
        let changes = Self::execute_upsert(&conn, forecast, force)?;
        Ok(changes > 0)
    }

    /// One pair's horizon set in a single IMMEDIATE transaction.
    /// Returns (written, skipped).
    pub fn upsert_pair_batch(&self, rows: &[Forecast], force: bool) -> Result<(usize, usize)> {
        if rows.is_empty() {
            return Ok((0, 0));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut written = 0usize;
        for forecast in rows {
            written += Self::execute_upsert(&tx, forecast, force)?;
        }

        tx.commit()?;

        let skipped = rows.len() - written;
        if skipped > 0 {
            debug!("📦 Batch wrote {} rows, {} pinned rows skipped", written, skipped);
        }
        Ok((written, skipped))
    }

    fn execute_upsert(conn: &Connection, forecast: &Forecast, force: bool) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let sql = if force {
            // Explicit regeneration releases the pin
            "INSERT INTO forecasts
                 (product_id, market_id, target_date, predicted_price, confidence, status,
                  override_price, override_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)
             ON CONFLICT(product_id, market_id, target_date) DO UPDATE SET
                 predicted_price = excluded.predicted_price,
                 confidence = excluded.confidence,
                 status = excluded.status,
                 override_price = NULL,
                 override_reason = NULL,
                 updated_at = excluded.updated_at"
        } else {
            "INSERT INTO forecasts
                 (product_id, market_id, target_date, predicted_price, confidence, status,
                  override_price, override_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)
             ON CONFLICT(product_id, market_id, target_date) DO UPDATE SET
                 predicted_price = excluded.predicted_price,
                 confidence = excluded.confidence,
                 status = excluded.status,
                 updated_at = excluded.updated_at
             WHERE forecasts.status != 'OVERRIDDEN'"
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let changes = stmt.execute(params![
            forecast.product_id,
            forecast.market_id,
            forecast.target_date.to_string(),
            forecast.predicted_price,
            forecast.confidence,
            forecast.status.as_str(),
            now,
        ])?;
        Ok(changes)
    }

    /// Manual override write: load-or-create the row, record the
    /// pre-override price on the first override only, pin with confidence
    /// 1.0. Runs as one IMMEDIATE transaction so the read-modify-write is
    /// atomic against concurrent batch writers.
    ///
    /// `fallback_pre_override` is the price in effect when no forecast row
    /// exists yet (normally the latest actual). Returns the final row plus
    /// the price that was replaced.
    pub fn apply_override_row(
        &self,
        pair: PairKey,
        target_date: NaiveDate,
        new_price: f64,
        reason: &str,
        fallback_pre_override: Option<f64>,
    ) -> Result<(Forecast, Option<f64>)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT id, product_id, market_id, target_date, predicted_price, confidence,
                        status, override_price, override_reason, created_at, updated_at
                 FROM forecasts
                 WHERE product_id = ?1 AND market_id = ?2 AND target_date = ?3",
                params![pair.product_id, pair.market_id, target_date.to_string()],
                row_to_forecast,
            )
            .optional()?;

        let (pre_override, old_price) = match &existing {
            Some(row) if row.status == ForecastStatus::Overridden => {
                // Already pinned: keep the original pre-override price
                (row.override_price, Some(row.predicted_price))
            }
            Some(row) => (Some(row.predicted_price), Some(row.predicted_price)),
            None => (fallback_pre_override, fallback_pre_override),
        };

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO forecasts
                 (product_id, market_id, target_date, predicted_price, confidence, status,
                  override_price, override_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1.0, 'OVERRIDDEN', ?5, ?6, ?7, ?7)
             ON CONFLICT(product_id, market_id, target_date) DO UPDATE SET
                 predicted_price = excluded.predicted_price,
                 confidence = 1.0,
                 status = 'OVERRIDDEN',
                 override_price = excluded.override_price,
                 override_reason = excluded.override_reason,
                 updated_at = excluded.updated_at",
            params![
                pair.product_id,
                pair.market_id,
                target_date.to_string(),
                new_price,
                pre_override,
                reason,
                now,
            ],
        )?;

        let written = tx.query_row(
            "SELECT id, product_id, market_id, target_date, predicted_price, confidence,
                    status, override_price, override_reason, created_at, updated_at
             FROM forecasts
             WHERE product_id = ?1 AND market_id = ?2 AND target_date = ?3",
            params![pair.product_id, pair.market_id, target_date.to_string()],
            row_to_forecast,
        )?;

        tx.commit()?;
        Ok((written, old_price))
    }

    /// Drop forecast rows older than `before`. Pinned rows survive; an
    /// operator's override outlives the horizon it was applied to.
    pub fn purge_stale(&self, before: NaiveDate) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM forecasts WHERE target_date < ?1 AND status != 'OVERRIDDEN'",
            params![before.to_string()],
        )?;
        if deleted > 0 {
            info!("🧹 Purged {} stale forecast rows (cutoff {})", deleted, before);
        }
        Ok(deleted)
    }

    // ===== Aggregates =====

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let products = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
        let markets = conn.query_row("SELECT COUNT(*) FROM markets", [], |r| r.get(0))?;
        let price_observations =
            conn.query_row("SELECT COUNT(*) FROM price_history", [], |r| r.get(0))?;
        let forecast_rows = conn.query_row("SELECT COUNT(*) FROM forecasts", [], |r| r.get(0))?;
        Ok(StoreStats {
            products,
            markets,
            price_observations,
            forecast_rows,
        })
    }

    /// ANOMALY rows in the live horizon (strictly after `date`).
    pub fn anomaly_count_after(&self, date: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM forecasts WHERE status = 'ANOMALY' AND target_date > ?1",
            params![date.to_string()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn average_confidence_after(&self, date: NaiveDate) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        let avg = conn.query_row(
            "SELECT AVG(confidence) FROM forecasts WHERE target_date > ?1",
            params![date.to_string()],
            |r| r.get::<_, Option<f64>>(0),
        )?;
        Ok(avg)
    }

    pub fn count_active_products(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM products WHERE status = 'ACTIVE'",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn count_active_markets(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM markets WHERE status = 'ACTIVE'",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn last_forecast_update(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn.query_row(
            "SELECT MAX(updated_at) FROM forecasts",
            [],
            |r| r.get(0),
        )?;
        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}

// ===== Row mappers =====

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
    })
}

fn row_to_market(row: &rusqlite::Row<'_>) -> rusqlite::Result<Market> {
    Ok(Market {
        id: row.get(0)?,
        name: row.get(1)?,
        region: row.get(2)?,
    })
}

fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceObservation> {
    Ok(PriceObservation {
        product_id: row.get(0)?,
        market_id: row.get(1)?,
        price: row.get(2)?,
        observed_date: date_col(row, 3)?,
        recorded_at: timestamp_col(row, 4)?,
    })
}

fn row_to_forecast(row: &rusqlite::Row<'_>) -> rusqlite::Result<Forecast> {
    let status_raw: String = row.get(6)?;
    let status = ForecastStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown forecast status '{status_raw}'"),
            )),
        )
    })?;

    Ok(Forecast {
        id: Some(row.get(0)?),
        product_id: row.get(1)?,
        market_id: row.get(2)?,
        target_date: date_col(row, 3)?,
        predicted_price: row.get(4)?,
        confidence: row.get(5)?,
        status,
        override_price: row.get(7)?,
        override_reason: row.get(8)?,
        created_at: timestamp_col(row, 9)?,
        updated_at: timestamp_col(row, 10)?,
    })
}

fn date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl std::fmt::Debug for ForecastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastStore").finish_non_exhaustive()
    }
}
