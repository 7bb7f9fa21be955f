//! Demo Data Seeder
//!
//! Fills a database with a small commodity catalog and a configurable stretch
//! of daily price history so the forecasting pipeline has something to chew on.
//! Generation is fully deterministic: the same seed always produces the same
//! database.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin seed_demo -- --database ./pricecast.db
//! cargo run --bin seed_demo -- --days 90 --seed 7
//! ```

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use pricecast_backend::config::Config;
use pricecast_backend::forecast::ForecastStore;
use pricecast_backend::models::{Market, PriceObservation, Product};

const PRODUCTS: &[(&str, &str, f64)] = &[
    ("Maize", "GRAIN", 52.0),
    ("Rice", "GRAIN", 118.0),
    ("Wheat", "GRAIN", 74.0),
    ("Beans", "LEGUME", 96.0),
    ("Green Peas", "LEGUME", 84.0),
    ("Coffee", "CASH_CROP", 310.0),
    ("Tea", "CASH_CROP", 265.0),
    ("Potatoes", "VEGETABLE", 38.0),
    ("Tomatoes", "VEGETABLE", 61.0),
    ("Onions", "VEGETABLE", 47.0),
];

const MARKETS: &[(&str, &str)] = &[
    ("Central Market", "Central"),
    ("Lakeside Market", "West"),
    ("Highland Market", "North"),
    ("Harbor Market", "Coast"),
];

/// Seed a database with demo products, markets, and price history
#[derive(Parser, Debug)]
#[command(name = "seed_demo")]
#[command(about = "Populate a database with deterministic demo price history")]
struct Cli {
    /// Path to the SQLite database (defaults to the configured path)
    #[arg(short, long, env = "DATABASE_PATH")]
    database: Option<String>,

    /// Days of history per (product, market) pair
    #[arg(long, default_value = "45")]
    days: usize,

    /// Last observation date, YYYY-MM-DD (defaults to today, UTC)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// RNG seed; identical seeds produce identical history
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    let db_path = cli
        .database
        .unwrap_or_else(|| config.storage.database_path.clone());
    let end_date = cli.end_date.unwrap_or_else(|| Utc::now().date_naive());

    println!("Seeding demo data into {db_path}");
    println!(
        "  {} products × {} markets, {} days ending {}",
        PRODUCTS.len(),
        MARKETS.len(),
        cli.days,
        end_date
    );

    let store = ForecastStore::open(&db_path).context("Failed to open forecast store")?;
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);

    for (idx, (name, category, _)) in PRODUCTS.iter().enumerate() {
        store.put_product(&Product {
            id: idx as i64 + 1,
            name: (*name).to_string(),
            category: Some((*category).to_string()),
        })?;
    }
    for (idx, (name, region)) in MARKETS.iter().enumerate() {
        store.put_market(&Market {
            id: idx as i64 + 1,
            name: (*name).to_string(),
            region: Some((*region).to_string()),
        })?;
    }

    let recorded_at = Utc::now();
    let mut observations = Vec::with_capacity(PRODUCTS.len() * MARKETS.len() * cli.days);

    for (p_idx, (_, _, base_price)) in PRODUCTS.iter().enumerate() {
        for m_idx in 0..MARKETS.len() {
            // Each market trades the same product at its own level and drift.
            let market_factor = rng.gen_range(0.85..1.15);
            let daily_drift = rng.gen_range(-0.004..0.006);
            let volatility = rng.gen_range(0.005..0.03);
            let mut price = base_price * market_factor;

            for day in 0..cli.days {
                let date = end_date - Duration::days((cli.days - 1 - day) as i64);
                let noise = rng.gen_range(-volatility..volatility);
                price *= 1.0 + daily_drift + noise;

                // Rare one-day spike so the anomaly rules have something to flag.
                let observed = if rng.gen_bool(0.015) {
                    price * rng.gen_range(1.35..1.55)
                } else {
                    price
                };

                observations.push(PriceObservation {
                    product_id: p_idx as i64 + 1,
                    market_id: m_idx as i64 + 1,
                    price: (observed * 100.0).round() / 100.0,
                    observed_date: date,
                    recorded_at,
                });
            }
        }
    }

    let inserted = store.record_observations(&observations)?;
    let stats = store.stats()?;

    println!();
    println!("✓ Inserted {inserted} observations");
    println!(
        "  Store now holds {} products, {} markets, {} observations, {} forecast rows",
        stats.products, stats.markets, stats.price_observations, stats.forecast_rows
    );
    println!();
    println!("Next: cargo run --bin forecast_batch -- --database {db_path}");

    Ok(())
}
