//! Batch orchestration across all active pairs.
//!
//! Partitions the pair list into fixed-size chunks and runs them on a
//! bounded worker pool owned by this struct. Isolation is layered: a
//! failing pair never aborts its chunk, and a panicking chunk never aborts
//! the run. Every chunk's counts are recorded and summed; nothing here is
//! globally fatal.
//!
//! The bulk trigger is fire-and-forget. Callers get a run id back
//! immediately and poll [`BatchOrchestrator::current_status`] for progress;
//! there is no cancellation once a run is dispatched.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::error::Result;
use crate::forecast::generator::{generate_for_pair, GenerationOutcome};
use crate::forecast::store::ForecastStore;
use crate::models::PairKey;

/// Pool floor: even single-core boxes get a few workers since each pair is
/// short-lived CPU work interleaved with store writes.
const MIN_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Completed,
    /// The run never got off the ground (dispatch or pair enumeration
    /// failed); per-pair failures never produce this.
    Failed,
}

/// Aggregate view of one batch run, updated when the run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub state: RunState,
    pub total_pairs: usize,
    pub chunks: usize,
    pub succeeded: usize,
    /// Pairs with too little history; not failures.
    pub skipped: usize,
    pub failed: usize,
    /// ANOMALY-classified days across all written rows.
    pub anomalies: usize,
    /// Stale rows removed at the end of the run.
    pub purged: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    fn failed(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            state: RunState::Failed,
            total_pairs: 0,
            chunks: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            anomalies: 0,
            purged: 0,
            started_at,
            finished_at: Some(Utc::now()),
        }
    }
}

/// Counters for one chunk, kept independent so a bad chunk cannot smear
/// the others' numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub index: usize,
    pub pairs: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub anomalies: usize,
    pub errors: Vec<String>,
}

impl ChunkOutcome {
    fn empty(index: usize, pairs: usize) -> Self {
        Self {
            index,
            pairs,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            anomalies: 0,
            errors: Vec::new(),
        }
    }

    /// A chunk whose worker panicked: every pair in it counts failed.
    fn poisoned(index: usize, pairs: usize) -> Self {
        Self {
            index,
            pairs,
            succeeded: 0,
            skipped: 0,
            failed: pairs,
            anomalies: 0,
            errors: vec!["chunk worker panicked".to_string()],
        }
    }
}

/// Full result of a synchronous run: the final status plus per-chunk detail.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub chunk_outcomes: Vec<ChunkOutcome>,
}

pub struct BatchOrchestrator {
    store: ForecastStore,
    pool: rayon::ThreadPool,
    chunk_size: usize,
    status: Mutex<Option<RunStatus>>,
}

impl BatchOrchestrator {
    /// Build the orchestrator with its own worker pool, sized
    /// `max(4, cores)` unless the config pins a thread count.
    pub fn new(store: ForecastStore, config: &BatchConfig) -> Result<Self> {
        let workers = if config.worker_threads > 0 {
            config.worker_threads
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKERS);
            cores.max(MIN_WORKERS)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forecast-worker-{i}"))
            .build()
            .map_err(|e| crate::error::ForecastError::SystemFailure(e.to_string()))?;

        info!(
            "Batch orchestrator ready: {} workers, chunk size {}",
            workers,
            config.chunk_size.max(1)
        );

        Ok(Self {
            store,
            pool,
            chunk_size: config.chunk_size.max(1),
            status: Mutex::new(None),
        })
    }

    /// Latest run's status, if any run has been dispatched this process.
    pub fn current_status(&self) -> Option<RunStatus> {
        self.status.lock().clone()
    }

    /// Fire-and-forget bulk run. Returns the run id immediately; the run
    /// proceeds on a background thread and publishes its result to the
    /// status cell. Concurrent triggers are allowed; the cell reflects the
    /// most recently finished run.
    pub fn trigger(self: &Arc<Self>, as_of: NaiveDate, force: bool) -> Uuid {
        let run_id = Uuid::new_v4();
        let this = Arc::clone(self);

        let spawned = std::thread::Builder::new()
            .name("forecast-batch".to_string())
            .spawn(move || {
                this.run_with_id(run_id, as_of, force);
            });

        if let Err(e) = spawned {
            error!("🛑 Could not dispatch batch run {}: {}", run_id, e);
            *self.status.lock() = Some(RunStatus::failed(run_id, Utc::now()));
        } else {
            info!("Batch run {} dispatched (as of {})", run_id, as_of);
        }

        run_id
    }

    /// Run every active pair to completion and return the report.
    pub fn run_blocking(&self, as_of: NaiveDate, force: bool) -> RunReport {
        self.run_with_id(Uuid::new_v4(), as_of, force)
    }

    fn run_with_id(&self, run_id: Uuid, as_of: NaiveDate, force: bool) -> RunReport {
        let clock = Instant::now();
        let started_at = Utc::now();

        let pairs = match self.store.list_active_pairs() {
            Ok(pairs) => pairs,
            Err(e) => {
                // Enumeration is the one step with nothing to isolate
                error!("🛑 Batch run {} could not enumerate pairs: {}", run_id, e);
                let status = RunStatus::failed(run_id, started_at);
                *self.status.lock() = Some(status.clone());
                return RunReport {
                    status,
                    chunk_outcomes: Vec::new(),
                };
            }
        };
        let total_pairs = pairs.len();
        let chunk_count = pairs.chunks(self.chunk_size).count();
        info!(
            "📦 Batch run {} starting: {} pairs in {} chunks",
            run_id, total_pairs, chunk_count
        );

        *self.status.lock() = Some(RunStatus {
            run_id,
            state: RunState::Running,
            total_pairs,
            chunks: chunk_count,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            anomalies: 0,
            purged: 0,
            started_at,
            finished_at: None,
        });

        let chunk_outcomes = self.run_chunks(&pairs, |pair| {
            generate_for_pair(&self.store, pair, as_of, force)
        });

        // Yesterday and older is dead weight unless an operator pinned it
        let purged = match self.store.purge_stale(as_of) {
            Ok(n) => n,
            Err(e) => {
                warn!("Stale purge failed after run {}: {}", run_id, e);
                0
            }
        };

        let mut status = RunStatus {
            run_id,
            state: RunState::Completed,
            total_pairs,
            chunks: chunk_outcomes.len(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            anomalies: 0,
            purged,
            started_at,
            finished_at: Some(Utc::now()),
        };
        for outcome in &chunk_outcomes {
            status.succeeded += outcome.succeeded;
            status.skipped += outcome.skipped;
            status.failed += outcome.failed;
            status.anomalies += outcome.anomalies;
        }

        info!(
            "✅ Batch run {} complete in {:.1?}: {} ok, {} skipped, {} failed, {} anomalous days",
            run_id,
            clock.elapsed(),
            status.succeeded,
            status.skipped,
            status.failed,
            status.anomalies
        );

        *self.status.lock() = Some(status.clone());
        RunReport {
            status,
            chunk_outcomes,
        }
    }

    /// Partition `pairs` and run `op` across the pool, one chunk per task.
    fn run_chunks<F>(&self, pairs: &[PairKey], op: F) -> Vec<ChunkOutcome>
    where
        F: Fn(PairKey) -> Result<GenerationOutcome> + Sync,
    {
        if pairs.is_empty() {
            return Vec::new();
        }

        self.pool.install(|| {
            pairs
                .par_chunks(self.chunk_size)
                .enumerate()
                .map(|(index, chunk)| Self::process_chunk(index, chunk, &op))
                .collect()
        })
    }

    fn process_chunk<F>(index: usize, chunk: &[PairKey], op: &F) -> ChunkOutcome
    where
        F: Fn(PairKey) -> Result<GenerationOutcome> + Sync,
    {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut outcome = ChunkOutcome::empty(index, chunk.len());
            for &pair in chunk {
                match op(pair) {
                    Ok(generated) => {
                        outcome.succeeded += 1;
                        outcome.anomalies += generated.anomalies;
                    }
                    Err(e) if e.is_skip() => {
                        debug!("Chunk {}: {} skipped ({})", index, pair, e);
                        outcome.skipped += 1;
                    }
                    Err(e) => {
                        error!("Chunk {}: {} failed: {}", index, pair, e);
                        outcome.failed += 1;
                        outcome.errors.push(format!("{pair}: {e}"));
                    }
                }
            }
            outcome
        }));

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("🛑 Chunk {} panicked, counting all {} pairs failed", index, chunk.len());
                ChunkOutcome::poisoned(index, chunk.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::models::{Market, PriceObservation, Product};
    use chrono::{Duration, TimeZone};

    fn orchestrator(store: ForecastStore) -> BatchOrchestrator {
        BatchOrchestrator::new(
            store,
            &BatchConfig {
                chunk_size: 50,
                worker_threads: 4,
            },
        )
        .unwrap()
    }

    fn ok_outcome(pair: PairKey) -> GenerationOutcome {
        GenerationOutcome {
            product_id: pair.product_id,
            market_id: pair.market_id,
            written: 7,
            skipped_pinned: 0,
            anomalies: 0,
            base_confidence: 0.8,
        }
    }

    fn many_pairs(n: i64) -> Vec<PairKey> {
        (0..n).map(|i| PairKey::new(i, 1)).collect()
    }

    #[test]
    fn one_hundred_twenty_pairs_make_three_chunks() {
        let orch = orchestrator(ForecastStore::open(":memory:").unwrap());
        let pairs = many_pairs(120);

        let outcomes = orch.run_chunks(&pairs, |pair| Ok(ok_outcome(pair)));
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].pairs, 50);
        assert_eq!(outcomes[1].pairs, 50);
        assert_eq!(outcomes[2].pairs, 20);
        assert!(outcomes.iter().all(|c| c.failed == 0));
        assert_eq!(outcomes.iter().map(|c| c.succeeded).sum::<usize>(), 120);
    }

    #[test]
    fn failure_in_middle_chunk_leaves_other_chunks_intact() {
        let orch = orchestrator(ForecastStore::open(":memory:").unwrap());
        let pairs = many_pairs(120);

        // Pair 60 sits in the second chunk
        let outcomes = orch.run_chunks(&pairs, |pair| {
            if pair.product_id == 60 {
                Err(ForecastError::SystemFailure("injected".into()))
            } else {
                Ok(ok_outcome(pair))
            }
        });

        assert_eq!(outcomes[0].succeeded, 50);
        assert_eq!(outcomes[0].failed, 0);
        assert_eq!(outcomes[1].succeeded, 49);
        assert_eq!(outcomes[1].failed, 1);
        assert_eq!(outcomes[2].succeeded, 20);
        assert_eq!(outcomes[2].failed, 0);
        assert_eq!(outcomes[1].errors.len(), 1);
        assert!(outcomes[1].errors[0].contains("injected"));
    }

    #[test]
    fn panicking_chunk_is_poisoned_without_spreading() {
        let orch = orchestrator(ForecastStore::open(":memory:").unwrap());
        let pairs = many_pairs(120);

        let outcomes = orch.run_chunks(&pairs, |pair| {
            if pair.product_id == 60 {
                panic!("injected panic");
            }
            Ok(ok_outcome(pair))
        });

        assert_eq!(outcomes[0].succeeded, 50);
        assert_eq!(outcomes[1].failed, 50);
        assert_eq!(outcomes[1].succeeded, 0);
        assert_eq!(outcomes[2].succeeded, 20);
    }

    #[test]
    fn insufficient_history_counts_as_skip_not_failure() {
        let orch = orchestrator(ForecastStore::open(":memory:").unwrap());
        let pairs = many_pairs(10);

        let outcomes = orch.run_chunks(&pairs, |pair| {
            if pair.product_id < 4 {
                Err(ForecastError::InsufficientData {
                    product_id: pair.product_id,
                    market_id: pair.market_id,
                    points: 3,
                    required: 14,
                })
            } else {
                Ok(ok_outcome(pair))
            }
        });

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].skipped, 4);
        assert_eq!(outcomes[0].succeeded, 6);
        assert_eq!(outcomes[0].failed, 0);
    }

    fn seed_pair(store: &ForecastStore, pair: PairKey, days: i64, as_of: NaiveDate) {
        store
            .put_product(&Product {
                id: pair.product_id,
                name: format!("Product {}", pair.product_id),
                category: None,
            })
            .unwrap();
        store
            .put_market(&Market {
                id: pair.market_id,
                name: format!("Market {}", pair.market_id),
                region: None,
            })
            .unwrap();
        let observations: Vec<PriceObservation> = (0..days)
            .map(|i| PriceObservation {
                product_id: pair.product_id,
                market_id: pair.market_id,
                price: 100.0 + i as f64,
                observed_date: as_of - Duration::days(days - 1 - i),
                recorded_at: Utc.with_ymd_and_hms(2026, 8, 1, 8, 0, 0).unwrap(),
            })
            .collect();
        store.record_observations(&observations).unwrap();
    }

    #[test]
    fn full_run_writes_rows_and_publishes_status() {
        let store = ForecastStore::open(":memory:").unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();

        seed_pair(&store, PairKey::new(1, 1), 20, as_of);
        seed_pair(&store, PairKey::new(2, 1), 25, as_of);
        seed_pair(&store, PairKey::new(3, 1), 5, as_of); // too short

        let orch = orchestrator(store.clone());
        let report = orch.run_blocking(as_of, false);

        assert_eq!(report.status.total_pairs, 3);
        assert_eq!(report.status.succeeded, 2);
        assert_eq!(report.status.skipped, 1);
        assert_eq!(report.status.failed, 0);
        assert_eq!(report.status.state, RunState::Completed);
        assert!(report.status.finished_at.is_some());

        assert_eq!(store.forecasts_for_pair(PairKey::new(1, 1)).unwrap().len(), 7);
        assert_eq!(store.forecasts_for_pair(PairKey::new(2, 1)).unwrap().len(), 7);
        assert!(store.forecasts_for_pair(PairKey::new(3, 1)).unwrap().is_empty());

        let published = orch.current_status().unwrap();
        assert_eq!(published.run_id, report.status.run_id);
        assert_eq!(published.state, RunState::Completed);
    }

    #[test]
    fn rerun_is_idempotent_for_normal_rows() {
        let store = ForecastStore::open(":memory:").unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        seed_pair(&store, PairKey::new(1, 1), 20, as_of);

        let orch = orchestrator(store.clone());
        orch.run_blocking(as_of, false);
        let first = store.forecasts_for_pair(PairKey::new(1, 1)).unwrap();

        orch.run_blocking(as_of, false);
        let second = store.forecasts_for_pair(PairKey::new(1, 1)).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.target_date, b.target_date);
            assert!((a.predicted_price - b.predicted_price).abs() < 1e-9);
            assert!((a.confidence - b.confidence).abs() < 1e-9);
            assert_eq!(a.status, b.status);
        }
    }

    #[test]
    fn trigger_returns_immediately_and_finishes_in_background() {
        let store = ForecastStore::open(":memory:").unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        seed_pair(&store, PairKey::new(1, 1), 20, as_of);

        let orch = Arc::new(orchestrator(store));
        let run_id = orch.trigger(as_of, false);

        let mut finished = None;
        for _ in 0..500 {
            if let Some(status) = orch.current_status() {
                if status.run_id == run_id && status.state == RunState::Completed {
                    finished = Some(status);
                    break;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let status = finished.expect("run did not finish in time");
        assert_eq!(status.succeeded, 1);
    }

    #[test]
    fn stale_rows_are_purged_after_the_run() {
        let store = ForecastStore::open(":memory:").unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        seed_pair(&store, PairKey::new(1, 1), 20, as_of);

        // A leftover row from an earlier horizon
        store
            .upsert_forecast(
                &crate::models::Forecast::new(
                    PairKey::new(1, 1),
                    as_of - Duration::days(3),
                    90.0,
                    0.5,
                    crate::models::ForecastStatus::Normal,
                ),
                false,
            )
            .unwrap();

        let orch = orchestrator(store.clone());
        let report = orch.run_blocking(as_of, false);

        assert_eq!(report.status.purged, 1);
        assert!(store
            .find_forecast(PairKey::new(1, 1), as_of - Duration::days(3))
            .unwrap()
            .is_none());
    }
}
