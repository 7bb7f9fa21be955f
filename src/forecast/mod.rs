//! Forecasting core: per-pair generation, batch orchestration, manual
//! overrides, storage, and the read views built on top of them.

pub mod calibration;
pub mod classifier;
pub mod confidence;
pub mod generator;
pub mod history;
pub mod orchestrator;
pub mod overrides;
pub mod store;

pub use calibration::{calibration_table, dashboard_stats, CalibrationPage, DashboardStats};
pub use generator::{generate_for_pair, GenerationOutcome, FORECAST_HORIZON_DAYS};
pub use orchestrator::{BatchOrchestrator, RunReport, RunState, RunStatus};
pub use overrides::{apply_bulk_override, OverrideReport, OverrideRequest};
pub use store::ForecastStore;
