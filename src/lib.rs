//! PriceCast Backend Library
//!
//! Exposes the forecasting engine modules for use by binaries and tests.

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod forecast;
pub mod models;
