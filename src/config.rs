//! Service configuration.
//!
//! Deployment knobs load from an optional TOML file with environment
//! overrides for the deploy-critical values. Algorithm constants (score
//! weights, rule thresholds, decay) live beside their modules, not here.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pairs per chunk; each chunk is an isolated unit of work.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Worker threads for chunk processing; 0 sizes from the host core
    /// count with a floor of 4.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_path() -> String {
    "./pricecast.db".to_string()
}

fn default_chunk_size() -> usize {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            worker_threads: 0,
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `PRICECAST_CONFIG_PATH` (or `pricecast.toml`), falling back
    /// to defaults, then apply environment overrides.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let path = std::env::var("PRICECAST_CONFIG_PATH")
            .unwrap_or_else(|_| "pricecast.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default config ({}): {}", path, e);
            Self::default()
        });

        if let Ok(db) = std::env::var("DATABASE_PATH") {
            config.storage.database_path = db;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Ok(chunk) = std::env::var("BATCH_CHUNK_SIZE") {
            if let Ok(chunk) = chunk.parse::<usize>() {
                if chunk > 0 {
                    config.batch.chunk_size = chunk;
                }
            }
        }
        if let Ok(workers) = std::env::var("BATCH_WORKERS") {
            if let Ok(workers) = workers.parse() {
                config.batch.worker_threads = workers;
            }
        }

        config
    }

    /// Save to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.batch.chunk_size, 50);
        assert_eq!(config.batch.worker_threads, 0);
        assert_eq!(config.storage.database_path, "./pricecast.db");
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
[batch]
chunk_size = 25

[server]
port = 9090
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.batch.chunk_size, 25);
        assert_eq!(config.server.port, 9090);
        // Unspecified sections fall back to defaults
        assert_eq!(config.storage.database_path, "./pricecast.db");
        assert_eq!(config.server.bind_addr, "0.0.0.0");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.batch.chunk_size, config.batch.chunk_size);
        assert_eq!(parsed.server.port, config.server.port);
    }
}
