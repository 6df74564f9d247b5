//! # Engine Configuration
//!
//! Recognized options for the matching core, loadable from environment
//! variables with an `ENGINE_` prefix, falling back to documented defaults.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Configuration recognized by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum entries in the verification cache.
    pub verify_cache_capacity: usize,
    /// Contract execute timeout, in milliseconds.
    pub execute_timeout_ms: u64,
    /// Days to retain completed/cancelled orders; `None` means retain forever.
    pub retention_days: Option<u32>,
    /// Bounds on the simulated gas draw, in ETH-equivalent units.
    pub gas_range_eth: (f64, f64),
    /// Baseline verification latency, in seconds, used by the reduction metric.
    pub target_verify_baseline_sec: f64,
}

impl EngineConfig {
    /// Load configuration layering environment overrides (prefix `ENGINE_`,
    /// `_` as the nesting separator) on top of the documented defaults.
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let built = Config::builder()
            .set_default("verify_cache_capacity", defaults.verify_cache_capacity as i64)?
            .set_default("execute_timeout_ms", defaults.execute_timeout_ms as i64)?
            .set_default("retention_days", None::<i64>)?
            .set_default("gas_range_eth", vec![defaults.gas_range_eth.0, defaults.gas_range_eth.1])?
            .set_default("target_verify_baseline_sec", defaults.target_verify_baseline_sec)?
            .add_source(Environment::with_prefix("ENGINE").separator("_"))
            .build()?;

        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.verify_cache_capacity == 0 {
            return Err(anyhow::anyhow!("verify cache capacity must be greater than 0"));
        }
        if self.gas_range_eth.0 <= 0.0 || self.gas_range_eth.1 < self.gas_range_eth.0 {
            return Err(anyhow::anyhow!("gas range must be a non-empty positive interval"));
        }
        if self.target_verify_baseline_sec <= 0.0 {
            return Err(anyhow::anyhow!("verify baseline must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_cache_capacity: 10_000,
            execute_timeout_ms: 5_000,
            retention_days: None,
            gas_range_eth: (0.001, 0.005),
            target_verify_baseline_sec: 10.0,
        }
    }
}
