// sudomesh-master: Configuration support

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sudomesh_core::Strategy;

use crate::error::{MasterError, MasterResult};

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MasterConfig {
    pub server: ServerSection,
    pub solve: SolveSection,
    pub timing: TimingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveSection {
    /// Partitioning strategy applied to every incoming job
    pub strategy: Strategy,
    /// Stall threshold at N = 9, scaled linearly with N/9
    pub stall_base_secs: u64,
    /// Requeue rounds without a new sure cell before a job is abandoned
    pub max_unproductive_iterations: u32,
}

/// Sweep and timer intervals.
///
/// Millisecond precision so integration tests can shrink them; the
/// defaults match the protocol: heartbeats every 30 s, workers declared
/// dead after 90 s, sweep every 60 s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub dead_after_ms: u64,
    pub sweep_interval_ms: u64,
    /// Combine/stall tick, 1 Hz by default
    pub tick_interval_ms: u64,
    pub result_ttl_secs: u64,
    pub result_sweep_interval_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for SolveSection {
    fn default() -> Self {
        Self {
            strategy: Strategy::Column,
            stall_base_secs: 90,
            max_unproductive_iterations: 10,
        }
    }
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            dead_after_ms: 90_000,
            sweep_interval_ms: 60_000,
            tick_interval_ms: 1_000,
            result_ttl_secs: 3_600,
            result_sweep_interval_ms: 60_000,
        }
    }
}

impl MasterConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &str) -> MasterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MasterError::Config(format!("failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| MasterError::Config(format!("failed to parse config file: {}", e)))
    }

    /// Apply environment overrides (`BIND_ADDR`, `SOLVE_STRATEGY`)
    pub fn apply_env(&mut self) -> MasterResult<()> {
        if let Ok(addr) = env::var("BIND_ADDR") {
            self.server.bind_address = addr;
        }
        if let Ok(strategy) = env::var("SOLVE_STRATEGY") {
            self.solve.strategy = strategy
                .parse()
                .map_err(|e| MasterError::Config(format!("SOLVE_STRATEGY: {}", e)))?;
        }
        Ok(())
    }

    pub fn dead_after(&self) -> Duration {
        Duration::from_millis(self.timing.dead_after_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timing.sweep_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timing.tick_interval_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.timing.result_ttl_secs)
    }

    pub fn result_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timing.result_sweep_interval_ms)
    }

    /// Stall threshold for a board side, scaled linearly from the N = 9
    /// baseline
    pub fn stall_timeout(&self, side: usize) -> Duration {
        let scaled = self.solve.stall_base_secs.saturating_mul(side as u64) / 9;
        Duration::from_secs(scaled.max(1))
    }
}
