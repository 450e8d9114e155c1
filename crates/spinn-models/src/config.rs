//! Compilation configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! timestep_ms = 0.1
//! hardware_timestep_us = 100
//! realtime_proportion = 2.0
//! duration_ms = 5000
//! num_profile_samples = 1000
//! ```

use crate::error::{CompileError, Result};
use serde::Deserialize;
use std::path::Path;

/// Compilation-wide settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
    /// Simulation timestep in milliseconds
    pub timestep_ms: f64,
    /// Hardware timestep in microseconds (scales per-core neuron capacity)
    pub hardware_timestep_us: u32,
    /// Wall-clock time per simulated time; >1 runs slower than real time
    pub realtime_proportion: f64,
    /// Simulated duration in milliseconds
    pub duration_ms: f64,
    /// Replace identity connections from spike sources by direct links
    pub convert_direct_connections: bool,
    /// Seed of every host-side random draw
    pub seed: u64,
    /// Profiling samples per vertex (profiling disabled when absent)
    pub num_profile_samples: Option<u32>,
    /// Ask synapse processors to flush plasticity state at the end of a run
    pub flush: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            timestep_ms: 1.0,
            hardware_timestep_us: 1000,
            realtime_proportion: 1.0,
            duration_ms: 1000.0,
            convert_direct_connections: true,
            seed: 0x5EED,
            num_profile_samples: None,
            flush: false,
        }
    }
}

impl CompileConfig {
    /// Parse from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or the values are invalid.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CompileError::config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, unreadable or invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CompileError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        tracing::info!("Loading compile configuration from {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error if a timestep or proportion is not strictly positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep_ms > 0.0) {
            return Err(CompileError::config(format!(
                "timestep_ms must be positive, got {}",
                self.timestep_ms
            )));
        }
        if self.hardware_timestep_us == 0 {
            return Err(CompileError::config("hardware_timestep_us must be positive"));
        }
        if !(self.realtime_proportion > 0.0) {
            return Err(CompileError::config(format!(
                "realtime_proportion must be positive, got {}",
                self.realtime_proportion
            )));
        }
        if self.duration_ms < 0.0 {
            return Err(CompileError::config("duration_ms must not be negative"));
        }
        Ok(())
    }

    /// Timer period of the device cores in microseconds
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn timer_period_us(&self) -> u32 {
        (f64::from(self.hardware_timestep_us) * self.realtime_proportion).round() as u32
    }

    /// Number of simulation ticks
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sim_ticks(&self) -> u32 {
        (self.duration_ms / self.timestep_ms).ceil() as u32
    }

    /// Simulation ticks per simulated second
    #[must_use]
    pub fn ticks_per_second(&self) -> f64 {
        1000.0 / self.timestep_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = CompileConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompileConfig::default());
        assert_eq!(config.sim_ticks(), 1000);
        assert_eq!(config.timer_period_us(), 1000);
    }

    #[test]
    fn overrides_apply() {
        let config = CompileConfig::from_toml_str(
            "timestep_ms = 0.1\nhardware_timestep_us = 100\nrealtime_proportion = 2.0\n",
        )
        .unwrap();
        assert_eq!(config.timer_period_us(), 200);
        assert_eq!(config.sim_ticks(), 10_000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(CompileConfig::from_toml_str("timestep_ms = 0.0").is_err());
        assert!(CompileConfig::from_toml_str("realtime_proportion = -1.0").is_err());
        assert!(CompileConfig::from_toml_str("unknown_key = 1").is_err());
    }
}
