//! Per-chip resource budgets.
//!
//! ## Key figures
//!
//! - **16 cores per chip** are available to one population's neuron,
//!   synapse and current-input processors
//! - Every core is clocked at **200 MHz**; all per-timestep cycle estimates
//!   are expressed against this figure
//! - A synapse processor's key lookup can index at most **16 MiB** of
//!   synaptic matrix data
//! - All time-driven estimates are scaled against a **1 ms** reference
//!   timestep

/// Resource budget of one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipResources {
    /// Cores a single population may occupy on one chip.
    pub cores_per_chip: u32,
    /// Core clock in cycles per second.
    pub cpu_cycles_per_second: u64,
    /// External (DMA-addressable) memory shared by all cores on a chip.
    pub sdram_bytes: usize,
    /// Largest synaptic matrix region one key lookup can address.
    pub max_synaptic_matrix_bytes: usize,
}

impl ChipResources {
    /// Reference chip (18-core ARM968 nodes, one monitor and one spare).
    pub const SPINNAKER: Self = Self {
        cores_per_chip: 16,
        cpu_cycles_per_second: 200_000_000,
        sdram_bytes: 128 * 1024 * 1024,
        max_synaptic_matrix_bytes: 16 * 1024 * 1024,
    };

    /// Cycles available per second once `constant_overhead` cycles have
    /// been spent on every one of `ticks_per_second` timesteps.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn available_cycles(&self, constant_overhead: f64, ticks_per_second: f64) -> f64 {
        self.cpu_cycles_per_second as f64 - constant_overhead * ticks_per_second
    }
}

impl Default for ChipResources {
    fn default() -> Self {
        Self::SPINNAKER
    }
}

/// Reference timestep all j-constraints are calibrated against (µs).
pub const REFERENCE_TIMESTEP_US: u32 = 1000;

/// Fraction of the reference timestep a hardware timestep represents,
/// capped at 1.0 (slower timesteps never buy extra neurons per core).
#[must_use]
pub fn timestep_multiplier(hardware_timestep_us: u32) -> f64 {
    (f64::from(hardware_timestep_us) / f64::from(REFERENCE_TIMESTEP_US)).min(1.0)
}
