//! Synapse models
//!
//! The synapse model fixes the row format in the synaptic matrix, the cost
//! of processing a row, and any plasticity parameters written alongside.

use crate::params::{BinaryType, FieldSpec, ParameterSpace, Transform};
use crate::weights::WeightRange;
use serde::Deserialize;
use std::fmt;

/// Pair-based additive STDP parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StdpParameters {
    /// Potentiation time constant (ms)
    pub tau_plus: f64,
    /// Depression time constant (ms)
    pub tau_minus: f64,
    /// Potentiation amplitude
    pub a_plus: f64,
    /// Depression amplitude
    pub a_minus: f64,
    /// Lower weight bound
    pub w_min: f64,
    /// Upper weight bound
    pub w_max: f64,
}

impl Default for StdpParameters {
    fn default() -> Self {
        Self {
            tau_plus: 16.7,
            tau_minus: 33.7,
            a_plus: 0.01,
            a_minus: 0.012,
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

const STDP_MAP: [FieldSpec; 6] = [
    FieldSpec::param("tau_plus", BinaryType::U32, Transform::U032ExpDecay),
    FieldSpec::param("tau_minus", BinaryType::U32, Transform::U032ExpDecay),
    FieldSpec::param("a_plus", BinaryType::I32, Transform::S32FixedPoint),
    FieldSpec::param("a_minus", BinaryType::I32, Transform::S32FixedPoint),
    FieldSpec::param("w_min", BinaryType::I32, Transform::S32FixedPoint),
    FieldSpec::param("w_max", BinaryType::I32, Transform::S32FixedPoint),
];

/// Synapse model discriminant, used to group projections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SynapseModelKind {
    /// Fixed weights
    Static,
    /// Spike-timing dependent plasticity
    Stdp,
}

/// Synapse model with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SynapseModel {
    /// Fixed weights
    #[default]
    Static,
    /// Spike-timing dependent plasticity
    Stdp(StdpParameters),
}

impl SynapseModel {
    /// Discriminant
    pub const fn kind(&self) -> SynapseModelKind {
        match self {
            Self::Static => SynapseModelKind::Static,
            Self::Stdp(_) => SynapseModelKind::Stdp,
        }
    }

    /// Model name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Stdp(_) => "stdp",
        }
    }

    /// Whether weights carry a sign bit
    pub const fn signed_weight(&self) -> bool {
        false
    }

    /// Whether rows carry plastic state
    pub const fn is_plastic(&self) -> bool {
        matches!(self, Self::Stdp(_))
    }

    /// Post-synaptic neurons one synapse processor can serve
    pub const fn max_post_neurons_per_core(&self) -> u32 {
        match self {
            Self::Static => 1024,
            Self::Stdp(_) => 512,
        }
    }

    /// Fixed per-tick cost of a synapse processor (CPU cycles)
    pub const fn constant_cpu_overhead(&self) -> f64 {
        match self {
            Self::Static => 2_000.0,
            Self::Stdp(_) => 4_000.0,
        }
    }

    /// Cost of fetching and starting one row (CPU cycles)
    pub const fn row_cpu_cycles(&self) -> f64 {
        match self {
            Self::Static => 250.0,
            Self::Stdp(_) => 600.0,
        }
    }

    /// Cost of one synapse within a row (CPU cycles)
    pub const fn synapse_cpu_cycles(&self) -> f64 {
        match self {
            Self::Static => 20.0,
            Self::Stdp(_) => 100.0,
        }
    }

    /// Words of pre-synaptic trace state per row
    pub const fn pre_trace_words(&self) -> usize {
        match self {
            Self::Static => 0,
            Self::Stdp(_) => 1,
        }
    }

    /// Fold plasticity weight bounds into a slice's weight range
    pub fn update_weight_range(&self, range: &mut WeightRange) {
        if let Self::Stdp(stdp) = self {
            range.update(stdp.w_min);
            range.update(stdp.w_max);
        }
    }

    /// Plasticity region parameter map, `None` for static synapses
    pub fn plasticity_param_map(&self) -> Option<&'static [FieldSpec]> {
        match self {
            Self::Static => None,
            Self::Stdp(_) => Some(&STDP_MAP),
        }
    }

    /// Plasticity parameters as a single-record space
    pub fn plasticity_parameters(&self) -> ParameterSpace {
        match self {
            Self::Static => ParameterSpace::new(1),
            Self::Stdp(p) => ParameterSpace::new(1)
                .with("tau_plus", p.tau_plus)
                .with("tau_minus", p.tau_minus)
                .with("a_plus", p.a_plus)
                .with("a_minus", p.a_minus)
                .with("w_min", p.w_min)
                .with("w_max", p.w_max),
        }
    }
}

impl fmt::Display for SynapseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Projections into one population sharing a model and receptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynapseType {
    /// Synapse model
    pub model: SynapseModelKind,
    /// Receptor name
    pub receptor: String,
}

impl fmt::Display for SynapseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.model, self.receptor)
    }
}
