//! Cell model catalogue
//!
//! | Model | Neurons/core | Receptors | Direct input |
//! |-------|-------------:|-----------|--------------|
//! | `if_curr_exp` | 1024 | excitatory, inhibitory | no |
//! | `if_cond_exp` | 1024 | excitatory, inhibitory | no |
//! | `spike_source_poisson` | 256 | none | 2048 per core |
//!
//! User-facing parameters are translated into the native parameters the
//! neuron region stores (for example `r_membrane = tau_m / cm`) and written
//! through the model's parameter maps.

use crate::params::{BinaryType, Expr, FieldSpec, ParameterSpace, Transform};
use serde::Deserialize;
use std::fmt;

const fn s1615(name: &'static str) -> FieldSpec {
    FieldSpec::param(name, BinaryType::I32, Transform::S1615)
}

const IF_CURR_IMMUTABLE: [FieldSpec; 7] = [
    s1615("v_thresh"),
    s1615("v_reset"),
    s1615("v_rest"),
    s1615("i_offset"),
    s1615("r_membrane"),
    FieldSpec::param("tau_m", BinaryType::I32, Transform::S1615ExpDecay),
    FieldSpec::param("tau_refrac", BinaryType::U32, Transform::IntegerTimeDivide),
];

const IF_COND_IMMUTABLE: [FieldSpec; 9] = [
    s1615("v_thresh"),
    s1615("v_reset"),
    s1615("v_rest"),
    s1615("e_rev_e"),
    s1615("e_rev_i"),
    s1615("i_offset"),
    s1615("r_membrane"),
    FieldSpec::param("tau_m", BinaryType::I32, Transform::S1615ExpDecay),
    FieldSpec::param("tau_refrac", BinaryType::U32, Transform::IntegerTimeDivide),
];

// Membrane voltage and refractory countdown
const IF_MUTABLE: [FieldSpec; 2] = [s1615("v"), FieldSpec::constant(0.0, BinaryType::I32)];

const EXP_SYNAPSE_IMMUTABLE: [FieldSpec; 4] = [
    FieldSpec::param("tau_syn_e", BinaryType::U32, Transform::U032ExpDecay),
    FieldSpec::param("tau_syn_e", BinaryType::I32, Transform::S1615ExpInit),
    FieldSpec::param("tau_syn_i", BinaryType::U32, Transform::U032ExpDecay),
    FieldSpec::param("tau_syn_i", BinaryType::I32, Transform::S1615ExpInit),
];

const EXP_SYNAPSE_CURR_MUTABLE: [FieldSpec; 2] = [s1615("isyn_exc"), s1615("isyn_inh")];
const EXP_SYNAPSE_COND_MUTABLE: [FieldSpec; 2] = [s1615("gsyn_exc"), s1615("gsyn_inh")];

const POISSON_IMMUTABLE: [FieldSpec; 4] = [
    FieldSpec::param("rate", BinaryType::U32, Transform::PoissonSlowModel),
    FieldSpec::param("start_time", BinaryType::U32, Transform::IntegerTimeDivide),
    FieldSpec::param("end_time", BinaryType::U32, Transform::IntegerTimeDivide),
    FieldSpec::param("rate", BinaryType::U32, Transform::PoissonRate),
];

const RECEPTORS: [&str; 2] = ["excitatory", "inhibitory"];

/// Neuron and spike-source models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellModel {
    /// Leaky integrate-and-fire, exponential current synapses
    IfCurrExp,
    /// Leaky integrate-and-fire, exponential conductance synapses
    IfCondExp,
    /// Poisson spike source
    SpikeSourcePoisson,
}

impl CellModel {
    /// Model name
    pub const fn name(self) -> &'static str {
        match self {
            Self::IfCurrExp => "if_curr_exp",
            Self::IfCondExp => "if_cond_exp",
            Self::SpikeSourcePoisson => "spike_source_poisson",
        }
    }

    /// Neurons one core can simulate at the reference timestep
    pub const fn max_neurons_per_core(self) -> u32 {
        match self {
            Self::IfCurrExp | Self::IfCondExp => 1024,
            Self::SpikeSourcePoisson => 256,
        }
    }

    /// Neurons one core can drive as direct current input, if supported
    pub const fn max_current_inputs_per_core(self) -> Option<u32> {
        match self {
            Self::SpikeSourcePoisson => Some(2048),
            Self::IfCurrExp | Self::IfCondExp => None,
        }
    }

    /// Whether the model can act as a direct current source
    pub const fn directly_connectable(self) -> bool {
        self.max_current_inputs_per_core().is_some()
    }

    /// Receptor types projections may target
    pub const fn receptor_types(self) -> &'static [&'static str] {
        match self {
            Self::IfCurrExp | Self::IfCondExp => &RECEPTORS,
            Self::SpikeSourcePoisson => &[],
        }
    }

    /// Index of a receptor type
    pub fn receptor_index(self, receptor: &str) -> Option<usize> {
        self.receptor_types().iter().position(|r| *r == receptor)
    }

    /// Default parameters and initial values
    pub fn default_parameters(self, size: usize) -> ParameterSpace {
        let space = ParameterSpace::new(size);
        match self {
            Self::IfCurrExp | Self::IfCondExp => {
                let space = space
                    .with("cm", 1.0)
                    .with("tau_m", 20.0)
                    .with("tau_refrac", 0.1)
                    .with("tau_syn_e", 5.0)
                    .with("tau_syn_i", 5.0)
                    .with("v_rest", -65.0)
                    .with("v_reset", -65.0)
                    .with("v_thresh", -50.0)
                    .with("i_offset", 0.0)
                    .with("v", Expr::param("v_rest"));
                if self == Self::IfCurrExp {
                    space.with("isyn_exc", 0.0).with("isyn_inh", 0.0)
                } else {
                    space
                        .with("e_rev_e", 0.0)
                        .with("e_rev_i", -70.0)
                        .with("gsyn_exc", 0.0)
                        .with("gsyn_inh", 0.0)
                }
            }
            Self::SpikeSourcePoisson => space
                .with("rate", 1.0)
                .with("start", 0.0)
                .with("duration", 1.0e8),
        }
    }

    /// Native parameters: defaults, then `parameters`, then derived values
    pub fn native_parameters(self, parameters: &ParameterSpace) -> ParameterSpace {
        let mut native = self.default_parameters(parameters.size());
        native.update(parameters);
        match self {
            Self::IfCurrExp | Self::IfCondExp => {
                native.set("r_membrane", Expr::div(Expr::param("tau_m"), Expr::param("cm")));
            }
            Self::SpikeSourcePoisson => {
                native.set("start_time", Expr::param("start"));
                native.set("end_time", Expr::add(Expr::param("start"), Expr::param("duration")));
            }
        }
        native
    }

    /// Per-neuron constants of the neuron region
    pub const fn neuron_immutable_param_map(self) -> &'static [FieldSpec] {
        match self {
            Self::IfCurrExp => &IF_CURR_IMMUTABLE,
            Self::IfCondExp => &IF_COND_IMMUTABLE,
            Self::SpikeSourcePoisson => &POISSON_IMMUTABLE,
        }
    }

    /// Per-neuron state of the neuron region
    pub const fn neuron_mutable_param_map(self) -> &'static [FieldSpec] {
        match self {
            Self::IfCurrExp | Self::IfCondExp => &IF_MUTABLE,
            Self::SpikeSourcePoisson => &[],
        }
    }

    /// Per-neuron constants of synaptic input shaping
    pub const fn synapse_immutable_param_map(self) -> &'static [FieldSpec] {
        match self {
            Self::IfCurrExp | Self::IfCondExp => &EXP_SYNAPSE_IMMUTABLE,
            Self::SpikeSourcePoisson => &[],
        }
    }

    /// Per-neuron state of synaptic input shaping
    pub const fn synapse_mutable_param_map(self) -> &'static [FieldSpec] {
        match self {
            Self::IfCurrExp => &EXP_SYNAPSE_CURR_MUTABLE,
            Self::IfCondExp => &EXP_SYNAPSE_COND_MUTABLE,
            Self::SpikeSourcePoisson => &[],
        }
    }
}

impl fmt::Display for CellModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
