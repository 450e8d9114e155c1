//! TOML network descriptions
//!
//! ```toml
//! [[population]]
//! label = "stimulus"
//! size = 100
//! cell = "spike_source_poisson"
//! parameters = { rate = 20.0 }
//!
//! [[population]]
//! label = "excitatory"
//! size = 2000
//! cell = "if_curr_exp"
//! parameters = { tau_m = 10.0, v = { distribution = "uniform", low = -65.0, high = -55.0 } }
//! config = { mean_firing_rate = 5.0 }
//!
//! [[projection]]
//! pre = "stimulus"
//! post = "excitatory"
//! connector = { type = "fixed_probability", p_connect = 0.1 }
//! weight = { distribution = "uniform", low = 0.0, high = 0.5, native = true }
//! delay = 1.0
//! ```
//!
//! Parameters are scalars, one value per neuron, or distributions drawn
//! per neuron on the host.

use crate::cells::CellModel;
use crate::connectors::Connector;
use crate::error::{CompileError, Result};
use crate::network::{Network, PopulationConfig, ProjectionSpec};
use crate::params::ParamValue;
use crate::random::{RandomDistribution, SynapseParam};
use crate::synapse::SynapseModel;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// A parameter as written in a description
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawParam {
    /// Same for every neuron
    Scalar(f64),
    /// One value per neuron
    Array(Vec<f64>),
    /// Drawn per neuron
    Random(RandomDistribution),
}

impl From<RawParam> for ParamValue {
    fn from(raw: RawParam) -> Self {
        match raw {
            RawParam::Scalar(v) => Self::Scalar(v),
            RawParam::Array(v) => Self::Array(v),
            RawParam::Random(d) => Self::Random(d),
        }
    }
}

/// One `[[population]]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulationDescription {
    /// Unique label
    pub label: String,
    /// Neuron count
    pub size: u32,
    /// Cell model
    pub cell: CellModel,
    /// Parameter and initial value overrides
    #[serde(default)]
    pub parameters: BTreeMap<String, RawParam>,
    /// Compilation hints
    #[serde(default)]
    pub config: PopulationConfig,
}

fn default_receptor() -> String {
    "excitatory".to_string()
}

fn default_one() -> SynapseParam {
    SynapseParam::Constant(1.0)
}

/// One `[[projection]]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionDescription {
    /// Source population label
    pub pre: String,
    /// Target population label
    pub post: String,
    /// Connectivity rule
    pub connector: Connector,
    /// Synapse model
    #[serde(default)]
    pub synapse: SynapseModel,
    /// Receptor on the target cell
    #[serde(default = "default_receptor")]
    pub receptor: String,
    /// Synaptic weight
    #[serde(default = "default_one")]
    pub weight: SynapseParam,
    /// Synaptic delay (ms)
    #[serde(default = "default_one")]
    pub delay: SynapseParam,
    /// Label, generated when absent
    pub label: Option<String>,
}

/// A whole network as read from TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDescription {
    /// Populations, in id order
    #[serde(default, rename = "population")]
    pub populations: Vec<PopulationDescription>,
    /// Projections, in id order
    #[serde(default, rename = "projection")]
    pub projections: Vec<ProjectionDescription>,
}

impl NetworkDescription {
    /// Parse a description
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CompileError::config(format!("Invalid network description: {e}")))
    }

    /// Read a description file
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, unreadable or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CompileError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!("Loading network description from {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Build the network
    ///
    /// # Errors
    ///
    /// Returns error for duplicate or unknown labels and for projections the
    /// network rejects.
    pub fn into_network(self) -> Result<Network> {
        let mut network = Network::new();
        for description in self.populations {
            if network.find_population(&description.label).is_some() {
                return Err(CompileError::config(format!(
                    "Duplicate population label {}",
                    description.label
                )));
            }
            let id = network.add_population(description.label, description.size, description.cell);
            let population = network.population_mut(id)?;
            population.config = description.config;
            for (name, value) in description.parameters {
                population.set(name, value);
            }
            debug!("{}: {} x {}", population.label, population.size, population.cell);
        }

        for description in self.projections {
            let find = |label: &str| {
                network
                    .find_population(label)
                    .ok_or_else(|| CompileError::UnknownPopulation { name: label.to_string() })
            };
            let pre = find(&description.pre)?;
            let post = find(&description.post)?;
            let spec = ProjectionSpec {
                connector: description.connector,
                synapse: description.synapse,
                receptor: description.receptor,
                weight: description.weight,
                delay: description.delay,
                label: description.label,
            };
            network.add_projection(pre, post, spec)?;
        }
        info!(
            "Network: {} populations, {} projections",
            network.populations().len(),
            network.projections().len()
        );
        Ok(network)
    }
}
