//! Network model: populations and the projections between them
//!
//! [`Network`] owns every population and projection; populations refer to
//! their projections by id, grouped by [`SynapseType`] on the incoming side.

use crate::cells::CellModel;
use crate::config::CompileConfig;
use crate::connectors::{ConnectionWindow, Connector, ConsumableState};
use crate::error::{CompileError, Result};
use crate::matrix::Synapse;
use crate::params::{ParamValue, ParameterSpace};
use crate::random::{mix_seed, SynapseParam};
use crate::slice::NeuronSlice;
use crate::synapse::{SynapseModel, SynapseType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use spinn_chip::layout::MAX_DTCM_DELAY;
use std::collections::BTreeMap;
use std::fmt;

/// Index of a population within its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopulationId(pub usize);

/// Index of a projection within its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectionId(pub usize);

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "population {}", self.0)
    }
}

/// Per-population compilation hints
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationConfig {
    /// Expected firing rate (Hz), used for synapse processing estimates
    pub mean_firing_rate: f64,
    /// Profiling samples, overriding the compile-wide setting
    pub num_profile_samples: Option<u32>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            mean_firing_rate: 10.0,
            num_profile_samples: None,
        }
    }
}

/// A group of neurons sharing a cell model
#[derive(Debug, Clone)]
pub struct Population {
    /// Id within the network
    pub id: PopulationId,
    /// Label
    pub label: String,
    /// Neuron count
    pub size: u32,
    /// Cell model
    pub cell: CellModel,
    /// User parameters and initial values
    pub parameters: ParameterSpace,
    /// Compilation hints
    pub config: PopulationConfig,
    incoming: BTreeMap<SynapseType, Vec<ProjectionId>>,
    outgoing: Vec<ProjectionId>,
}

impl Population {
    /// Set a parameter or initial value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.parameters.set(name, value);
        self
    }

    /// Incoming projections by synapse type, in insertion order
    pub const fn incoming(&self) -> &BTreeMap<SynapseType, Vec<ProjectionId>> {
        &self.incoming
    }

    /// Outgoing projections
    pub fn outgoing(&self) -> &[ProjectionId] {
        &self.outgoing
    }

    /// Parameters translated for the neuron region
    pub fn native_parameters(&self) -> ParameterSpace {
        self.cell.native_parameters(&self.parameters)
    }
}

/// Everything needed to create a projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSpec {
    /// Connectivity rule
    pub connector: Connector,
    /// Synapse model
    pub synapse: SynapseModel,
    /// Receptor on the post-synaptic cell
    pub receptor: String,
    /// Weight of each synapse
    pub weight: SynapseParam,
    /// Delay of each synapse (ms)
    pub delay: SynapseParam,
    /// Label, generated when absent
    pub label: Option<String>,
}

impl ProjectionSpec {
    /// Static excitatory projection with unit weight and 1 ms delay
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            synapse: SynapseModel::Static,
            receptor: "excitatory".to_string(),
            weight: SynapseParam::Constant(1.0),
            delay: SynapseParam::Constant(1.0),
            label: None,
        }
    }

    /// Set the weight
    #[must_use]
    pub fn weight(mut self, weight: impl Into<SynapseParam>) -> Self {
        self.weight = weight.into();
        self
    }

    /// Set the delay
    #[must_use]
    pub fn delay(mut self, delay: impl Into<SynapseParam>) -> Self {
        self.delay = delay.into();
        self
    }

    /// Set the receptor
    #[must_use]
    pub fn receptor(mut self, receptor: impl Into<String>) -> Self {
        self.receptor = receptor.into();
        self
    }

    /// Set the synapse model
    #[must_use]
    pub const fn synapse(mut self, synapse: SynapseModel) -> Self {
        self.synapse = synapse;
        self
    }

    /// Set the label
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A directed connection between two populations
#[derive(Debug, Clone)]
pub struct Projection {
    /// Id within the network
    pub id: ProjectionId,
    /// Label
    pub label: String,
    /// Source population
    pub pre: PopulationId,
    /// Target population
    pub post: PopulationId,
    /// Connectivity rule
    pub connector: Connector,
    /// Synapse model
    pub synapse: SynapseModel,
    /// Receptor on the post-synaptic cell
    pub receptor: String,
    /// Weight of each synapse
    pub weight: SynapseParam,
    /// Delay of each synapse (ms)
    pub delay: SynapseParam,
}

impl Projection {
    /// Grouping key on the post-synaptic side
    pub fn synapse_type(&self) -> SynapseType {
        SynapseType {
            model: self.synapse.kind(),
            receptor: self.receptor.clone(),
        }
    }

    /// Largest delay in ticks
    ///
    /// Delays round to the nearest tick, halves away from zero.
    ///
    /// # Errors
    ///
    /// Returns error if the delay distribution cannot be bounded.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_delay_ticks(&self, timestep_ms: f64) -> Result<u32> {
        let (_, max) = self.delay.bounds()?;
        Ok((max / timestep_ms).round().max(0.0) as u32)
    }

    /// Build the synapses of this projection inside `window`
    ///
    /// Returns `(pre index, synapse)` pairs; synapse indices are relative to
    /// the window's post slice. Delays round to the nearest tick, halves away
    /// from zero, as in [`Projection::max_delay_ticks`].
    ///
    /// # Errors
    ///
    /// Returns error for invalid connectors, negative delays, and weights or
    /// delays that only the device can draw.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(
        &self,
        window: &ConnectionWindow,
        config: &CompileConfig,
        pre_label: &str,
        state: Option<&mut ConsumableState>,
    ) -> Result<Vec<(u32, Synapse)>> {
        let seed = mix_seed(config.seed, self.id.0 as u64);
        let connections = self.connector.build(&self.label, window, seed, state)?;
        let mut rng = StdRng::seed_from_u64(mix_seed(!seed, u64::from(window.post.start)));

        let mut synapses = Vec::with_capacity(connections.len());
        for c in connections {
            let weight = match c.weight {
                Some(w) => w,
                None => self.weight.sample("weight", &mut rng)?,
            };
            let delay_ms = match c.delay {
                Some(d) => d,
                None => self.delay.sample("delay", &mut rng)?,
            };
            let ticks = (delay_ms / config.timestep_ms).round();
            if !(ticks >= 0.0 && ticks <= f64::from(u32::MAX)) {
                return Err(CompileError::InvalidDelay {
                    population: pre_label.to_string(),
                    row: c.pre as usize,
                    delay: ticks as i64,
                });
            }
            synapses.push((
                c.pre,
                Synapse {
                    weight,
                    delay: ticks as u32,
                    index: c.post - window.post.start,
                },
            ));
        }
        Ok(synapses)
    }
}

/// Populations and projections of one model
#[derive(Debug, Clone, Default)]
pub struct Network {
    populations: Vec<Population>,
    projections: Vec<Projection>,
}

impl Network {
    /// Empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a population with default parameters
    pub fn add_population(&mut self, label: impl Into<String>, size: u32, cell: CellModel) -> PopulationId {
        let id = PopulationId(self.populations.len());
        self.populations.push(Population {
            id,
            label: label.into(),
            size,
            cell,
            parameters: ParameterSpace::new(size as usize),
            config: PopulationConfig::default(),
            incoming: BTreeMap::new(),
            outgoing: Vec::new(),
        });
        id
    }

    /// Connect two populations
    ///
    /// # Errors
    ///
    /// Returns error if a population is unknown, the receptor does not
    /// exist on the post-synaptic cell, or the connector, weight or delay is
    /// invalid.
    pub fn add_projection(&mut self, pre: PopulationId, post: PopulationId, spec: ProjectionSpec) -> Result<ProjectionId> {
        let id = ProjectionId(self.projections.len());
        let (pre_size, pre_label) = {
            let p = self.population(pre)?;
            (p.size, p.label.clone())
        };
        let post_pop = self.population(post)?;
        let label = spec
            .label
            .unwrap_or_else(|| format!("{pre_label}->{}#{}", post_pop.label, id.0));

        if post_pop.cell.receptor_index(&spec.receptor).is_none() {
            return Err(CompileError::invalid_connector(
                &label,
                format!("{} has no receptor {:?}", post_pop.cell, spec.receptor),
            ));
        }
        spec.connector.validate(&label, pre_size, post_pop.size)?;
        for param in [&spec.weight, &spec.delay] {
            if let SynapseParam::Random(dist) = param {
                dist.validate()?;
            }
        }

        let projection = Projection {
            id,
            label,
            pre,
            post,
            connector: spec.connector,
            synapse: spec.synapse,
            receptor: spec.receptor,
            weight: spec.weight,
            delay: spec.delay,
        };
        let key = projection.synapse_type();
        self.projections.push(projection);
        self.populations[post.0].incoming.entry(key).or_default().push(id);
        self.populations[pre.0].outgoing.push(id);
        Ok(id)
    }

    /// Look up a population
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnknownPopulation`] for a foreign id.
    pub fn population(&self, id: PopulationId) -> Result<&Population> {
        self.populations.get(id.0).ok_or_else(|| CompileError::UnknownPopulation {
            name: id.to_string(),
        })
    }

    /// Look up a population mutably
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnknownPopulation`] for a foreign id.
    pub fn population_mut(&mut self, id: PopulationId) -> Result<&mut Population> {
        self.populations.get_mut(id.0).ok_or_else(|| CompileError::UnknownPopulation {
            name: id.to_string(),
        })
    }

    /// Find a population by label
    pub fn find_population(&self, label: &str) -> Option<PopulationId> {
        self.populations.iter().find(|p| p.label == label).map(|p| p.id)
    }

    /// Every population
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    /// Every projection
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Look up a projection
    pub fn projection(&self, id: ProjectionId) -> Option<&Projection> {
        self.projections.get(id.0)
    }

    /// Whether a projection is realised as a direct current link
    pub fn is_directly_connectable(&self, projection: &Projection, config: &CompileConfig) -> bool {
        config.convert_direct_connections
            && projection.connector.directly_connectable()
            && self.populations[projection.pre.0].cell.directly_connectable()
            && !projection.weight.is_native()
            && !projection.delay.is_native()
    }

    /// Whether a population needs no neuron cores at all: every outgoing
    /// projection is a direct link
    pub fn entirely_directly_connectable(&self, id: PopulationId, config: &CompileConfig) -> bool {
        let population = &self.populations[id.0];
        config.convert_direct_connections
            && population.cell.directly_connectable()
            && !population.outgoing.is_empty()
            && population
                .outgoing
                .iter()
                .all(|p| self.is_directly_connectable(&self.projections[p.0], config))
    }

    /// Whether the device can generate a projection's synapses itself
    pub fn can_generate_on_chip(&self, projection: &Projection, timestep_ms: f64) -> bool {
        projection.connector.device_kind().is_some()
            && !projection.synapse.is_plastic()
            && projection.weight.device_generatable()
            && projection.delay.device_generatable()
            && projection
                .max_delay_ticks(timestep_ms)
                .is_ok_and(|ticks| ticks <= MAX_DTCM_DELAY)
    }

    /// Matrix window between a pre slice and a post slice of a projection
    pub fn window(&self, projection: &Projection, pre: NeuronSlice, post: NeuronSlice) -> ConnectionWindow {
        ConnectionWindow {
            pre,
            post,
            pre_size: self.populations[projection.pre.0].size,
            post_size: self.populations[projection.post.0].size,
            recurrent: projection.pre == projection.post,
        }
    }
}
