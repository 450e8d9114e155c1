//! Per-core width ("j") constraints
//!
//! Every processor kind caps how many neurons of a population one core can
//! serve. Neuron, synapse and current-input cores of a population are sliced
//! together, so their caps are rounded down to power-of-two multiples of the
//! smallest cap; slices of the widest kind then split evenly into slices of
//! every narrower kind.
//!
//! ```text
//! neuron 1024, synapse 512  ──►  min 512
//!   neuron   512 * 2^floor(log2(1024/512)) = 1024
//!   synapse  512
//!   cores    1024/1024 + 1024/512 = 3
//! ```

use crate::config::CompileConfig;
use crate::error::{CompileError, Result};
use crate::network::{Network, PopulationId, ProjectionId};
use crate::synapse::SynapseType;
use spinn_chip::machine::{timestep_multiplier, ChipResources};
use std::collections::BTreeMap;
use tracing::debug;

/// Rounded width constraints of one population
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JConstraints {
    /// Neurons per neuron core
    pub neuron: u32,
    /// Post-synaptic neurons per synapse core, by synapse type
    pub synapse: BTreeMap<SynapseType, u32>,
    /// Neurons per current-input core, by direct projection
    pub current_input: BTreeMap<ProjectionId, u32>,
    /// Cores needed to process one slice of the widest constraint
    pub cores: u32,
}

impl JConstraints {
    /// Widest constraint: the slice all kinds are cut from together
    pub fn width(&self) -> u32 {
        self.synapse
            .values()
            .chain(self.current_input.values())
            .copied()
            .fold(self.neuron, u32::max)
    }
}

/// Round `j` down to `min_j` times the largest power of two that fits
pub const fn round_j_constraint(j: u32, min_j: u32) -> u32 {
    let ratio = j / min_j;
    min_j << (31 - ratio.leading_zeros())
}

/// Derive and round the width constraints of a population
///
/// # Errors
///
/// Returns [`CompileError::TooManyCores`] if one slice needs more cores than
/// a chip provides, and [`CompileError::InvalidConstraint`] if a constraint
/// degenerates to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_constraints(
    network: &Network,
    id: PopulationId,
    config: &CompileConfig,
    chip: &ChipResources,
) -> Result<JConstraints> {
    let population = network.population(id)?;
    let invalid = |reason: String| CompileError::InvalidConstraint {
        population: population.label.clone(),
        reason,
    };

    let multiplier = timestep_multiplier(config.hardware_timestep_us);
    let neuron = (f64::from(population.cell.max_neurons_per_core()) * multiplier) as u32;
    debug!("{}: timestep multiplier {multiplier}, neuron j {neuron}", population.label);

    let mut synapse = BTreeMap::new();
    let mut current_input = BTreeMap::new();
    for (synapse_type, projections) in population.incoming() {
        let mut synaptic = false;
        for projection in projections.iter().filter_map(|p| network.projection(*p)) {
            if network.is_directly_connectable(projection, config) {
                let pre = network.population(projection.pre)?;
                let cap = pre.cell.max_current_inputs_per_core().ok_or_else(|| {
                    invalid(format!("{} cannot drive current inputs", pre.cell))
                })?;
                debug!("{}: direct projection {} current input j {cap}", population.label, projection.label);
                current_input.insert(projection.id, cap);
            } else {
                synaptic = true;
                synapse
                    .entry(synapse_type.clone())
                    .or_insert_with(|| projection.synapse.max_post_neurons_per_core());
            }
        }
        if synaptic {
            debug!("{}: synapse type {synapse_type} j {}", population.label, synapse[synapse_type]);
        }
    }

    let min_j = synapse
        .values()
        .chain(current_input.values())
        .copied()
        .fold(neuron, u32::min);
    if min_j == 0 {
        return Err(invalid(format!(
            "hardware timestep {} us leaves no neurons per core",
            config.hardware_timestep_us
        )));
    }

    let neuron = round_j_constraint(neuron, min_j);
    for j in synapse.values_mut().chain(current_input.values_mut()) {
        *j = round_j_constraint(*j, min_j);
    }

    let mut constraints = JConstraints {
        neuron,
        synapse,
        current_input,
        cores: 0,
    };
    let width = constraints.width();
    constraints.cores = width / constraints.neuron
        + constraints.synapse.values().map(|j| width / j).sum::<u32>()
        + constraints.current_input.values().map(|j| width / j).sum::<u32>();
    debug!("{}: width {width}, {} cores", population.label, constraints.cores);

    if constraints.cores > chip.cores_per_chip {
        return Err(CompileError::TooManyCores {
            population: population.label.clone(),
            cores: constraints.cores,
            budget: chip.cores_per_chip,
        });
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellModel;
    use crate::connectors::Connector;
    use crate::network::ProjectionSpec;
    use crate::synapse::{StdpParameters, SynapseModel};

    #[test]
    fn rounding() {
        assert_eq!(round_j_constraint(1024, 512), 1024);
        assert_eq!(round_j_constraint(1000, 256), 512);
        assert_eq!(round_j_constraint(256, 256), 256);
        assert_eq!(round_j_constraint(2048, 256), 2048);
        assert_eq!(round_j_constraint(700, 300), 600);
    }

    #[test]
    fn lone_population_uses_one_core() {
        let mut net = Network::new();
        let pop = net.add_population("lif", 2000, CellModel::IfCurrExp);
        let c = estimate_constraints(&net, pop, &CompileConfig::default(), &ChipResources::SPINNAKER).unwrap();
        assert_eq!(c.neuron, 1024);
        assert_eq!(c.width(), 1024);
        assert_eq!(c.cores, 1);
    }

    #[test]
    fn stdp_halves_synapse_width() {
        let mut net = Network::new();
        let src = net.add_population("src", 100, CellModel::SpikeSourcePoisson);
        let dst = net.add_population("dst", 2000, CellModel::IfCurrExp);
        let spec = ProjectionSpec::new(Connector::AllToAll { allow_self_connections: true })
            .synapse(SynapseModel::Stdp(StdpParameters::default()));
        net.add_projection(src, dst, spec).unwrap();
        let c = estimate_constraints(&net, dst, &CompileConfig::default(), &ChipResources::SPINNAKER).unwrap();
        assert_eq!(c.neuron, 1024);
        assert_eq!(c.synapse.values().copied().collect::<Vec<_>>(), vec![512]);
        assert_eq!(c.cores, 3);
    }

    #[test]
    fn direct_inputs_add_current_input_cores() {
        let mut net = Network::new();
        let src = net.add_population("src", 100, CellModel::SpikeSourcePoisson);
        let dst = net.add_population("dst", 100, CellModel::IfCurrExp);
        let p = net.add_projection(src, dst, ProjectionSpec::new(Connector::OneToOne)).unwrap();
        let c = estimate_constraints(&net, dst, &CompileConfig::default(), &ChipResources::SPINNAKER).unwrap();
        assert!(c.synapse.is_empty());
        assert_eq!(c.current_input[&p], 2048);
        assert_eq!(c.width(), 2048);
        assert_eq!(c.cores, 3);
    }

    #[test]
    fn fast_timestep_shrinks_neuron_width() {
        let mut net = Network::new();
        let pop = net.add_population("lif", 100, CellModel::IfCurrExp);
        let config = CompileConfig {
            hardware_timestep_us: 100,
            ..CompileConfig::default()
        };
        let c = estimate_constraints(&net, pop, &config, &ChipResources::SPINNAKER).unwrap();
        assert_eq!(c.neuron, 102);
    }

    #[test]
    fn degenerate_and_oversized_constraints() {
        let mut net = Network::new();
        let pop = net.add_population("lif", 100, CellModel::IfCurrExp);
        let config = CompileConfig {
            hardware_timestep_us: 0,
            ..CompileConfig::default()
        };
        assert!(matches!(
            estimate_constraints(&net, pop, &config, &ChipResources::SPINNAKER),
            Err(CompileError::InvalidConstraint { .. })
        ));

        let tiny = ChipResources {
            cores_per_chip: 1,
            ..ChipResources::SPINNAKER
        };
        let src = net.add_population("src", 100, CellModel::SpikeSourcePoisson);
        net.add_projection(src, pop, ProjectionSpec::new(Connector::AllToAll { allow_self_connections: true }))
            .unwrap();
        assert!(matches!(
            estimate_constraints(&net, pop, &CompileConfig::default(), &tiny),
            Err(CompileError::TooManyCores { cores: 2, budget: 1, .. })
        ));
    }
}
