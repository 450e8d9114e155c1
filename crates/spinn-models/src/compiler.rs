// SPDX-License-Identifier: AGPL-3.0-only

//! Compilation session
//!
//! A [`Compiler`] turns one [`Network`] into placed, loaded vertex images.
//! Each build gets its own session: nothing is shared between networks.
//!
//! ```text
//! compile  constraints ─► neuron clusters ─► synapse and current-input clusters
//! place    every vertex through the Placer
//! load     output buffers ─► synapse images ─► current-input images ─► neuron images
//! ```

use crate::cluster::{CurrentInputCluster, InputSource, NeuralCluster, SynapseCluster, VertexPlacement};
use crate::config::CompileConfig;
use crate::constraints::{estimate_constraints, JConstraints};
use crate::error::{CompileError, Result};
use crate::network::{Network, PopulationId, ProjectionId};
use spinn_chip::machine::ChipResources;
use spinn_driver::{ImageLoader, LoadConfig, MemoryTransport, Placer};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Partitioned network, ready for placement
#[derive(Debug, Clone, Default)]
pub struct CompiledNetwork {
    /// Width constraints of every population
    pub constraints: BTreeMap<PopulationId, JConstraints>,
    /// Neuron vertices of every population that needs neuron cores
    pub neural: BTreeMap<PopulationId, NeuralCluster>,
    /// Synapse vertices of every population with synaptic input, one cluster
    /// per synapse type
    pub synapse: BTreeMap<PopulationId, Vec<SynapseCluster>>,
    /// Current-input vertices of every population with direct input, one
    /// cluster per direct projection
    pub current_input: BTreeMap<PopulationId, Vec<CurrentInputCluster>>,
}

impl CompiledNetwork {
    /// Number of neuron vertices
    pub fn neuron_vertices(&self) -> usize {
        self.neural.values().map(|c| c.vertices.len()).sum()
    }

    /// Number of synapse vertices
    pub fn synapse_vertices(&self) -> usize {
        self.synapse.values().flatten().map(|c| c.vertices.len()).sum()
    }

    /// Number of current-input vertices
    pub fn current_input_vertices(&self) -> usize {
        self.current_input.values().flatten().map(|c| c.slices.len()).sum()
    }

    fn placements(&self) -> impl Iterator<Item = &VertexPlacement> {
        self.neural
            .values()
            .flat_map(NeuralCluster::placements)
            .chain(self.synapse.values().flatten().flat_map(SynapseCluster::placements))
            .chain(self.current_input.values().flatten().flat_map(CurrentInputCluster::placements))
    }
}

/// Summary of a load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    /// Vertex images written
    pub vertices: usize,
    /// Image bytes written
    pub bytes: usize,
    /// Wall-clock time of the load
    pub duration: Duration,
}

/// Compiles networks for one machine configuration
#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompileConfig,
    chip: ChipResources,
    load_config: LoadConfig,
}

impl Compiler {
    /// Compiler for the default chip
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: CompileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chip: ChipResources::SPINNAKER,
            load_config: LoadConfig::default(),
        })
    }

    /// Target a different chip
    #[must_use]
    pub const fn with_chip(mut self, chip: ChipResources) -> Self {
        self.chip = chip;
        self
    }

    /// Loader options, e.g. read-back verification
    #[must_use]
    pub const fn with_load_config(mut self, load_config: LoadConfig) -> Self {
        self.load_config = load_config;
        self
    }

    /// Configuration in use
    pub const fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Derive constraints and partition every population
    ///
    /// # Errors
    ///
    /// Returns the first constraint, evaluation or partitioning failure,
    /// naming the population it concerns.
    pub fn compile(&self, network: &Network) -> Result<CompiledNetwork> {
        let mut compiled = CompiledNetwork::default();
        for population in network.populations() {
            let constraints = estimate_constraints(network, population.id, &self.config, &self.chip)?;
            compiled.constraints.insert(population.id, constraints);
        }

        let mut neuron_vertices = BTreeMap::new();
        for population in network.populations() {
            if network.entirely_directly_connectable(population.id, &self.config) {
                info!("{}: every outgoing projection is direct, no neuron cores", population.label);
                continue;
            }
            let width = self.constraints(&compiled, population.id)?.neuron;
            let cluster = NeuralCluster::new(network, population.id, width, &self.config)?;
            neuron_vertices.insert(population.id, cluster.vertices.clone());
            compiled.neural.insert(population.id, cluster);
        }

        for population in network.populations() {
            let mut clusters = Vec::new();
            let mut inputs = Vec::new();
            for (synapse_type, projections) in population.incoming() {
                let (direct, synaptic): (Vec<ProjectionId>, Vec<ProjectionId>) =
                    projections.iter().copied().partition(|p| {
                        network
                            .projection(*p)
                            .is_some_and(|p| network.is_directly_connectable(p, &self.config))
                    });
                let widths = &self.constraints(&compiled, population.id)?.current_input;
                for projection in direct {
                    let width = widths.get(&projection).copied().ok_or_else(|| CompileError::InvalidConstraint {
                        population: population.label.clone(),
                        reason: format!("no current-input width for projection {}", projection.0),
                    })?;
                    inputs.push(CurrentInputCluster::new(network, projection, width, &self.config)?);
                }
                if synaptic.is_empty() {
                    continue;
                }
                let width = self
                    .constraints(&compiled, population.id)?
                    .synapse
                    .get(synapse_type)
                    .copied()
                    .ok_or_else(|| CompileError::InvalidConstraint {
                        population: population.label.clone(),
                        reason: format!("no width for synapse type {synapse_type}"),
                    })?;
                clusters.push(SynapseCluster::new(
                    network,
                    population.id,
                    synapse_type,
                    synaptic,
                    width,
                    &neuron_vertices,
                    &self.config,
                    &self.chip,
                )?);
            }
            if !clusters.is_empty() {
                compiled.synapse.insert(population.id, clusters);
            }
            if !inputs.is_empty() {
                compiled.current_input.insert(population.id, inputs);
            }
        }

        info!(
            "Compiled {} populations into {} neuron, {} synapse and {} current-input vertices",
            network.populations().len(),
            compiled.neuron_vertices(),
            compiled.synapse_vertices(),
            compiled.current_input_vertices()
        );
        Ok(compiled)
    }

    fn constraints<'a>(&self, compiled: &'a CompiledNetwork, id: PopulationId) -> Result<&'a JConstraints> {
        compiled
            .constraints
            .get(&id)
            .ok_or_else(|| CompileError::UnknownPopulation { name: id.to_string() })
    }

    /// Place every vertex
    ///
    /// # Errors
    ///
    /// Returns error naming the first vertex the placer rejects.
    pub fn place(&self, compiled: &mut CompiledNetwork, placer: &mut dyn Placer) -> Result<()> {
        for cluster in compiled.neural.values_mut() {
            cluster.place(placer, &self.config)?;
        }
        for cluster in compiled.synapse.values_mut().flatten() {
            cluster.place(placer)?;
        }
        for cluster in compiled.current_input.values_mut().flatten() {
            cluster.place(placer, &self.config)?;
        }
        debug!("Placed {} vertices", compiled.placements().count());
        Ok(())
    }

    /// Allocate output buffers, then load synapse, current-input and neuron
    /// images
    ///
    /// # Errors
    ///
    /// Returns the first failure naming its vertex. Loading is not
    /// transactional: vertices loaded before the failure stay loaded.
    pub fn load(
        &self,
        network: &Network,
        compiled: &mut CompiledNetwork,
        transport: &mut dyn MemoryTransport,
    ) -> Result<LoadReport> {
        let start = Instant::now();
        let loader = ImageLoader::new(self.load_config);

        for cluster in compiled.synapse.values_mut().flatten() {
            cluster.allocate_out_buffers(transport)?;
        }
        for cluster in compiled.current_input.values_mut().flatten() {
            cluster.allocate_out_buffers(transport)?;
        }
        for cluster in compiled.synapse.values_mut().flatten() {
            cluster.load(network, &self.config, transport, &loader)?;
        }
        for cluster in compiled.current_input.values_mut().flatten() {
            cluster.load(network, &self.config, transport, &loader)?;
        }
        for (id, cluster) in &mut compiled.neural {
            let synaptic = compiled.synapse.get(id).into_iter().flatten().map(|c| c as &dyn InputSource);
            let direct = compiled.current_input.get(id).into_iter().flatten().map(|c| c as &dyn InputSource);
            let inputs: Vec<&dyn InputSource> = synaptic.chain(direct).collect();
            cluster.load(&self.config, &inputs, transport, &loader)?;
        }

        let (vertices, bytes) = compiled
            .placements()
            .filter_map(|p| p.image.as_ref())
            .fold((0, 0), |(n, b), image| (n + 1, b + image.metrics.bytes_transferred));
        let report = LoadReport {
            vertices,
            bytes,
            duration: start.elapsed(),
        };
        info!("Loaded {} vertices, {} bytes in {:?}", report.vertices, report.bytes, report.duration);
        Ok(report)
    }

    /// Compile, place and load in one go
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage.
    pub fn run(
        &self,
        network: &Network,
        placer: &mut dyn Placer,
        transport: &mut dyn MemoryTransport,
    ) -> Result<(CompiledNetwork, LoadReport)> {
        let mut compiled = self.compile(network)?;
        self.place(&mut compiled, placer)?;
        let report = self.load(network, &mut compiled, transport)?;
        Ok((compiled, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellModel;
    use crate::connectors::Connector;
    use crate::network::ProjectionSpec;
    use spinn_chip::regions::NeuronRegion;
    use spinn_driver::{SequentialPlacer, SoftwareBackend};

    #[test]
    fn invalid_config_is_rejected() {
        let config = CompileConfig {
            timestep_ms: 0.0,
            ..CompileConfig::default()
        };
        assert!(matches!(Compiler::new(config), Err(CompileError::Config { .. })));
    }

    #[test]
    fn direct_projections_become_current_inputs() {
        let mut network = Network::new();
        let src = network.add_population("src", 100, CellModel::SpikeSourcePoisson);
        let dst = network.add_population("dst", 100, CellModel::IfCurrExp);
        network
            .add_projection(src, dst, ProjectionSpec::new(Connector::OneToOne).weight(0.5))
            .unwrap();

        let config = CompileConfig::default();
        let compiler = Compiler::new(config.clone()).unwrap();
        let mut placer = SequentialPlacer::new(1, 1, ChipResources::SPINNAKER);
        let mut backend = SoftwareBackend::reference();
        let (compiled, report) = compiler.run(&network, &mut placer, &mut backend).unwrap();

        assert!(!compiled.neural.contains_key(&src));
        assert!(compiled.synapse.is_empty());
        assert_eq!(compiled.current_input[&dst].len(), 1);
        assert_eq!(compiled.current_input_vertices(), 1);
        assert_eq!(report.vertices, 2);

        let links = compiled.current_input[&dst][0].read_connections(&config, &mut backend).unwrap();
        assert_eq!(links.len(), 100);
        assert!(links.iter().all(|l| l.pre == l.post));
        assert!(links.iter().all(|l| (l.weight - 0.5).abs() < 1e-3));
        assert!(links.iter().all(|l| (l.delay_ms - 1.0).abs() < 1e-9));

        // The neuron vertex reads the current-input output buffers
        let image = compiled.neural[&dst].placements()[0].image.as_ref().unwrap();
        let address = image.region(NeuronRegion::InputBuffer.slot()).unwrap();
        let count = backend.read(address, 4).unwrap();
        assert_eq!(u32::from_le_bytes(count.try_into().unwrap()), 1);
    }

    #[test]
    fn direct_links_stay_synaptic_when_conversion_is_off() {
        let mut network = Network::new();
        let src = network.add_population("src", 100, CellModel::SpikeSourcePoisson);
        let dst = network.add_population("dst", 100, CellModel::IfCurrExp);
        network.add_projection(src, dst, ProjectionSpec::new(Connector::OneToOne)).unwrap();

        let config = CompileConfig {
            convert_direct_connections: false,
            ..CompileConfig::default()
        };
        let compiled = Compiler::new(config).unwrap().compile(&network).unwrap();
        assert!(compiled.neural.contains_key(&src));
        assert_eq!(compiled.synapse[&dst].len(), 1);
        assert!(compiled.current_input.is_empty());
    }

    #[test]
    fn neuron_partition_follows_constraints() {
        let mut network = Network::new();
        let src = network.add_population("src", 2000, CellModel::IfCurrExp);
        let dst = network.add_population("dst", 2000, CellModel::IfCurrExp);
        network
            .add_projection(
                src,
                dst,
                ProjectionSpec::new(Connector::FixedProbability {
                    p_connect: 0.01,
                    allow_self_connections: true,
                }),
            )
            .unwrap();

        let compiled = Compiler::new(CompileConfig::default()).unwrap().compile(&network).unwrap();
        let widths: Vec<u32> = compiled.neural[&src].vertices.iter().map(|v| v.slice.len()).collect();
        assert_eq!(widths, vec![1024, 976]);
        assert_eq!(compiled.synapse[&dst].len(), 1);
        assert_eq!(compiled.synapse_vertices(), 2);
    }
}
