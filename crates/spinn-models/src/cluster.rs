//! Neuron and synapse clusters
//!
//! A cluster is the set of vertices one population needs for one role:
//! a [`NeuralCluster`] per population with neuron cores, a
//! [`SynapseCluster`] per incoming synapse type and a
//! [`CurrentInputCluster`] per incoming direct projection. Clusters carry
//! their vertices from partitioning through placement to loading, and read
//! recorded data back afterwards.
//!
//! ```text
//! partition ─► place ─► allocate output buffers ─► load synapses ─► load current inputs ─► load neurons
//! ```
//!
//! Synapse and current-input vertices load before neurons: their weight
//! fixed points are only known once every row of a post slice has been
//! built, and neuron vertices record them in their input buffer region.

use crate::config::CompileConfig;
use crate::connectors::ConsumableState;
use crate::error::{CompileError, Result};
use crate::matrix::{
    decode_weight, encode_weight, key_lookup_entries, place_matrices, Generation, MatrixPlacement, PreVertex,
    SplitRow, SubMatrix, Synapse, SynapticMatrix,
};
use crate::network::{Network, PopulationId, Projection, ProjectionId};
use crate::params::{apply, MapContext, ParamRecords, Transform, TransformContext};
use crate::partition::{partition_neurons, partition_synapses, NeuronVertex, SynapseVertex};
use crate::random::{mix_seed, SynapseParam};
use crate::regions::{
    ConnectionBuilderRegion, DelayBufferRegion, DirectInput, DirectInputRegion, GeneratorParams, InputBuffer,
    InputBufferRegion, KeyLookupRegion, OnChipMatrix, OutputBufferRegion, ParameterRegion, ProfileSample,
    ProfilerRegion, Region, StatisticsRegion, SynapticMatrixRegion, SystemRegion, CURRENT_INPUT_STATISTICS,
    NEURON_PROFILER_TAGS, NEURON_STATISTICS, SYNAPSE_PROFILER_TAGS, SYNAPSE_STATISTICS,
};
use crate::slice::{split_slice, NeuronSlice};
use crate::synapse::{SynapseModel, SynapseType};
use crate::weights::WeightRange;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use spinn_chip::machine::ChipResources;
use spinn_chip::regions::{CurrentInputRegion, NeuronRegion, SynapseRegion};
use spinn_driver::{
    CoreLocation, DeviceAddress, ImageLoader, LoadedImage, MemoryTransport, Placer, VertexImage, VertexResources,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Mask selecting the vertex part of a spike key
pub const KEY_MASK: u32 = 0xFFFF_FC00;

/// Fractional bits of the neuron state format
const NEURON_FIXED_POINT: u32 = 15;

/// Spike routing of the `index`th neuron vertex of `population`
#[allow(clippy::cast_possible_truncation)]
pub const fn vertex_key(population: PopulationId, index: usize) -> u32 {
    ((population.0 as u32) << 16) | ((index as u32) << 10)
}

/// Where one vertex ended up
#[derive(Debug, Clone)]
pub struct VertexPlacement {
    /// Core running the vertex
    pub core: CoreLocation,
    /// Output buffers (synapse vertices only)
    pub out_buffers: Option<[DeviceAddress; 2]>,
    /// Loaded image, once loaded
    pub image: Option<LoadedImage>,
}

impl VertexPlacement {
    const fn new(core: CoreLocation) -> Self {
        Self {
            core,
            out_buffers: None,
            image: None,
        }
    }
}

fn placed<'a>(placements: &'a [VertexPlacement], index: usize, label: &str) -> Result<&'a VertexPlacement> {
    placements
        .get(index)
        .ok_or_else(|| CompileError::config(format!("vertex {label} has not been placed")))
}

fn build_image(label: &str, slots: usize, slice: &NeuronSlice, regions: &[(usize, &dyn Region)]) -> Result<VertexImage> {
    let mut image = VertexImage::new(label, slots);
    for (slot, region) in regions {
        image = image.with_region(*slot, region.serialize(slice)?);
    }
    Ok(image)
}

fn image_size(slots: usize, slice: &NeuronSlice, regions: &[&dyn Region]) -> usize {
    slots * 4 + regions.iter().map(|r| r.size_of(slice)).sum::<usize>()
}

fn read_region(
    transport: &mut dyn MemoryTransport,
    label: &str,
    address: DeviceAddress,
    len: usize,
) -> Result<Vec<u8>> {
    transport
        .read(address, len)
        .map_err(|e| CompileError::loading(label, e))
}

/// Vertices whose output buffers feed neuron slices
pub trait InputSource {
    /// Output buffers of loaded vertices that cover part of `slice`
    ///
    /// # Errors
    ///
    /// Returns error if an overlapping vertex has not been loaded.
    fn input_buffers(&self, slice: &NeuronSlice) -> Result<Vec<InputBuffer>>;
}

/// Allocate both output buffers of a placed vertex of `neurons` neurons
fn allocate_pair(
    transport: &mut dyn MemoryTransport,
    placement: &mut VertexPlacement,
    neurons: u32,
    label: &str,
) -> Result<()> {
    let bytes = neurons as usize * 4;
    let core = placement.core;
    let mut allocate = || transport.allocate(core, bytes).map_err(|e| CompileError::loading(label, e));
    let buffers = [allocate()?, allocate()?];
    debug!("{label}: output buffers at {} and {}", buffers[0], buffers[1]);
    placement.out_buffers = Some(buffers);
    Ok(())
}

/// Neuron vertices of one population
#[derive(Debug, Clone)]
pub struct NeuralCluster {
    /// Population
    pub population: PopulationId,
    /// Population label
    pub label: String,
    /// Vertices, in slice order
    pub vertices: Vec<NeuronVertex>,
    neuron: ParameterRegion,
    synapse: ParameterRegion,
    num_profile_samples: Option<u32>,
    placements: Vec<VertexPlacement>,
}

impl NeuralCluster {
    /// Partition a population and evaluate its parameter regions
    ///
    /// # Errors
    ///
    /// Returns error if a parameter cannot be evaluated or encoded.
    pub fn new(network: &Network, id: PopulationId, width: u32, config: &CompileConfig) -> Result<Self> {
        let population = network.population(id)?;
        let native = population.native_parameters();
        let cell = population.cell;

        let mut rng = StdRng::seed_from_u64(mix_seed(config.seed, (1 << 32) | id.0 as u64));
        let mut ctx = MapContext::new(TransformContext::new(config.timestep_ms), &mut rng);
        let neuron = ParameterRegion::per_neuron(
            "neuron",
            vec![
                apply(&native, cell.neuron_mutable_param_map(), &mut ctx)?,
                apply(&native, cell.neuron_immutable_param_map(), &mut ctx)?,
            ],
        );
        let synapse = ParameterRegion::per_neuron(
            "synapse",
            vec![
                apply(&native, cell.synapse_mutable_param_map(), &mut ctx)?,
                apply(&native, cell.synapse_immutable_param_map(), &mut ctx)?,
            ],
        );

        let vertices = partition_neurons(id, population.size, width);
        debug!("{}: {} neuron vertices of width {width}", population.label, vertices.len());
        Ok(Self {
            population: id,
            label: population.label.clone(),
            vertices,
            neuron,
            synapse,
            num_profile_samples: population.config.num_profile_samples.or(config.num_profile_samples),
            placements: Vec::new(),
        })
    }

    /// Diagnostic label of vertex `index`
    pub fn vertex_label(&self, index: usize) -> String {
        format!("{}/neurons/{index}", self.label)
    }

    fn system(&self, slice: &NeuronSlice, config: &CompileConfig) -> SystemRegion {
        SystemRegion {
            application_words: vec![NEURON_FIXED_POINT, slice.len(), u32::from(config.flush)],
            timer_period_us: config.timer_period_us(),
            sim_ticks: config.sim_ticks(),
        }
    }

    fn profiler(&self) -> Option<ProfilerRegion> {
        self.num_profile_samples.map(|num_samples| ProfilerRegion { num_samples })
    }

    /// Memory a vertex will allocate, without its input buffer table
    pub fn resources(&self, vertex: &NeuronVertex, config: &CompileConfig) -> VertexResources {
        let system = self.system(&vertex.slice, config);
        let statistics = StatisticsRegion {
            names: &NEURON_STATISTICS,
        };
        let profiler = self.profiler();
        let mut regions: Vec<&dyn Region> = vec![&system, &self.neuron, &self.synapse, &statistics];
        if let Some(profiler) = &profiler {
            regions.push(profiler);
        }
        VertexResources::single_core(image_size(NeuronRegion::COUNT, &vertex.slice, &regions))
    }

    /// Place every vertex
    ///
    /// # Errors
    ///
    /// Returns error naming the vertex the placer rejected.
    pub fn place(&mut self, placer: &mut dyn Placer, config: &CompileConfig) -> Result<()> {
        self.placements = self
            .vertices
            .iter()
            .map(|v| {
                let label = self.vertex_label(v.index);
                placer
                    .place(&label, &self.resources(v, config))
                    .map(VertexPlacement::new)
                    .map_err(|e| CompileError::loading(label, e))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Load every vertex, fed by the output buffers of `inputs`
    ///
    /// # Errors
    ///
    /// Returns the first serialization or transport failure; vertices loaded
    /// before it stay loaded.
    pub fn load(
        &mut self,
        config: &CompileConfig,
        inputs: &[&dyn InputSource],
        transport: &mut dyn MemoryTransport,
        loader: &ImageLoader,
    ) -> Result<()> {
        for (i, vertex) in self.vertices.iter().enumerate() {
            let label = self.vertex_label(i);
            let core = placed(&self.placements, i, &label)?.core;

            let mut input = InputBufferRegion::default();
            for source in inputs {
                input.buffers.extend(source.input_buffers(&vertex.slice)?);
            }
            let system = self.system(&vertex.slice, config);
            let statistics = StatisticsRegion {
                names: &NEURON_STATISTICS,
            };
            let profiler = self.profiler();

            let mut regions: Vec<(usize, &dyn Region)> = vec![
                (NeuronRegion::System.slot(), &system),
                (NeuronRegion::Neuron.slot(), &self.neuron),
                (NeuronRegion::Synapse.slot(), &self.synapse),
                (NeuronRegion::InputBuffer.slot(), &input),
            ];
            if let Some(profiler) = &profiler {
                regions.push((NeuronRegion::Profiler.slot(), profiler));
            }
            regions.push((NeuronRegion::Statistics.slot(), &statistics));

            let image = build_image(&label, NeuronRegion::COUNT, &vertex.slice, &regions)?;
            let loaded = loader
                .load(core, &image, transport)
                .map_err(|e| CompileError::loading(&label, e))?;
            debug!("{label}: {} input buffers", input.buffers.len());
            self.placements[i].image = Some(loaded);
        }
        Ok(())
    }

    /// Placements, in vertex order
    pub fn placements(&self) -> &[VertexPlacement] {
        &self.placements
    }

    /// Read the profiler samples of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails or returns a malformed region.
    pub fn read_profile(&self, transport: &mut dyn MemoryTransport) -> Result<Vec<(NeuronSlice, Vec<ProfileSample>)>> {
        let Some(profiler) = self.profiler() else {
            return Ok(Vec::new());
        };
        let mut profiles = Vec::new();
        for (vertex, placement) in self.vertices.iter().zip(&self.placements) {
            let Some(address) = placement.image.as_ref().and_then(|i| i.region(NeuronRegion::Profiler.slot())) else {
                continue;
            };
            let label = self.vertex_label(vertex.index);
            let data = read_region(transport, &label, address, profiler.size_of(&vertex.slice))?;
            profiles.push((vertex.slice, ProfilerRegion::read_profile(&data, &NEURON_PROFILER_TAGS)?));
        }
        Ok(profiles)
    }

    /// Read the statistics of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails.
    pub fn read_statistics(&self, transport: &mut dyn MemoryTransport) -> Result<Vec<Vec<(&'static str, u32)>>> {
        let region = StatisticsRegion {
            names: &NEURON_STATISTICS,
        };
        let mut stats = Vec::new();
        for (vertex, placement) in self.vertices.iter().zip(&self.placements) {
            let Some(address) = placement.image.as_ref().and_then(|i| i.region(NeuronRegion::Statistics.slot()))
            else {
                continue;
            };
            let label = self.vertex_label(vertex.index);
            let data = read_region(transport, &label, address, region.size_of(&vertex.slice))?;
            stats.push(region.read_stats(&data)?);
        }
        Ok(stats)
    }
}

/// Sub-matrices written to one synapse vertex
#[derive(Debug, Clone)]
pub struct LoadedMatrices {
    /// Fixed point of every weight in the matrix
    pub weight_fixed_point: u32,
    /// Sub-matrix shapes
    pub subs: Vec<SubMatrix>,
    /// Word offsets of the sub-matrices
    pub placement: MatrixPlacement,
}

/// A synapse read back from the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynapseReadback {
    /// Pre-synaptic neuron
    pub pre: u32,
    /// Post-synaptic neuron
    pub post: u32,
    /// Weight
    pub weight: f64,
    /// Delay in milliseconds
    pub delay_ms: f64,
}

/// Rows of one post slice, built before any vertex of the slice is written
struct SliceRows {
    weight_fixed_point: u32,
    /// Unsorted rows of every host-built projection, indexed by pre neuron
    host: BTreeMap<ProjectionId, Vec<Vec<Synapse>>>,
    on_chip: BTreeMap<PopulationId, ProjectionId>,
}

/// Synapse vertices of one synapse type of one population
#[derive(Debug, Clone)]
pub struct SynapseCluster {
    /// Post-synaptic population
    pub post: PopulationId,
    /// Post-synaptic population label
    pub label: String,
    /// Synapse model and receptor served
    pub synapse_type: SynapseType,
    /// Receptor index on the post-synaptic cell
    pub receptor_index: u32,
    /// Synaptic projections served, in insertion order
    pub projections: Vec<ProjectionId>,
    /// Post slices of the synapse width
    pub post_slices: Vec<NeuronSlice>,
    /// Vertices, grouped by post slice
    pub vertices: Vec<SynapseVertex>,
    matrix: SynapticMatrix,
    pre_slices: BTreeMap<PopulationId, Vec<NeuronSlice>>,
    max_delay_ticks: u32,
    num_profile_samples: Option<u32>,
    placements: Vec<VertexPlacement>,
    matrices: Vec<Option<LoadedMatrices>>,
}

impl SynapseCluster {
    /// Partition one synapse type of `post`
    ///
    /// The synapse model of the type's first projection is used for every
    /// projection of the type.
    ///
    /// # Errors
    ///
    /// Returns error if the receptor is unknown, a delay cannot be bounded or
    /// partitioning fails.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: &Network,
        post: PopulationId,
        synapse_type: &SynapseType,
        projections: Vec<ProjectionId>,
        width: u32,
        neuron_vertices: &BTreeMap<PopulationId, Vec<NeuronVertex>>,
        config: &CompileConfig,
        chip: &ChipResources,
    ) -> Result<Self> {
        let population = network.population(post)?;
        let first = projections
            .first()
            .and_then(|p| network.projection(*p))
            .ok_or_else(|| CompileError::config(format!("synapse type {synapse_type} has no projections")))?;
        let model: SynapseModel = first.synapse;
        let receptor_index = population
            .cell
            .receptor_index(&synapse_type.receptor)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| {
                CompileError::config(format!("{} has no receptor {}", population.cell, synapse_type.receptor))
            })?;

        let matrix = SynapticMatrix::new(model);
        let vertices =
            partition_synapses(network, post, &projections, width, neuron_vertices, &matrix, config, chip)?;

        let mut max_delay_ticks = 0;
        let mut pre_slices = BTreeMap::new();
        for projection in projections.iter().filter_map(|p| network.projection(*p)) {
            max_delay_ticks = max_delay_ticks.max(projection.max_delay_ticks(config.timestep_ms)?);
            if let Some(pre) = neuron_vertices.get(&projection.pre) {
                pre_slices.insert(projection.pre, pre.iter().map(|v| v.slice).collect());
            }
        }
        info!(
            "{} {synapse_type}: {} synapse vertices over {} projections",
            population.label,
            vertices.len(),
            projections.len()
        );

        Ok(Self {
            post,
            label: population.label.clone(),
            synapse_type: synapse_type.clone(),
            receptor_index,
            projections,
            post_slices: split_slice(population.size, width),
            vertices,
            matrix,
            pre_slices,
            max_delay_ticks,
            num_profile_samples: population.config.num_profile_samples.or(config.num_profile_samples),
            placements: Vec::new(),
            matrices: Vec::new(),
        })
    }

    /// Synapse model of the cluster
    pub const fn model(&self) -> &SynapseModel {
        self.matrix.model()
    }

    /// Diagnostic label of vertex `index`
    pub fn vertex_label(&self, index: usize) -> String {
        format!("{}/synapses-{}/{index}", self.label, self.synapse_type.receptor)
    }

    /// Place every vertex
    ///
    /// # Errors
    ///
    /// Returns error naming the vertex the placer rejected.
    pub fn place(&mut self, placer: &mut dyn Placer) -> Result<()> {
        self.placements = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let label = self.vertex_label(i);
                placer
                    .place(&label, &VertexResources::single_core(v.sdram_bytes))
                    .map(VertexPlacement::new)
                    .map_err(|e| CompileError::loading(label, e))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Allocate both output buffers of every vertex on its chip
    ///
    /// # Errors
    ///
    /// Returns error if a vertex is unplaced or an allocation fails.
    pub fn allocate_out_buffers(&mut self, transport: &mut dyn MemoryTransport) -> Result<()> {
        for (i, vertex) in self.vertices.iter().enumerate() {
            let label = self.vertex_label(i);
            placed(&self.placements, i, &label)?;
            allocate_pair(transport, &mut self.placements[i], vertex.post_slice.len(), &label)?;
        }
        Ok(())
    }

    /// Build rows, fix weight formats and load every vertex
    ///
    /// Post slices are processed in order; within a slice every row is built
    /// before the weight fixed point is chosen.
    ///
    /// # Errors
    ///
    /// Returns the first build, serialization or transport failure; vertices
    /// loaded before it stay loaded.
    pub fn load(
        &mut self,
        network: &Network,
        config: &CompileConfig,
        transport: &mut dyn MemoryTransport,
        loader: &ImageLoader,
    ) -> Result<()> {
        let post_size = network.population(self.post)?.size;
        let projections: Vec<&Projection> = self.projections.iter().filter_map(|p| network.projection(*p)).collect();
        let mut states = BTreeMap::new();
        for projection in &projections {
            let pre_size = network.population(projection.pre)?.size;
            if let Some(state) = projection.connector.initial_state(pre_size, post_size) {
                states.insert(projection.id, state);
            }
        }

        let mut by_pre: Vec<(PopulationId, Vec<&Projection>)> = Vec::new();
        for projection in &projections {
            match by_pre.iter_mut().find(|(p, _)| *p == projection.pre) {
                Some((_, group)) => group.push(projection),
                None => by_pre.push((projection.pre, vec![projection])),
            }
        }

        self.matrices = vec![None; self.vertices.len()];
        for (slice_index, post_slice) in self.post_slices.clone().into_iter().enumerate() {
            let members: Vec<usize> = (0..self.vertices.len())
                .filter(|&v| self.vertices[v].post_slice_index == slice_index)
                .collect();
            if members.is_empty() {
                continue;
            }
            let rows = self.build_rows(network, config, post_slice, &members, &by_pre, &mut states)?;
            for v in members {
                self.load_vertex(network, config, v, &rows, &mut states, transport, loader)?;
            }
        }
        Ok(())
    }

    fn build_rows(
        &self,
        network: &Network,
        config: &CompileConfig,
        post_slice: NeuronSlice,
        members: &[usize],
        by_pre: &[(PopulationId, Vec<&Projection>)],
        states: &mut BTreeMap<ProjectionId, ConsumableState>,
    ) -> Result<SliceRows> {
        let mut range = WeightRange::new(self.model().signed_weight());
        let mut host = BTreeMap::new();
        let mut on_chip = BTreeMap::new();
        for (pre, group) in by_pre {
            if !members.iter().any(|&v| self.vertices[v].serves(*pre)) {
                continue;
            }
            match group.as_slice() {
                [only] if network.can_generate_on_chip(only, config.timestep_ms) => {
                    // The device draws weights later; bound them now
                    let (low, high) = only.weight.bounds()?;
                    range.update(low);
                    range.update(high);
                    on_chip.insert(*pre, only.id);
                }
                _ => {
                    let pre_population = network.population(*pre)?;
                    for projection in group {
                        let mut rows = vec![Vec::new(); pre_population.size as usize];
                        let window = network.window(projection, NeuronSlice::whole(pre_population.size), post_slice);
                        let state = states.get_mut(&projection.id);
                        for (row, synapse) in projection.build(&window, config, &pre_population.label, state)? {
                            range.update(synapse.weight);
                            rows[row as usize].push(synapse);
                        }
                        host.insert(projection.id, rows);
                    }
                }
            }
        }
        debug!(
            "{} {post_slice}: {} projections built on host, {} on chip",
            self.label,
            host.len(),
            on_chip.len()
        );
        self.model().update_weight_range(&mut range);
        let weight_fixed_point = range.fixed_point();
        debug!("{} {post_slice}: weight fixed point {weight_fixed_point}", self.label);
        Ok(SliceRows {
            weight_fixed_point,
            host,
            on_chip,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn load_vertex(
        &mut self,
        network: &Network,
        config: &CompileConfig,
        index: usize,
        rows: &SliceRows,
        states: &mut BTreeMap<ProjectionId, ConsumableState>,
        transport: &mut dyn MemoryTransport,
        loader: &ImageLoader,
    ) -> Result<()> {
        let label = self.vertex_label(index);
        let placement = placed(&self.placements, index, &label)?;
        let core = placement.core;
        let out_buffers = placement
            .out_buffers
            .ok_or_else(|| CompileError::config(format!("{label}: output buffers not allocated")))?;
        let vertex = &self.vertices[index];
        let post_slice = vertex.post_slice;
        let fixed_point = rows.weight_fixed_point;

        let mut subs = Vec::new();
        let mut sub_rows: Vec<Option<Vec<SplitRow>>> = Vec::new();
        for (pre, pre_vertices) in vertex.pre_vertices() {
            let slices = self.pre_slices.get(&pre).map_or(&[][..], Vec::as_slice);
            for pre_vertex in pre_vertices {
                let Some(&slice) = slices.get(pre_vertex) else { continue };
                let routing = PreVertex {
                    slice,
                    key: vertex_key(pre, pre_vertex),
                    mask: KEY_MASK,
                };
                if let Some(&projection_id) = rows.on_chip.get(&pre) {
                    let projection = network
                        .projection(projection_id)
                        .ok_or_else(|| CompileError::config(format!("unknown projection {}", projection_id.0)))?;
                    let window = network.window(projection, slice, post_slice);
                    let max_cols = projection.connector.estimate_max_row_synapses(&window) as usize;
                    subs.push(self.matrix.on_chip_sub_matrix(pre, pre_vertex, routing, max_cols, projection_id));
                    sub_rows.push(None);
                    continue;
                }
                // Merge the projections this vertex took from the pre vertex
                let mut merged = vec![Vec::new(); slice.len() as usize];
                for projection in vertex.projections_from(pre, pre_vertex) {
                    let Some(built) = rows.host.get(&projection).and_then(|r| r.get(slice.range())) else {
                        continue;
                    };
                    for (row, synapses) in merged.iter_mut().zip(built) {
                        row.extend_from_slice(synapses);
                    }
                }
                for row in &mut merged {
                    row.sort_by_key(|s| s.index);
                }
                if let Some((sub, split)) = self.matrix.host_sub_matrix(pre, pre_vertex, routing, &merged) {
                    subs.push(sub);
                    sub_rows.push(Some(split));
                }
            }
        }

        let placement = place_matrices(&subs);
        let matrix = SynapticMatrixRegion {
            words: self.matrix.write_matrices(&subs, &sub_rows, &placement, fixed_point)?,
        };
        let key_lookup = KeyLookupRegion {
            entries: key_lookup_entries(&subs, &placement),
        };
        let mut builder = ConnectionBuilderRegion::default();
        for (sub, &offset) in subs.iter().zip(&placement.offsets) {
            if let Generation::OnChip(projection) = sub.generation {
                builder
                    .matrices
                    .push(on_chip_matrix(network, config, projection, sub, offset, post_slice, fixed_point, states)?);
            }
        }

        let system = SystemRegion {
            application_words: vec![fixed_point, post_slice.len(), u32::from(config.flush)],
            timer_period_us: config.timer_period_us(),
            sim_ticks: config.sim_ticks(),
        };
        let plasticity = match self.model().plasticity_param_map() {
            Some(fields) => {
                let mut rng = StdRng::seed_from_u64(config.seed);
                let ctx = TransformContext::new(config.timestep_ms).with_weight_fixed_point(fixed_point);
                let records = apply(
                    &self.model().plasticity_parameters(),
                    fields,
                    &mut MapContext::new(ctx, &mut rng),
                )?;
                Some(ParameterRegion::homogeneous("plasticity", vec![records]))
            }
            None => None,
        };
        let output = OutputBufferRegion {
            addresses: [out_buffers[0].address, out_buffers[1].address],
        };
        let rows_per_slot: u32 = subs.iter().map(|s| s.pre.slice.len()).sum();
        let delay = DelayBufferRegion::new(self.max_delay_ticks, rows_per_slot);
        let profiler = self.num_profile_samples.map(|num_samples| ProfilerRegion { num_samples });
        let statistics = StatisticsRegion {
            names: &SYNAPSE_STATISTICS,
        };

        let mut regions: Vec<(usize, &dyn Region)> = vec![
            (SynapseRegion::System.slot(), &system),
            (SynapseRegion::KeyLookup.slot(), &key_lookup),
            (SynapseRegion::SynapticMatrix.slot(), &matrix),
        ];
        if let Some(plasticity) = &plasticity {
            regions.push((SynapseRegion::Plasticity.slot(), plasticity));
        }
        regions.push((SynapseRegion::OutputBuffer.slot(), &output));
        regions.push((SynapseRegion::DelayBuffer.slot(), &delay));
        regions.push((SynapseRegion::ConnectionBuilder.slot(), &builder));
        if let Some(profiler) = &profiler {
            regions.push((SynapseRegion::Profiler.slot(), profiler));
        }
        regions.push((SynapseRegion::Statistics.slot(), &statistics));

        let image = build_image(&label, SynapseRegion::COUNT, &post_slice, &regions)?;
        let loaded = loader
            .load(core, &image, transport)
            .map_err(|e| CompileError::loading(&label, e))?;
        debug!(
            "{label}: {} sub-matrices ({} on chip), {} matrix words",
            subs.len(),
            builder.matrices.len(),
            placement.total_words
        );
        self.placements[index].image = Some(loaded);
        self.matrices[index] = Some(LoadedMatrices {
            weight_fixed_point: fixed_point,
            subs,
            placement,
        });
        Ok(())
    }

    /// Placements, in vertex order
    pub fn placements(&self) -> &[VertexPlacement] {
        &self.placements
    }

    /// Matrices of loaded vertices, in vertex order
    pub fn matrices(&self) -> &[Option<LoadedMatrices>] {
        &self.matrices
    }

    /// Read the profiler samples of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails or returns a malformed region.
    pub fn read_profile(&self, transport: &mut dyn MemoryTransport) -> Result<Vec<(NeuronSlice, Vec<ProfileSample>)>> {
        let Some(num_samples) = self.num_profile_samples else {
            return Ok(Vec::new());
        };
        let region = ProfilerRegion { num_samples };
        let mut profiles = Vec::new();
        for (i, (vertex, placement)) in self.vertices.iter().zip(&self.placements).enumerate() {
            let Some(address) = placement.image.as_ref().and_then(|m| m.region(SynapseRegion::Profiler.slot()))
            else {
                continue;
            };
            let data = read_region(transport, &self.vertex_label(i), address, region.size_of(&vertex.post_slice))?;
            profiles.push((
                vertex.post_slice,
                ProfilerRegion::read_profile(&data, &SYNAPSE_PROFILER_TAGS)?,
            ));
        }
        Ok(profiles)
    }

    /// Read the statistics of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails.
    pub fn read_statistics(&self, transport: &mut dyn MemoryTransport) -> Result<Vec<Vec<(&'static str, u32)>>> {
        let region = StatisticsRegion {
            names: &SYNAPSE_STATISTICS,
        };
        let mut stats = Vec::new();
        for (i, (vertex, placement)) in self.vertices.iter().zip(&self.placements).enumerate() {
            let Some(address) = placement.image.as_ref().and_then(|m| m.region(SynapseRegion::Statistics.slot()))
            else {
                continue;
            };
            let data = read_region(transport, &self.vertex_label(i), address, region.size_of(&vertex.post_slice))?;
            stats.push(region.read_stats(&data)?);
        }
        Ok(stats)
    }

    /// Read back and decode every host-built synapse from `pre`
    ///
    /// Sub-matrices generated on chip are decoded too once the device has
    /// filled them.
    ///
    /// # Errors
    ///
    /// Returns error if a read fails or a row chain is malformed.
    pub fn read_synaptic_matrices(
        &self,
        pre: PopulationId,
        config: &CompileConfig,
        transport: &mut dyn MemoryTransport,
    ) -> Result<Vec<SynapseReadback>> {
        let mut synapses = Vec::new();
        for (i, (vertex, placement)) in self.vertices.iter().zip(&self.placements).enumerate() {
            let Some(matrices) = self.matrices.get(i).and_then(Option::as_ref) else {
                continue;
            };
            if !matrices.subs.iter().any(|s| s.pre_population == pre) {
                continue;
            }
            let Some(address) =
                placement.image.as_ref().and_then(|m| m.region(SynapseRegion::SynapticMatrix.slot()))
            else {
                continue;
            };
            let label = self.vertex_label(i);
            let data = read_region(transport, &label, address, matrices.placement.total_words * 4)?;
            let words: Vec<u32> = data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            for (sub, &offset) in matrices.subs.iter().zip(&matrices.placement.offsets) {
                if sub.pre_population != pre {
                    continue;
                }
                let read =
                    self.matrix
                        .read_sub_matrix(&words, sub, offset, vertex.post_slice, matrices.weight_fixed_point)?;
                synapses.extend(read.into_iter().map(|s| SynapseReadback {
                    pre: s.pre,
                    post: s.post,
                    weight: s.weight,
                    delay_ms: f64::from(s.delay) * config.timestep_ms,
                }));
            }
        }
        Ok(synapses)
    }
}

impl InputSource for SynapseCluster {
    fn input_buffers(&self, slice: &NeuronSlice) -> Result<Vec<InputBuffer>> {
        let mut buffers = Vec::new();
        for (i, vertex) in self.vertices.iter().enumerate() {
            let Some(overlap) = vertex.post_slice.overlap(slice) else {
                continue;
            };
            let label = self.vertex_label(i);
            let not_loaded = || CompileError::config(format!("{label} must be loaded before its neurons"));
            let addresses = self
                .placements
                .get(i)
                .and_then(|p| p.out_buffers)
                .ok_or_else(not_loaded)?;
            let matrices = self.matrices.get(i).and_then(Option::as_ref).ok_or_else(not_loaded)?;
            buffers.push(InputBuffer {
                addresses: [addresses[0].address, addresses[1].address],
                receptor: self.receptor_index,
                weight_fixed_point: matrices.weight_fixed_point,
                buffer_offset: overlap.start - vertex.post_slice.start,
                neuron_offset: overlap.start - slice.start,
                neurons: overlap.len(),
            });
        }
        Ok(buffers)
    }
}

/// Current-input vertices of one direct projection
///
/// Each vertex simulates the source cells of a slice and writes their
/// weighted spikes into output buffers the post-synaptic neuron vertices
/// read as ordinary input. Neuron `i` of the source drives neuron `i` of the
/// target, so vertices cover the neurons both populations share.
#[derive(Debug, Clone)]
pub struct CurrentInputCluster {
    /// Direct projection realised
    pub projection: ProjectionId,
    /// Source population
    pub pre: PopulationId,
    /// Target population
    pub post: PopulationId,
    /// Projection label
    pub label: String,
    /// Receptor index on the target cell
    pub receptor_index: u32,
    /// Vertex slices, in order
    pub slices: Vec<NeuronSlice>,
    source: ParameterRegion,
    signed_weight: bool,
    placements: Vec<VertexPlacement>,
    weight_fixed_points: Vec<Option<u32>>,
}

impl CurrentInputCluster {
    /// Partition a direct projection into slices of `width`
    ///
    /// # Errors
    ///
    /// Returns error if the projection is unknown, the receptor does not
    /// exist or the source parameters cannot be evaluated.
    pub fn new(network: &Network, projection: ProjectionId, width: u32, config: &CompileConfig) -> Result<Self> {
        let p = network
            .projection(projection)
            .ok_or_else(|| CompileError::config(format!("unknown projection {}", projection.0)))?;
        let pre = network.population(p.pre)?;
        let post = network.population(p.post)?;
        let receptor_index = post
            .cell
            .receptor_index(&p.receptor)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| CompileError::config(format!("{} has no receptor {}", post.cell, p.receptor)))?;

        // Same stream as the source's own neuron vertices
        let native = pre.native_parameters();
        let mut rng = StdRng::seed_from_u64(mix_seed(config.seed, (1 << 32) | pre.id.0 as u64));
        let mut ctx = MapContext::new(TransformContext::new(config.timestep_ms), &mut rng);
        let source = ParameterRegion::per_neuron(
            "source",
            vec![
                apply(&native, pre.cell.neuron_mutable_param_map(), &mut ctx)?,
                apply(&native, pre.cell.neuron_immutable_param_map(), &mut ctx)?,
            ],
        );

        let slices = split_slice(pre.size.min(post.size), width);
        info!("{}: {} current-input vertices of width {width}", p.label, slices.len());
        Ok(Self {
            projection,
            pre: p.pre,
            post: p.post,
            label: p.label.clone(),
            receptor_index,
            slices,
            source,
            signed_weight: p.synapse.signed_weight(),
            placements: Vec::new(),
            weight_fixed_points: Vec::new(),
        })
    }

    /// Diagnostic label of vertex `index`
    pub fn vertex_label(&self, index: usize) -> String {
        format!("{}/current-input/{index}", self.label)
    }

    fn system(slice: &NeuronSlice, weight_fixed_point: u32, config: &CompileConfig) -> SystemRegion {
        SystemRegion {
            application_words: vec![weight_fixed_point, slice.len(), u32::from(config.flush)],
            timer_period_us: config.timer_period_us(),
            sim_ticks: config.sim_ticks(),
        }
    }

    /// Memory a vertex will allocate, output buffers included
    pub fn resources(&self, slice: &NeuronSlice, config: &CompileConfig) -> VertexResources {
        let system = Self::system(slice, 0, config);
        let output = OutputBufferRegion::default();
        let statistics = StatisticsRegion {
            names: &CURRENT_INPUT_STATISTICS,
        };
        let regions: Vec<&dyn Region> = vec![&system, &self.source, &output, &statistics];
        let bytes = image_size(CurrentInputRegion::COUNT, slice, &regions)
            + DirectInputRegion::max_size(slice)
            + 2 * slice.len() as usize * 4;
        VertexResources::single_core(bytes)
    }

    /// Place every vertex
    ///
    /// # Errors
    ///
    /// Returns error naming the vertex the placer rejected.
    pub fn place(&mut self, placer: &mut dyn Placer, config: &CompileConfig) -> Result<()> {
        self.placements = self
            .slices
            .iter()
            .enumerate()
            .map(|(i, slice)| {
                let label = self.vertex_label(i);
                placer
                    .place(&label, &self.resources(slice, config))
                    .map(VertexPlacement::new)
                    .map_err(|e| CompileError::loading(label, e))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Allocate both output buffers of every vertex on its chip
    ///
    /// # Errors
    ///
    /// Returns error if a vertex is unplaced or an allocation fails.
    pub fn allocate_out_buffers(&mut self, transport: &mut dyn MemoryTransport) -> Result<()> {
        for (i, slice) in self.slices.iter().enumerate() {
            let label = self.vertex_label(i);
            placed(&self.placements, i, &label)?;
            allocate_pair(transport, &mut self.placements[i], slice.len(), &label)?;
        }
        Ok(())
    }

    /// Build the links of every slice, fix its weight format and load it
    ///
    /// # Errors
    ///
    /// Returns the first build, serialization or transport failure; vertices
    /// loaded before it stay loaded.
    pub fn load(
        &mut self,
        network: &Network,
        config: &CompileConfig,
        transport: &mut dyn MemoryTransport,
        loader: &ImageLoader,
    ) -> Result<()> {
        let projection = network
            .projection(self.projection)
            .ok_or_else(|| CompileError::config(format!("unknown projection {}", self.projection.0)))?;
        let pre_label = &network.population(self.pre)?.label;

        self.weight_fixed_points = vec![None; self.slices.len()];
        for (i, slice) in self.slices.clone().into_iter().enumerate() {
            let label = self.vertex_label(i);
            let placement = placed(&self.placements, i, &label)?;
            let core = placement.core;
            let out_buffers = placement
                .out_buffers
                .ok_or_else(|| CompileError::config(format!("{label}: output buffers not allocated")))?;

            let window = network.window(projection, slice, slice);
            let links = projection.build(&window, config, pre_label, None)?;
            let mut range = WeightRange::new(self.signed_weight);
            range.update_iter(links.iter().map(|(_, s)| s.weight));
            let fixed_point = range.fixed_point();

            let direct = DirectInputRegion {
                inputs: links
                    .iter()
                    .map(|(_, s)| DirectInput {
                        neuron: s.index,
                        weight: u32::from(encode_weight(s.weight, fixed_point, self.signed_weight)),
                        delay: s.delay,
                    })
                    .collect(),
            };
            let system = Self::system(&slice, fixed_point, config);
            let output = OutputBufferRegion {
                addresses: [out_buffers[0].address, out_buffers[1].address],
            };
            let statistics = StatisticsRegion {
                names: &CURRENT_INPUT_STATISTICS,
            };
            let regions: Vec<(usize, &dyn Region)> = vec![
                (CurrentInputRegion::System.slot(), &system),
                (CurrentInputRegion::Source.slot(), &self.source),
                (CurrentInputRegion::DirectInput.slot(), &direct),
                (CurrentInputRegion::OutputBuffer.slot(), &output),
                (CurrentInputRegion::Statistics.slot(), &statistics),
            ];
            let image = build_image(&label, CurrentInputRegion::COUNT, &slice, &regions)?;
            let loaded = loader
                .load(core, &image, transport)
                .map_err(|e| CompileError::loading(&label, e))?;
            debug!("{label}: {} direct links, weight fixed point {fixed_point}", direct.inputs.len());
            self.placements[i].image = Some(loaded);
            self.weight_fixed_points[i] = Some(fixed_point);
        }
        Ok(())
    }

    /// Placements, in vertex order
    pub fn placements(&self) -> &[VertexPlacement] {
        &self.placements
    }

    /// Read back and decode the links of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails or returns a malformed region.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_connections(
        &self,
        config: &CompileConfig,
        transport: &mut dyn MemoryTransport,
    ) -> Result<Vec<SynapseReadback>> {
        let mut connections = Vec::new();
        for (i, (slice, placement)) in self.slices.iter().zip(&self.placements).enumerate() {
            let Some(fixed_point) = self.weight_fixed_points.get(i).copied().flatten() else {
                continue;
            };
            let Some(address) = placement.image.as_ref().and_then(|m| m.region(CurrentInputRegion::DirectInput.slot()))
            else {
                continue;
            };
            let label = self.vertex_label(i);
            let data = read_region(transport, &label, address, DirectInputRegion::max_size(slice))?;
            let region = DirectInputRegion::read(&data)?;
            connections.extend(region.inputs.iter().map(|input| SynapseReadback {
                pre: slice.start + input.neuron,
                post: slice.start + input.neuron,
                weight: decode_weight(input.weight as u16, fixed_point, self.signed_weight),
                delay_ms: f64::from(input.delay) * config.timestep_ms,
            }));
        }
        Ok(connections)
    }

    /// Read the statistics of every loaded vertex
    ///
    /// # Errors
    ///
    /// Returns error if a read fails.
    pub fn read_statistics(&self, transport: &mut dyn MemoryTransport) -> Result<Vec<Vec<(&'static str, u32)>>> {
        let region = StatisticsRegion {
            names: &CURRENT_INPUT_STATISTICS,
        };
        let mut stats = Vec::new();
        for (i, (slice, placement)) in self.slices.iter().zip(&self.placements).enumerate() {
            let Some(address) = placement.image.as_ref().and_then(|m| m.region(CurrentInputRegion::Statistics.slot()))
            else {
                continue;
            };
            let data = read_region(transport, &self.vertex_label(i), address, region.size_of(slice))?;
            stats.push(region.read_stats(&data)?);
        }
        Ok(stats)
    }
}

impl InputSource for CurrentInputCluster {
    fn input_buffers(&self, slice: &NeuronSlice) -> Result<Vec<InputBuffer>> {
        let mut buffers = Vec::new();
        for (i, vertex_slice) in self.slices.iter().enumerate() {
            let Some(overlap) = vertex_slice.overlap(slice) else {
                continue;
            };
            let not_loaded = || CompileError::config(format!("{} must be loaded before its neurons", self.vertex_label(i)));
            let addresses = self
                .placements
                .get(i)
                .and_then(|p| p.out_buffers)
                .ok_or_else(not_loaded)?;
            let weight_fixed_point = self.weight_fixed_points.get(i).copied().flatten().ok_or_else(not_loaded)?;
            buffers.push(InputBuffer {
                addresses: [addresses[0].address, addresses[1].address],
                receptor: self.receptor_index,
                weight_fixed_point,
                buffer_offset: overlap.start - vertex_slice.start,
                neuron_offset: overlap.start - slice.start,
                neurons: overlap.len(),
            });
        }
        Ok(buffers)
    }
}

fn device_generator(param: &SynapseParam, transform: Transform, ctx: TransformContext, rng: &mut StdRng) -> Result<GeneratorParams> {
    let (kind, space, fields) = param.device_parameters(transform)?;
    let records: ParamRecords = apply(&space, &fields, &mut MapContext::new(ctx, rng))?;
    Ok(GeneratorParams { kind, records })
}

#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation)]
fn on_chip_matrix(
    network: &Network,
    config: &CompileConfig,
    projection_id: ProjectionId,
    sub: &SubMatrix,
    offset: usize,
    post_slice: NeuronSlice,
    weight_fixed_point: u32,
    states: &mut BTreeMap<ProjectionId, ConsumableState>,
) -> Result<OnChipMatrix> {
    let projection = network
        .projection(projection_id)
        .ok_or_else(|| CompileError::config(format!("unknown projection {}", projection_id.0)))?;
    let window = network.window(projection, sub.pre.slice, post_slice);
    let stream = u64::from(sub.pre.key) | (u64::from(post_slice.start) << 32);
    let mut rng = StdRng::seed_from_u64(mix_seed(mix_seed(config.seed, projection_id.0 as u64), stream));
    let ctx = TransformContext::new(config.timestep_ms).with_weight_fixed_point(weight_fixed_point);

    let (kind, records) =
        projection
            .connector
            .device_record(&projection.label, &window, states.get_mut(&projection_id), &mut rng, ctx)?;
    let delay = device_generator(&projection.delay, Transform::IntegerTimeDivide, ctx, &mut rng)?;
    let weight = device_generator(&projection.weight, Transform::S32FixedPoint, ctx, &mut rng)?;
    let offset = u32::try_from(offset).map_err(|_| CompileError::config("synaptic matrix offset overflow"))?;
    Ok(OnChipMatrix {
        key: sub.pre.key,
        word_offset: offset,
        max_row_synapses: sub.max_cols as u32,
        num_rows: sub.pre.slice.len(),
        post_slice_len: post_slice.len(),
        seed: std::array::from_fn(|_| rng.next_u32()),
        connector: GeneratorParams { kind, records },
        delay,
        weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellModel;
    use crate::connectors::Connector;
    use crate::network::ProjectionSpec;
    use crate::random::{Distribution, RandomDistribution};
    use crate::synapse::SynapseModelKind;
    use spinn_driver::{SequentialPlacer, SoftwareBackend};

    fn excitatory() -> SynapseType {
        SynapseType {
            model: SynapseModelKind::Static,
            receptor: "excitatory".to_string(),
        }
    }

    struct Fixture {
        network: Network,
        config: CompileConfig,
        neuron_vertices: BTreeMap<PopulationId, Vec<NeuronVertex>>,
        post: PopulationId,
        projections: Vec<ProjectionId>,
    }

    fn fixture(specs: Vec<ProjectionSpec>) -> Fixture {
        let mut network = Network::new();
        let pre = network.add_population("pre", 300, CellModel::IfCurrExp);
        let post = network.add_population("post", 200, CellModel::IfCurrExp);
        let projections = specs
            .into_iter()
            .map(|spec| network.add_projection(pre, post, spec).unwrap())
            .collect();
        let mut neuron_vertices = BTreeMap::new();
        neuron_vertices.insert(pre, partition_neurons(pre, 300, 128));
        neuron_vertices.insert(post, partition_neurons(post, 200, 128));
        Fixture {
            network,
            config: CompileConfig {
                duration_ms: 100.0,
                ..CompileConfig::default()
            },
            neuron_vertices,
            post,
            projections,
        }
    }

    fn loaded_cluster(f: &Fixture, width: u32) -> (SynapseCluster, SoftwareBackend) {
        let mut cluster = SynapseCluster::new(
            &f.network,
            f.post,
            &excitatory(),
            f.projections.clone(),
            width,
            &f.neuron_vertices,
            &f.config,
            &ChipResources::SPINNAKER,
        )
        .unwrap();
        let mut placer = SequentialPlacer::new(2, 2, ChipResources::SPINNAKER);
        let mut backend = SoftwareBackend::reference();
        cluster.place(&mut placer).unwrap();
        cluster.allocate_out_buffers(&mut backend).unwrap();
        cluster.load(&f.network, &f.config, &mut backend, &ImageLoader::default()).unwrap();
        (cluster, backend)
    }

    #[test]
    fn keys_encode_population_and_vertex() {
        assert_eq!(vertex_key(PopulationId(2), 3), 0x2_0C00);
        assert_eq!(vertex_key(PopulationId(2), 3) & KEY_MASK, vertex_key(PopulationId(2), 3));
    }

    #[test]
    fn host_rows_read_back_as_built() {
        let spec = ProjectionSpec::new(Connector::FromList {
            connections: vec![
                crate::connectors::ListConnection {
                    pre: 5,
                    post: 7,
                    weight: Some(0.5),
                    delay: Some(3.0),
                },
                crate::connectors::ListConnection {
                    pre: 200,
                    post: 150,
                    weight: Some(2.0),
                    delay: Some(12.0),
                },
            ],
        });
        let f = fixture(vec![spec]);
        let (cluster, mut backend) = loaded_cluster(&f, 128);

        let pre = f.network.find_population("pre").unwrap();
        let mut read = cluster.read_synaptic_matrices(pre, &f.config, &mut backend).unwrap();
        read.sort_by_key(|s| s.pre);
        assert_eq!(read.len(), 2);
        assert_eq!((read[0].pre, read[0].post), (5, 7));
        assert!((read[0].weight - 0.5).abs() < 1e-3);
        assert!((read[0].delay_ms - 3.0).abs() < 1e-9);
        assert_eq!((read[1].pre, read[1].post), (200, 150));
        assert!((read[1].delay_ms - 12.0).abs() < 1e-9);
    }

    #[test]
    fn single_generatable_projection_is_deferred() {
        let spec = ProjectionSpec::new(Connector::FixedProbability {
            p_connect: 0.1,
            allow_self_connections: true,
        })
        .weight(SynapseParam::Random(RandomDistribution::native(Distribution::Uniform {
            low: 0.5,
            high: 1.0,
        })));
        let f = fixture(vec![spec]);
        let (cluster, _) = loaded_cluster(&f, 128);
        for matrices in cluster.matrices().iter().flatten() {
            assert!(matrices.subs.iter().all(|s| matches!(s.generation, Generation::OnChip(_))));
            // Upper weight bound 1.0 sets the format
            assert_eq!(matrices.weight_fixed_point, 15);
        }
    }

    #[test]
    fn merged_projections_are_built_on_host() {
        let all = || ProjectionSpec::new(Connector::AllToAll { allow_self_connections: true });
        let f = fixture(vec![all(), all().weight(3.0)]);
        let (cluster, _) = loaded_cluster(&f, 128);
        let matrices: Vec<_> = cluster.matrices().iter().flatten().collect();
        assert!(!matrices.is_empty());
        for m in matrices {
            assert!(m.subs.iter().all(|s| s.generation == Generation::Host));
            assert_eq!(m.weight_fixed_point, 14);
        }
    }

    #[test]
    fn merged_projections_read_back_once_each() {
        let all = || ProjectionSpec::new(Connector::AllToAll { allow_self_connections: true });
        let f = fixture(vec![all(), all().weight(3.0).delay(9.0)]);
        let (cluster, mut backend) = loaded_cluster(&f, 128);
        let pre = f.network.find_population("pre").unwrap();
        let read = cluster.read_synaptic_matrices(pre, &f.config, &mut backend).unwrap();
        assert_eq!(read.len(), 2 * 300 * 200);
        let heavy = read.iter().filter(|s| (s.weight - 3.0).abs() < 1e-3).count();
        assert_eq!(heavy, 300 * 200);
        assert!(read.iter().filter(|s| s.weight > 2.0).all(|s| (s.delay_ms - 9.0).abs() < 1e-9));
    }

    #[test]
    fn current_input_buffers_cover_neuron_slices() {
        let mut network = Network::new();
        let src = network.add_population("src", 100, CellModel::SpikeSourcePoisson);
        let dst = network.add_population("dst", 100, CellModel::IfCurrExp);
        let p = network.add_projection(src, dst, ProjectionSpec::new(Connector::OneToOne)).unwrap();
        let config = CompileConfig::default();

        let mut cluster = CurrentInputCluster::new(&network, p, 64, &config).unwrap();
        assert_eq!(cluster.slices, vec![NeuronSlice::new(0, 64), NeuronSlice::new(64, 100)]);
        assert!(cluster.input_buffers(&NeuronSlice::whole(100)).is_err());

        let mut placer = SequentialPlacer::new(1, 1, ChipResources::SPINNAKER);
        let mut backend = SoftwareBackend::reference();
        cluster.place(&mut placer, &config).unwrap();
        cluster.allocate_out_buffers(&mut backend).unwrap();
        cluster.load(&network, &config, &mut backend, &ImageLoader::default()).unwrap();

        let buffers = cluster.input_buffers(&NeuronSlice::new(32, 100)).unwrap();
        assert_eq!(buffers.len(), 2);
        assert_eq!((buffers[0].buffer_offset, buffers[0].neuron_offset, buffers[0].neurons), (32, 0, 32));
        assert_eq!((buffers[1].buffer_offset, buffers[1].neuron_offset, buffers[1].neurons), (0, 32, 36));
        assert!(buffers.iter().all(|b| b.receptor == 0 && b.weight_fixed_point == 15));

        let stats = cluster.read_statistics(&mut backend).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0][0].0, "input_buffer_overflows");
    }

    #[test]
    fn input_buffers_cover_neuron_slices() {
        let f = fixture(vec![ProjectionSpec::new(Connector::OneToOne)]);
        let (cluster, _) = loaded_cluster(&f, 128);
        let buffers = cluster.input_buffers(&NeuronSlice::new(64, 200)).unwrap();
        let covered: u32 = buffers.iter().map(|b| b.neurons).sum();
        assert_eq!(covered, 136);
        assert_eq!(buffers[0].buffer_offset, 64);
        assert_eq!(buffers[0].neuron_offset, 0);
        assert!(buffers.iter().all(|b| b.receptor == 0));
    }

    #[test]
    fn statistics_start_zeroed() {
        let f = fixture(vec![ProjectionSpec::new(Connector::OneToOne)]);
        let (cluster, mut backend) = loaded_cluster(&f, 128);
        let stats = cluster.read_statistics(&mut backend).unwrap();
        assert_eq!(stats.len(), cluster.vertices.len());
        assert!(stats.iter().flatten().all(|(_, v)| *v == 0));
        assert_eq!(stats[0][4].0, "key_lookup_fails");
    }

    #[test]
    fn unplaced_cluster_cannot_load() {
        let f = fixture(vec![ProjectionSpec::new(Connector::OneToOne)]);
        let mut cluster = SynapseCluster::new(
            &f.network,
            f.post,
            &excitatory(),
            f.projections.clone(),
            128,
            &f.neuron_vertices,
            &f.config,
            &ChipResources::SPINNAKER,
        )
        .unwrap();
        let mut backend = SoftwareBackend::reference();
        assert!(cluster.allocate_out_buffers(&mut backend).is_err());
    }
}
