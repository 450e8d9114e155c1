//! Partitioning populations into per-core vertices
//!
//! Neuron vertices are consecutive slices of the population width. Synapse
//! vertices are built per post-synaptic slice by walking the projections in
//! insertion order, and each projection's pre-synaptic neuron vertices in
//! slice order, greedily packing connections while the estimated CPU load
//! and matrix memory stay within one core's budget:
//!
//! ```text
//! budget  = (cycles/s - overhead * ticks/s) / realtime_proportion
//! close   cycles + c >= budget  or  sdram + s > max matrix bytes
//! ```

use crate::config::CompileConfig;
use crate::error::Result;
use crate::matrix::SynapticMatrix;
use crate::network::{Network, PopulationId, Projection, ProjectionId};
use crate::slice::{split_slice, NeuronSlice};
use spinn_chip::layout::delay_slot;
use spinn_chip::machine::ChipResources;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// One neuron core's slice of a population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeuronVertex {
    /// Population
    pub population: PopulationId,
    /// Position among the population's vertices
    pub index: usize,
    /// Neurons
    pub slice: NeuronSlice,
}

/// Cut a population of `size` neurons into vertices of `width`
pub fn partition_neurons(population: PopulationId, size: u32, width: u32) -> Vec<NeuronVertex> {
    split_slice(size, width)
        .into_iter()
        .enumerate()
        .map(|(index, slice)| NeuronVertex {
            population,
            index,
            slice,
        })
        .collect()
}

/// One pre-synaptic vertex of one projection, served by a synapse vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynapseConnection {
    /// Projection the synapses belong to
    pub projection: ProjectionId,
    /// Source population of the projection
    pub pre: PopulationId,
    /// Index of the pre-synaptic neuron vertex
    pub pre_vertex: usize,
}

/// One synapse core's share of a post-synaptic slice
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseVertex {
    /// Post-synaptic neurons
    pub post_slice: NeuronSlice,
    /// Position of the post slice within the population
    pub post_slice_index: usize,
    /// Connections served, in packing order
    pub connections: Vec<SynapseConnection>,
    /// Estimated CPU cycles per second
    pub cpu_cycles: f64,
    /// Estimated synaptic matrix bytes
    pub sdram_bytes: usize,
}

impl SynapseVertex {
    fn new(post_slice: NeuronSlice, post_slice_index: usize, cpu_cycles: f64) -> Self {
        Self {
            post_slice,
            post_slice_index,
            connections: Vec::new(),
            cpu_cycles,
            sdram_bytes: 0,
        }
    }

    /// Serve one pre-synaptic vertex of a projection
    pub fn add_connection(&mut self, connection: SynapseConnection) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    /// Number of (projection, pre-synaptic vertex) connections served
    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Distinct pre-synaptic vertices, grouped by population in first-seen
    /// order
    ///
    /// Each becomes one sub-matrix merging every projection listed for it.
    pub fn pre_vertices(&self) -> Vec<(PopulationId, Vec<usize>)> {
        let mut grouped: Vec<(PopulationId, Vec<usize>)> = Vec::new();
        for c in &self.connections {
            match grouped.iter_mut().find(|(p, _)| *p == c.pre) {
                Some((_, vertices)) if vertices.contains(&c.pre_vertex) => {}
                Some((_, vertices)) => vertices.push(c.pre_vertex),
                None => grouped.push((c.pre, vec![c.pre_vertex])),
            }
        }
        grouped
    }

    /// Projections whose synapses from `pre_vertex` of `pre` this vertex holds
    pub fn projections_from(&self, pre: PopulationId, pre_vertex: usize) -> Vec<ProjectionId> {
        self.connections
            .iter()
            .filter(|c| c.pre == pre && c.pre_vertex == pre_vertex)
            .map(|c| c.projection)
            .collect()
    }

    /// Whether any connection comes from `pre`
    pub fn serves(&self, pre: PopulationId) -> bool {
        self.connections.iter().any(|c| c.pre == pre)
    }
}

/// Per-core limits of a synapse processor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionBudget {
    /// CPU cycles per second available to synapse processing
    pub cpu_cycles: f64,
    /// Fixed per-second cost every vertex starts with
    pub constant_overhead: f64,
    /// Synaptic matrix bytes one core can address
    pub sdram_bytes: usize,
}

impl PartitionBudget {
    /// Budget for `matrix`'s synapse model
    pub fn new(matrix: &SynapticMatrix, config: &CompileConfig, chip: &ChipResources) -> Self {
        let overhead = matrix.model().constant_cpu_overhead();
        Self {
            cpu_cycles: chip.available_cycles(overhead, config.ticks_per_second()) / config.realtime_proportion,
            constant_overhead: overhead,
            sdram_bytes: chip.max_synaptic_matrix_bytes,
        }
    }
}

/// Worst-case shape of one projection's rows within a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatrixDims {
    /// Synapses in the first sub-row
    pub max_cols: usize,
    /// Sub-rows including the first, 0 when empty
    pub max_sub_rows: usize,
    /// Synapses across all extension sub-rows
    pub max_total_sub_row_length: usize,
}

/// Estimate row dimensions of `projection` between two slices
///
/// # Errors
///
/// Returns error if the delay distribution cannot be bounded.
pub fn estimate_max_dims(
    network: &Network,
    projection: &Projection,
    pre: NeuronSlice,
    post: NeuronSlice,
    timestep_ms: f64,
) -> Result<MatrixDims> {
    let window = network.window(projection, pre, post);
    let max_cols = projection.connector.estimate_max_row_synapses(&window) as usize;
    if max_cols == 0 {
        return Ok(MatrixDims::default());
    }
    let (slot, _) = delay_slot(projection.max_delay_ticks(timestep_ms)?);
    let max_sub_rows = slot as usize + 1;
    Ok(MatrixDims {
        max_cols,
        max_sub_rows,
        max_total_sub_row_length: if max_sub_rows > 1 { max_cols } else { 0 },
    })
}

/// Cost of serving one pre-synaptic vertex on a synapse core
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ConnectionCost {
    cpu_cycles: f64,
    sdram_bytes: usize,
}

fn connection_cost(
    network: &Network,
    projection: &Projection,
    pre: NeuronSlice,
    post: NeuronSlice,
    matrix: &SynapticMatrix,
    config: &CompileConfig,
) -> Result<Option<ConnectionCost>> {
    let dims = estimate_max_dims(network, projection, pre, post, config.timestep_ms)?;
    if dims.max_cols == 0 && dims.max_sub_rows == 0 {
        return Ok(None);
    }
    let window = network.window(projection, pre, post);
    let rate = network.population(projection.pre)?.config.mean_firing_rate;
    let model = matrix.model();
    let rows_per_second = f64::from(pre.len()) * rate;
    #[allow(clippy::cast_precision_loss)]
    let row_cost = model.row_cpu_cycles() * dims.max_sub_rows as f64;
    Ok(Some(ConnectionCost {
        cpu_cycles: rows_per_second
            * (row_cost + projection.connector.estimate_mean_row_synapses(&window) * model.synapse_cpu_cycles()),
        sdram_bytes: 4 * matrix.estimate_matrix_words(
            pre.len() as usize,
            dims.max_cols,
            dims.max_sub_rows,
            dims.max_total_sub_row_length,
        ),
    }))
}

/// Partition the synaptic input of one synapse type of `post`
///
/// `projections` are the type's synaptic projections in insertion order.
/// Each post slice is packed by walking projections in that order and, for
/// each, the pre-synaptic neuron vertices of its source in slice order.
/// Deterministic: the same inputs always give the same vertices.
///
/// # Errors
///
/// Returns error if a population is unknown or a delay cannot be bounded.
#[allow(clippy::too_many_arguments)]
pub fn partition_synapses(
    network: &Network,
    post: PopulationId,
    projections: &[ProjectionId],
    width: u32,
    neuron_vertices: &BTreeMap<PopulationId, Vec<NeuronVertex>>,
    matrix: &SynapticMatrix,
    config: &CompileConfig,
    chip: &ChipResources,
) -> Result<Vec<SynapseVertex>> {
    let post_population = network.population(post)?;
    let budget = PartitionBudget::new(matrix, config, chip);
    trace!("{}: synapse core budget {:?}", post_population.label, budget);
    let projections: Vec<&Projection> = projections.iter().filter_map(|p| network.projection(*p)).collect();

    let mut vertices = Vec::new();
    for (post_index, post_slice) in split_slice(post_population.size, width).into_iter().enumerate() {
        let mut vertex = SynapseVertex::new(post_slice, post_index, budget.constant_overhead);
        for projection in &projections {
            let Some(pre_vertices) = neuron_vertices.get(&projection.pre) else {
                continue;
            };
            for pre_vertex in pre_vertices {
                let Some(cost) = connection_cost(network, projection, pre_vertex.slice, post_slice, matrix, config)?
                else {
                    continue;
                };
                let over_cpu = vertex.cpu_cycles + cost.cpu_cycles >= budget.cpu_cycles;
                let over_sdram = vertex.sdram_bytes + cost.sdram_bytes > budget.sdram_bytes;
                if (over_cpu || over_sdram) && vertex.num_connections() > 0 {
                    debug!(
                        "{} {}: closing synapse vertex with {} connections ({:.0} cycles, {} bytes)",
                        post_population.label,
                        post_slice,
                        vertex.num_connections(),
                        vertex.cpu_cycles,
                        vertex.sdram_bytes
                    );
                    vertices.push(std::mem::replace(
                        &mut vertex,
                        SynapseVertex::new(post_slice, post_index, budget.constant_overhead),
                    ));
                }
                vertex.add_connection(SynapseConnection {
                    projection: projection.id,
                    pre: projection.pre,
                    pre_vertex: pre_vertex.index,
                });
                vertex.cpu_cycles += cost.cpu_cycles;
                vertex.sdram_bytes += cost.sdram_bytes;
            }
        }
        if vertex.num_connections() > 0 {
            vertices.push(vertex);
        }
    }
    debug!("{}: {} synapse vertices", post_population.label, vertices.len());
    Ok(vertices)
}
