//! Spiking neural network compiler
//!
//! Turns a [`Network`] of populations and projections into vertex images
//! for a many-core machine: each population is cut into neuron vertices,
//! its synaptic input into synapse vertices, its direct input into
//! current-input vertices, and every vertex is serialized
//! as a set of memory regions the device programs read at start-up.
//!
//! # Pipeline
//!
//! ```text
//! Network ─► estimate_constraints ─► partition ─► place ─► build regions ─► load
//!             (per-core widths)      (slices)    (Placer)  (matrices,     (MemoryTransport)
//!                                                           parameters)
//! ```
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`network`] | Populations, projections, identifiers |
//! | [`cells`] | Cell models and their parameter maps |
//! | [`synapse`] | Static and STDP synapse models, synapse types |
//! | [`connectors`] | Connectivity rules, row-length estimates, host generation |
//! | [`params`] | Parameter spaces, expressions, binary transforms |
//! | [`random`] | Host and device random distributions |
//! | [`constraints`] | Per-core neuron and synapse widths |
//! | [`partition`] | Neuron and synapse vertex partitioning |
//! | [`matrix`] | Synaptic matrix layout, serialization and read-back |
//! | [`regions`] | Memory region serializers |
//! | [`cluster`] | Neuron, synapse and current-input vertex groups: placement, image build, load |
//! | [`compiler`] | Compilation session driving the whole pipeline |
//! | [`description`] | TOML network descriptions |
//!
//! # Example
//!
//! ```
//! use spinn_chip::machine::ChipResources;
//! use spinn_driver::{SequentialPlacer, SoftwareBackend};
//! use spinn_models::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut network = Network::new();
//! let stim = network.add_population("stim", 50, CellModel::SpikeSourcePoisson);
//! let exc = network.add_population("exc", 100, CellModel::IfCurrExp);
//! network.add_projection(
//!     stim,
//!     exc,
//!     ProjectionSpec::new(Connector::FixedProbability {
//!         p_connect: 0.1,
//!         allow_self_connections: true,
//!     })
//!     .weight(0.5),
//! )?;
//!
//! let compiler = Compiler::new(CompileConfig::default())?;
//! let mut placer = SequentialPlacer::new(2, 2, ChipResources::SPINNAKER);
//! let mut backend = SoftwareBackend::reference();
//! let (compiled, report) = compiler.run(&network, &mut placer, &mut backend)?;
//! assert_eq!(
//!     report.vertices,
//!     compiled.neuron_vertices() + compiled.synapse_vertices() + compiled.current_input_vertices()
//! );
//! assert!(report.bytes > 0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cells;
pub mod cluster;
pub mod compiler;
pub mod config;
pub mod connectors;
pub mod constraints;
pub mod description;
mod error;
pub mod matrix;
pub mod network;
pub mod params;
pub mod partition;
pub mod random;
pub mod regions;
pub mod slice;
pub mod stats;
pub mod synapse;
pub mod weights;

pub use cells::CellModel;
pub use cluster::{CurrentInputCluster, InputSource, NeuralCluster, SynapseCluster, SynapseReadback};
pub use compiler::{CompiledNetwork, Compiler, LoadReport};
pub use config::CompileConfig;
pub use connectors::{Connector, ListConnection};
pub use constraints::{estimate_constraints, JConstraints};
pub use description::NetworkDescription;
pub use error::{CompileError, Result};
pub use network::{Network, PopulationConfig, PopulationId, ProjectionId, ProjectionSpec};
pub use params::{Expr, ParamValue, ParameterSpace};
pub use random::{Distribution, RandomDistribution, SynapseParam};
pub use slice::NeuronSlice;
pub use synapse::{StdpParameters, SynapseModel, SynapseType};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        CellModel, CompileConfig, CompileError, Compiler, Connector, Distribution, Network, NetworkDescription,
        ProjectionSpec, RandomDistribution, Result, SynapseModel,
    };
}
