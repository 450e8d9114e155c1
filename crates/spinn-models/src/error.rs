//! Error types for network compilation

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for compilation
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that can occur while compiling or loading a network
#[derive(Debug, Error)]
pub enum CompileError {
    /// The population cannot fit on one chip
    #[error("Population {population} needs {cores} cores but a chip provides {budget}")]
    TooManyCores {
        /// Population label
        population: String,
        /// Cores implied by the rounded constraints
        cores: u32,
        /// Per-chip core budget
        budget: u32,
    },

    /// A per-core constraint degenerated
    #[error("Invalid constraint for population {population}: {reason}")]
    InvalidConstraint {
        /// Population label
        population: String,
        /// Reason for failure
        reason: String,
    },

    /// A parameter cannot be represented in its binary field
    #[error("Cannot encode {field}={value}: {reason}")]
    UnrepresentableTransform {
        /// Field (parameter) name
        field: String,
        /// Offending value
        value: f64,
        /// Reason for failure
        reason: String,
    },

    /// The on-device generator has no implementation of a distribution
    #[error("On-device generation does not support {distribution} distributions")]
    UnsupportedDistribution {
        /// Distribution name
        distribution: String,
    },

    /// A value that only the device can evaluate was requested on the host
    #[error("{name} is drawn from the device RNG and can only be evaluated on the device")]
    DeviceOnlyValue {
        /// Parameter name
        name: String,
    },

    /// Parameter missing from a parameter space
    #[error("Unknown parameter: {name}")]
    UnknownParameter {
        /// Parameter name
        name: String,
    },

    /// Explicit array of the wrong length
    #[error("Parameter {name} has {actual} values, expected {expected}")]
    ShapeMismatch {
        /// Parameter name
        name: String,
        /// Population size
        expected: usize,
        /// Array length
        actual: usize,
    },

    /// Connector parameters cannot be realised
    #[error("Invalid connector on projection {projection}: {reason}")]
    InvalidConnector {
        /// Projection label
        projection: String,
        /// Reason for failure
        reason: String,
    },

    /// A synapse reached serialization without a valid delay
    #[error("Invalid delay {delay} in row {row} of projection from {population}")]
    InvalidDelay {
        /// Pre-synaptic population label
        population: String,
        /// Pre-synaptic neuron
        row: usize,
        /// Delay in ticks
        delay: i64,
    },

    /// Reference to a population that does not exist
    #[error("Unknown population: {name}")]
    UnknownPopulation {
        /// Label or id
        name: String,
    },

    /// A region wrote a different number of bytes than it declared
    #[error("Region {region} declared {declared} bytes but wrote {written}")]
    RegionSize {
        /// Region name
        region: &'static str,
        /// Result of `size_of`
        declared: usize,
        /// Bytes actually serialized
        written: usize,
    },

    /// Read-back data is shorter than the region it should hold
    #[error("Read-back of {region} truncated: {actual} of {expected} bytes")]
    Truncated {
        /// Region name
        region: &'static str,
        /// Bytes needed
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Invalid configuration or network description
    #[error("Configuration error: {reason}")]
    Config {
        /// Reason for failure
        reason: String,
    },

    /// Configuration file not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Placement or transport failure for one vertex
    #[error("Loading vertex {vertex} failed: {source}")]
    Loading {
        /// Vertex label
        vertex: String,
        /// Underlying driver error
        source: spinn_driver::DriverError,
    },
}

impl CompileError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an unrepresentable transform error
    pub fn unrepresentable(field: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        Self::UnrepresentableTransform {
            field: field.into(),
            value,
            reason: reason.into(),
        }
    }

    /// Create an invalid connector error
    pub fn invalid_connector(projection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConnector {
            projection: projection.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a driver error with the vertex it happened on
    pub fn loading(vertex: impl Into<String>, source: spinn_driver::DriverError) -> Self {
        Self::Loading {
            vertex: vertex.into(),
            source,
        }
    }
}
