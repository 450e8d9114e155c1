//! Error types for placement and device-memory transport

use crate::backend::{ChipCoord, CoreLocation};
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while placing vertices or moving bytes to the device
#[derive(Debug, Error)]
pub enum DriverError {
    /// Not enough external memory left on a chip
    #[error("Out of memory on chip {chip}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Chip the allocation was requested on
        chip: ChipCoord,
        /// Requested size
        requested: usize,
        /// Bytes still free
        available: usize,
    },

    /// Access outside any allocated block
    #[error("Invalid device access at 0x{address:08x} ({len} bytes) on chip {chip}")]
    InvalidAddress {
        /// Chip accessed
        chip: ChipCoord,
        /// Absolute device address
        address: u32,
        /// Length of the access
        len: usize,
    },

    /// No free core left for a vertex
    #[error("Placement failed for {vertex}: {reason}")]
    PlacementFailed {
        /// Vertex label
        vertex: String,
        /// Reason for failure
        reason: String,
    },

    /// Malformed vertex image
    #[error("Invalid image for core {core}: {reason}")]
    InvalidImage {
        /// Target core
        core: CoreLocation,
        /// Reason for failure
        reason: String,
    },

    /// Data transfer failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// I/O error from a file-backed transport
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl DriverError {
    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create a placement failed error
    pub fn placement_failed(vertex: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlacementFailed {
            vertex: vertex.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid image error
    pub fn invalid_image(core: CoreLocation, reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            core,
            reason: reason.into(),
        }
    }
}

impl From<rustix::io::Errno> for DriverError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io {
            source: errno.into(),
        }
    }
}
