//! Transport abstraction for device memory
//!
//! The compiler never talks to hardware directly. Everything it needs from
//! the machine is allocating, writing and reading external memory, injected
//! through [`MemoryTransport`]. Batching or retrying on the physical link
//! lives behind the trait.

use crate::error::Result;
use std::fmt;

/// Base of the external memory window as seen from a core.
pub const SDRAM_BASE: u32 = 0x6000_0000;

/// Chip coordinate in the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChipCoord {
    /// X coordinate
    pub x: u8,
    /// Y coordinate
    pub y: u8,
}

impl ChipCoord {
    /// Create a chip coordinate
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ChipCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One core on one chip, as returned by placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreLocation {
    /// Chip the core belongs to
    pub chip: ChipCoord,
    /// Core index on the chip
    pub core: u8,
}

impl CoreLocation {
    /// Create a core location
    pub const fn new(x: u8, y: u8, core: u8) -> Self {
        Self {
            chip: ChipCoord::new(x, y),
            core,
        }
    }
}

impl fmt::Display for CoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.chip.x, self.chip.y, self.core)
    }
}

/// Address in a chip's external memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress {
    /// Chip whose memory this points into
    pub chip: ChipCoord,
    /// Absolute address as seen by cores on that chip
    pub address: u32,
}

impl DeviceAddress {
    /// Address `bytes` further on
    #[must_use]
    pub const fn offset(self, bytes: u32) -> Self {
        Self {
            chip: self.chip,
            address: self.address + bytes,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:08x}", self.chip, self.address)
    }
}

/// Device memory transport.
///
/// Implementations must be deterministic for identical call sequences so
/// that re-loading a network yields the same addresses.
pub trait MemoryTransport: fmt::Debug {
    /// Reserve `bytes` of external memory on the chip hosting `core`
    ///
    /// # Errors
    ///
    /// Returns error if the chip has insufficient free memory.
    fn allocate(&mut self, core: CoreLocation, bytes: usize) -> Result<DeviceAddress>;

    /// Write `data` starting at `address`, returning bytes written
    ///
    /// # Errors
    ///
    /// Returns error if the range was never allocated or the link fails.
    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> Result<usize>;

    /// Read `len` bytes starting at `address`
    ///
    /// # Errors
    ///
    /// Returns error if the range was never allocated or the link fails.
    fn read(&mut self, address: DeviceAddress, len: usize) -> Result<Vec<u8>>;

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-process memory, no hardware required
    Software,

    /// Per-chip image files on disk
    ImageFile,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => write!(f, "Software"),
            Self::ImageFile => write!(f, "Image file"),
        }
    }
}
