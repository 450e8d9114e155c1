//! Region slot numbering of vertex memory images.
//!
//! Every image begins with a pointer table holding one word per slot
//! (absolute device address, `0` when the region is absent), followed by the
//! regions themselves in slot order. The numbering below is shared with the
//! device-side programs.

/// Regions of a synapse processor image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum SynapseRegion {
    /// Timer period, tick count and application words.
    System = 0,
    /// Sorted key → sub-matrix table.
    KeyLookup = 1,
    /// Packed rows of every incoming sub-matrix.
    SynapticMatrix = 2,
    /// Plasticity rule parameters.
    Plasticity = 3,
    /// Addresses of the double-buffered output.
    OutputBuffer = 4,
    /// Delay buffer sizing.
    DelayBuffer = 5,
    /// On-device generation parameters for deferred sub-matrices.
    ConnectionBuilder = 6,
    /// Profiling samples.
    Profiler = 7,
    /// Counters.
    Statistics = 8,
}

impl SynapseRegion {
    /// Number of slots in the pointer table.
    pub const COUNT: usize = 9;

    /// Slot index.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}

/// Regions of a neuron processor image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum NeuronRegion {
    /// Timer period, tick count and application words.
    System = 0,
    /// Per-neuron mutable and immutable state.
    Neuron = 1,
    /// Per-neuron synapse shaping state.
    Synapse = 2,
    /// Output buffers of the synapse processors feeding this slice.
    InputBuffer = 3,
    /// Profiling samples.
    Profiler = 4,
    /// Counters.
    Statistics = 5,
}

impl NeuronRegion {
    /// Number of slots in the pointer table.
    pub const COUNT: usize = 6;

    /// Slot index.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}

/// Regions of a current-input processor image.
///
/// A current-input processor simulates a spike source for a slice of
/// neurons and writes its weighted output straight into the buffers of the
/// neuron processors it is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum CurrentInputRegion {
    /// Timer period, tick count and application words.
    System = 0,
    /// Per-neuron state of the simulated source.
    Source = 1,
    /// Weight and delay of every direct link.
    DirectInput = 2,
    /// Addresses of the double-buffered output.
    OutputBuffer = 3,
    /// Counters.
    Statistics = 4,
}

impl CurrentInputRegion {
    /// Number of slots in the pointer table.
    pub const COUNT: usize = 5;

    /// Slot index.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}
