//! Contiguous neuron index ranges

use std::fmt;
use std::ops::Range;

/// Half-open range `[start, stop)` of neuron indices within a population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeuronSlice {
    /// First neuron
    pub start: u32,
    /// One past the last neuron
    pub stop: u32,
}

impl NeuronSlice {
    /// Create a slice; `stop` is clamped to at least `start`
    pub const fn new(start: u32, stop: u32) -> Self {
        Self {
            start,
            stop: if stop < start { start } else { stop },
        }
    }

    /// Slice covering a whole population
    pub const fn whole(size: u32) -> Self {
        Self::new(0, size)
    }

    /// Number of neurons
    pub const fn len(&self) -> u32 {
        self.stop - self.start
    }

    /// Whether the slice is empty
    pub const fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Whether `index` falls in the slice
    pub const fn contains(&self, index: u32) -> bool {
        index >= self.start && index < self.stop
    }

    /// Indices as a `usize` range
    pub const fn range(&self) -> Range<usize> {
        self.start as usize..self.stop as usize
    }

    /// Intersection, `None` when disjoint
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        (start < stop).then_some(Self { start, stop })
    }
}

impl fmt::Display for NeuronSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Split `size` neurons into consecutive slices of at most `width`
///
/// Every slice but the last has exactly `width` neurons.
pub fn split_slice(size: u32, width: u32) -> Vec<NeuronSlice> {
    if width == 0 {
        return Vec::new();
    }
    (0..size)
        .step_by(width as usize)
        .map(|start| NeuronSlice::new(start, start.saturating_add(width).min(size)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_population() {
        let slices = split_slice(2000, 1024);
        assert_eq!(slices, vec![NeuronSlice::new(0, 1024), NeuronSlice::new(1024, 2000)]);
        assert_eq!(slices[1].len(), 976);
        assert_eq!(split_slice(1024, 1024).len(), 1);
        assert!(split_slice(0, 1024).is_empty());
        assert!(split_slice(10, 0).is_empty());
    }

    #[test]
    fn overlap_and_contains() {
        let a = NeuronSlice::new(0, 10);
        let b = NeuronSlice::new(5, 20);
        assert_eq!(a.overlap(&b), Some(NeuronSlice::new(5, 10)));
        assert_eq!(a.overlap(&NeuronSlice::new(10, 20)), None);
        assert!(a.contains(9));
        assert!(!a.contains(10));
        assert_eq!(a.to_string(), "[0, 10)");
    }
}
