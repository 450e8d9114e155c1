//! Vertex placement
//!
//! Placement and routing are external services; the compiler only needs
//! `place(vertex, resources) -> core`. [`SequentialPlacer`] is the simplest
//! conforming implementation: it fills application cores chip by chip in
//! row-major order and tracks memory so that no chip is oversubscribed.

use crate::backend::{ChipCoord, CoreLocation};
use crate::error::{DriverError, Result};
use spinn_chip::machine::ChipResources;
use std::collections::BTreeMap;
use tracing::debug;

/// Resources a vertex asks the placer for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexResources {
    /// Cores (always 1 for the vertices produced by the compiler)
    pub cores: u32,
    /// External memory the vertex will allocate
    pub sdram_bytes: usize,
}

impl VertexResources {
    /// One core with `sdram_bytes` of memory
    pub const fn single_core(sdram_bytes: usize) -> Self {
        Self {
            cores: 1,
            sdram_bytes,
        }
    }
}

/// Placement service
pub trait Placer {
    /// Choose a core for the vertex named `vertex`
    ///
    /// # Errors
    ///
    /// Returns error if the machine has no core with enough resources.
    fn place(&mut self, vertex: &str, resources: &VertexResources) -> Result<CoreLocation>;
}

/// Row-major, first-fit placer over a rectangular machine.
#[derive(Debug)]
pub struct SequentialPlacer {
    width: u8,
    height: u8,
    chip: ChipResources,
    next_core: BTreeMap<ChipCoord, u8>,
    sdram_used: BTreeMap<ChipCoord, usize>,
    cursor: usize,
}

impl SequentialPlacer {
    /// Core 0 of every chip runs the monitor.
    const FIRST_APPLICATION_CORE: u8 = 1;

    /// Create a placer for a `width` × `height` machine
    pub fn new(width: u8, height: u8, chip: ChipResources) -> Self {
        Self {
            width,
            height,
            chip,
            next_core: BTreeMap::new(),
            sdram_used: BTreeMap::new(),
            cursor: 0,
        }
    }

    fn chip_at(&self, index: usize) -> Option<ChipCoord> {
        let width = usize::from(self.width);
        if index >= width * usize::from(self.height) {
            return None;
        }
        let x = u8::try_from(index % width).ok()?;
        let y = u8::try_from(index / width).ok()?;
        Some(ChipCoord::new(x, y))
    }
}

impl Placer for SequentialPlacer {
    fn place(&mut self, vertex: &str, resources: &VertexResources) -> Result<CoreLocation> {
        let last_core = u8::try_from(self.chip.cores_per_chip).unwrap_or(u8::MAX);
        let mut index = self.cursor;
        while let Some(chip) = self.chip_at(index) {
            let core = *self
                .next_core
                .get(&chip)
                .unwrap_or(&Self::FIRST_APPLICATION_CORE);
            let used = self.sdram_used.get(&chip).copied().unwrap_or(0);
            let cores_free = u32::from(core) + resources.cores <= u32::from(last_core) + 1;
            if cores_free && used + resources.sdram_bytes <= self.chip.sdram_bytes {
                let next = u32::from(core) + resources.cores;
                self.next_core
                    .insert(chip, u8::try_from(next).unwrap_or(u8::MAX));
                self.sdram_used.insert(chip, used + resources.sdram_bytes);
                self.cursor = index;
                let location = CoreLocation { chip, core };
                debug!("Placed {vertex} on {location}");
                return Ok(location);
            }
            index += 1;
        }
        Err(DriverError::placement_failed(
            vertex,
            format!(
                "no core with {} bytes free on a {}x{} machine",
                resources.sdram_bytes, self.width, self.height
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_chip_before_moving_on() {
        let mut placer = SequentialPlacer::new(2, 1, ChipResources::SPINNAKER);
        let res = VertexResources::single_core(1024);
        let cores: Vec<_> = (0..17)
            .map(|i| placer.place(&format!("v{i}"), &res).unwrap())
            .collect();
        assert_eq!(cores[0], CoreLocation::new(0, 0, 1));
        assert_eq!(cores[15], CoreLocation::new(0, 0, 16));
        assert_eq!(cores[16], CoreLocation::new(1, 0, 1));
    }

    #[test]
    fn memory_limits_respected() {
        let chip = ChipResources {
            sdram_bytes: 4096,
            ..ChipResources::SPINNAKER
        };
        let mut placer = SequentialPlacer::new(1, 1, chip);
        placer.place("a", &VertexResources::single_core(3000)).unwrap();
        assert!(placer.place("b", &VertexResources::single_core(2000)).is_err());
    }
}
