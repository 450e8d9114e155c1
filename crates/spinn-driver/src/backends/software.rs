// SPDX-License-Identifier: AGPL-3.0-only

//! Software (in-process) memory backend
//!
//! Implements [`MemoryTransport`] over plain byte vectors, one per chip.
//! This enables:
//!
//! 1. **CI without hardware**: the full compile → place → load pipeline runs
//!    and every written byte can be inspected.
//! 2. **Dry runs**: loading a network without a machine reports exactly how
//!    much external memory each chip would need.
//! 3. **Read-back tests**: anything written can be read back through the
//!    same primitive used after a real run.

use super::{to_device_address, ChipAllocator};
use crate::backend::{BackendType, ChipCoord, CoreLocation, DeviceAddress, MemoryTransport};
use crate::error::Result;
use spinn_chip::machine::ChipResources;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug)]
struct ChipMemory {
    allocator: ChipAllocator,
    data: Vec<u8>,
}

/// Software memory backend.
#[derive(Debug)]
pub struct SoftwareBackend {
    sdram_bytes: usize,
    chips: BTreeMap<ChipCoord, ChipMemory>,
    writes: usize,
}

impl SoftwareBackend {
    /// Create a backend whose chips each hold `sdram_bytes` of memory
    pub fn new(sdram_bytes: usize) -> Self {
        Self {
            sdram_bytes,
            chips: BTreeMap::new(),
            writes: 0,
        }
    }

    /// Create with the reference chip's memory size
    pub fn reference() -> Self {
        Self::new(ChipResources::SPINNAKER.sdram_bytes)
    }

    /// Bytes allocated so far on `chip`
    pub fn used_bytes(&self, chip: ChipCoord) -> usize {
        self.chips.get(&chip).map_or(0, |m| m.allocator.used())
    }

    /// Number of `write` calls served
    pub const fn write_count(&self) -> usize {
        self.writes
    }

    fn chip_mut(&mut self, chip: ChipCoord) -> &mut ChipMemory {
        let capacity = self.sdram_bytes;
        self.chips.entry(chip).or_insert_with(|| ChipMemory {
            allocator: ChipAllocator::new(chip, capacity),
            data: Vec::new(),
        })
    }
}

impl MemoryTransport for SoftwareBackend {
    fn allocate(&mut self, core: CoreLocation, bytes: usize) -> Result<DeviceAddress> {
        let memory = self.chip_mut(core.chip);
        let offset = memory.allocator.allocate(bytes)?;

        // Memory is handed out zeroed
        if memory.data.len() < offset + bytes {
            memory.data.resize(offset + bytes, 0);
        }
        debug!("Software: allocated {bytes} bytes at offset {offset} for core {core}");
        to_device_address(core.chip, offset)
    }

    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> Result<usize> {
        let memory = self.chip_mut(address.chip);
        let offset = memory.allocator.check(address, data.len())?;
        memory.data[offset..offset + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(data.len())
    }

    fn read(&mut self, address: DeviceAddress, len: usize) -> Result<Vec<u8>> {
        let memory = self.chip_mut(address.chip);
        let offset = memory.allocator.check(address, len)?;
        Ok(memory.data[offset..offset + len].to_vec())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut backend = SoftwareBackend::new(4096);
        let core = CoreLocation::new(0, 0, 1);
        let addr = backend.allocate(core, 8).unwrap();
        backend.write(addr, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(backend.read(addr.offset(4), 4).unwrap(), vec![5, 6, 7, 8]);
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn chips_have_separate_memories() {
        let mut backend = SoftwareBackend::new(64);
        let a = backend.allocate(CoreLocation::new(0, 0, 1), 64).unwrap();
        let b = backend.allocate(CoreLocation::new(1, 0, 1), 64).unwrap();
        assert_eq!(a.address, b.address);
        assert!(backend.allocate(CoreLocation::new(0, 0, 2), 4).is_err());
    }

    #[test]
    fn unallocated_write_rejected() {
        let mut backend = SoftwareBackend::new(64);
        let addr = backend.allocate(CoreLocation::new(0, 0, 1), 4).unwrap();
        assert!(backend.write(addr, &[0; 8]).is_err());
    }
}
