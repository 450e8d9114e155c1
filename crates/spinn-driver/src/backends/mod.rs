//! Memory transport implementations
//!
//! Two backends available:
//! - **Software**: Chip memories held in process (tests, dry runs, CI)
//! - **ImageFile**: One sparse file per chip, written with positioned I/O
//!   so a later tool can stream the images to the machine

pub mod file;
pub mod software;

pub use file::ImageFileBackend;
pub use software::SoftwareBackend;

use crate::backend::{ChipCoord, DeviceAddress, SDRAM_BASE};
use crate::error::{DriverError, Result};

/// Allocations must start on a word boundary.
const ALIGNMENT: usize = 4;

/// Bump allocator over one chip's external memory.
#[derive(Debug, Clone)]
pub(crate) struct ChipAllocator {
    chip: ChipCoord,
    capacity: usize,
    next: usize,
    blocks: Vec<(usize, usize)>,
}

impl ChipAllocator {
    pub(crate) fn new(chip: ChipCoord, capacity: usize) -> Self {
        Self {
            chip,
            capacity,
            next: 0,
            blocks: Vec::new(),
        }
    }

    /// Reserve `bytes`, returning the offset from the memory base.
    pub(crate) fn allocate(&mut self, bytes: usize) -> Result<usize> {
        let start = self.next.next_multiple_of(ALIGNMENT);
        let available = self.capacity.saturating_sub(start);
        if bytes > available {
            return Err(DriverError::OutOfMemory {
                chip: self.chip,
                requested: bytes,
                available,
            });
        }
        self.next = start + bytes;
        self.blocks.push((start, bytes));
        Ok(start)
    }

    /// Convert an address into a memory offset, checking it lies inside one
    /// allocated block.
    pub(crate) fn check(&self, address: DeviceAddress, len: usize) -> Result<usize> {
        let invalid = || DriverError::InvalidAddress {
            chip: self.chip,
            address: address.address,
            len,
        };
        let offset = address
            .address
            .checked_sub(SDRAM_BASE)
            .ok_or_else(invalid)? as usize;
        let inside = self
            .blocks
            .iter()
            .any(|&(start, size)| offset >= start && offset + len <= start + size);
        if inside {
            Ok(offset)
        } else {
            Err(invalid())
        }
    }

    pub(crate) const fn used(&self) -> usize {
        self.next
    }
}

pub(crate) fn to_device_address(chip: ChipCoord, offset: usize) -> Result<DeviceAddress> {
    let offset = u32::try_from(offset)
        .map_err(|_| DriverError::transfer_failed(format!("offset {offset} exceeds 32-bit space")))?;
    Ok(DeviceAddress {
        chip,
        address: SDRAM_BASE + offset,
    })
}
