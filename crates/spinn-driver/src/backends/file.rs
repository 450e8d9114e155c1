//! Image-file memory backend
//!
//! Each chip's external memory is mirrored by one sparse file
//! (`chip_<x>_<y>.sdram`) in an output directory. Writes and reads use
//! positioned I/O so the file offset always equals the memory offset.

use super::{to_device_address, ChipAllocator};
use crate::backend::{BackendType, ChipCoord, CoreLocation, DeviceAddress, MemoryTransport};
use crate::error::{DriverError, Result};
use rustix::io::{pread, pwrite};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
struct ChipImage {
    allocator: ChipAllocator,
    file: File,
}

/// File-backed memory backend.
#[derive(Debug)]
pub struct ImageFileBackend {
    directory: PathBuf,
    sdram_bytes: usize,
    chips: BTreeMap<ChipCoord, ChipImage>,
}

impl ImageFileBackend {
    /// Create a backend writing into `directory` (created if missing)
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn create(directory: impl AsRef<Path>, sdram_bytes: usize) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        info!("Writing chip images to {}", directory.display());
        Ok(Self {
            directory,
            sdram_bytes,
            chips: BTreeMap::new(),
        })
    }

    /// Path of the image file for `chip`
    pub fn image_path(&self, chip: ChipCoord) -> PathBuf {
        self.directory
            .join(format!("chip_{}_{}.sdram", chip.x, chip.y))
    }

    fn chip_mut(&mut self, chip: ChipCoord) -> Result<&mut ChipImage> {
        if !self.chips.contains_key(&chip) {
            let path = self.image_path(chip);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            debug!("Opened {}", path.display());
            self.chips.insert(
                chip,
                ChipImage {
                    allocator: ChipAllocator::new(chip, self.sdram_bytes),
                    file,
                },
            );
        }
        self.chips
            .get_mut(&chip)
            .ok_or_else(|| DriverError::transfer_failed(format!("chip {chip} not open")))
    }
}

impl MemoryTransport for ImageFileBackend {
    fn allocate(&mut self, core: CoreLocation, bytes: usize) -> Result<DeviceAddress> {
        let image = self.chip_mut(core.chip)?;
        let offset = image.allocator.allocate(bytes)?;
        // Extend so that reads of never-written regions return zeros
        let end = (offset + bytes) as u64;
        if image.file.metadata()?.len() < end {
            image.file.set_len(end)?;
        }
        to_device_address(core.chip, offset)
    }

    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> Result<usize> {
        let image = self.chip_mut(address.chip)?;
        let offset = image.allocator.check(address, data.len())? as u64;
        let mut written = 0;
        while written < data.len() {
            let n = pwrite(&image.file, &data[written..], offset + written as u64)?;
            if n == 0 {
                return Err(DriverError::transfer_failed(format!(
                    "Short write at {address}: {written} of {} bytes",
                    data.len()
                )));
            }
            written += n;
        }
        Ok(written)
    }

    fn read(&mut self, address: DeviceAddress, len: usize) -> Result<Vec<u8>> {
        let image = self.chip_mut(address.chip)?;
        let offset = image.allocator.check(address, len)? as u64;
        let mut buffer = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = pread(&image.file, &mut buffer[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(DriverError::transfer_failed(format!(
                    "Short read at {address}: {filled} of {len} bytes"
                )));
            }
            filled += n;
        }
        Ok(buffer)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::ImageFile
    }
}
