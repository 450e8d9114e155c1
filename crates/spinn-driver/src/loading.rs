// SPDX-License-Identifier: AGPL-3.0-only

//! Vertex image loading
//!
//! A vertex image is a pointer table followed by the vertex's regions:
//!
//! ```text
//! word i (0 <= i < slots)   absolute address of region i, 0 if absent
//! region bytes              every present region, in slot order
//! ```
//!
//! Loading a vertex is: size the image, allocate it once on the placed core's
//! chip, fill in the pointer table, and hand the whole image to the transport
//! in a single write. Re-loading identical regions yields identical bytes.
//! There is no rollback across vertices: a failure leaves previously loaded
//! vertices in place.

use crate::backend::{CoreLocation, DeviceAddress, MemoryTransport};
use crate::error::{DriverError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One serialized region of a vertex image
#[derive(Debug, Clone)]
pub struct RegionImage {
    /// Pointer table slot
    pub slot: usize,
    /// Serialized contents
    pub data: Bytes,
}

/// All regions of one vertex, ready for upload
#[derive(Debug, Clone)]
pub struct VertexImage {
    /// Vertex label (for diagnostics)
    pub label: String,
    /// Number of pointer table slots
    pub slots: usize,
    /// Present regions, in slot order
    pub regions: Vec<RegionImage>,
}

impl VertexImage {
    /// Create an empty image with `slots` pointer table entries
    pub fn new(label: impl Into<String>, slots: usize) -> Self {
        Self {
            label: label.into(),
            slots,
            regions: Vec::new(),
        }
    }

    /// Add a region
    #[must_use]
    pub fn with_region(mut self, slot: usize, data: impl Into<Bytes>) -> Self {
        self.regions.push(RegionImage {
            slot,
            data: data.into(),
        });
        self
    }

    /// Bytes of the pointer table
    pub const fn table_bytes(&self) -> usize {
        self.slots * 4
    }

    /// Total image size: pointer table plus every region
    pub fn size(&self) -> usize {
        self.table_bytes() + self.regions.iter().map(|r| r.data.len()).sum::<usize>()
    }

    fn validate(&self, core: CoreLocation) -> Result<()> {
        let mut previous = None;
        for region in &self.regions {
            if region.slot >= self.slots {
                return Err(DriverError::invalid_image(
                    core,
                    format!("{}: region slot {} >= {}", self.label, region.slot, self.slots),
                ));
            }
            if previous.is_some_and(|p| p >= region.slot) {
                return Err(DriverError::invalid_image(
                    core,
                    format!("{}: region slots out of order at {}", self.label, region.slot),
                ));
            }
            previous = Some(region.slot);
        }
        Ok(())
    }
}

/// Loader configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadConfig {
    /// Read every image back and compare after writing
    pub verify: bool,
}

/// Where a vertex image ended up
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Core the image belongs to
    pub core: CoreLocation,
    /// Start of the pointer table
    pub base: DeviceAddress,
    /// Address of each slot's region, `None` when absent
    pub region_addresses: Vec<Option<DeviceAddress>>,
    /// Transfer metrics
    pub metrics: LoadMetrics,
}

impl LoadedImage {
    /// Address of the region in `slot`
    pub fn region(&self, slot: usize) -> Option<DeviceAddress> {
        self.region_addresses.get(slot).copied().flatten()
    }
}

/// Vertex image loader
#[derive(Debug, Default)]
pub struct ImageLoader {
    config: LoadConfig,
}

impl ImageLoader {
    /// Create loader with configuration
    pub const fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Allocate, assemble and write one vertex image
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The image is malformed
    /// - Allocation fails
    /// - The write is incomplete or verification fails
    pub fn load(
        &self,
        core: CoreLocation,
        image: &VertexImage,
        transport: &mut dyn MemoryTransport,
    ) -> Result<LoadedImage> {
        image.validate(core)?;

        let size = image.size();
        let start = Instant::now();
        let base = transport.allocate(core, size)?;
        debug!("{}: {} bytes at {} on core {}", image.label, size, base, core);

        // Pointer table first, regions packed behind it in slot order
        let mut region_addresses = vec![None; image.slots];
        let mut offset = image.table_bytes();
        for region in &image.regions {
            let offset_bytes = u32::try_from(offset)
                .map_err(|_| DriverError::invalid_image(core, "image exceeds 4 GiB"))?;
            region_addresses[region.slot] = Some(base.offset(offset_bytes));
            offset += region.data.len();
        }

        let mut buffer = BytesMut::with_capacity(size);
        for address in &region_addresses {
            buffer.put_u32_le(address.map_or(0, |a| a.address));
        }
        for region in &image.regions {
            buffer.put_slice(&region.data);
        }

        let written = transport.write(base, &buffer)?;
        if written != buffer.len() {
            return Err(DriverError::transfer_failed(format!(
                "{} write incomplete: {} of {} bytes",
                image.label,
                written,
                buffer.len()
            )));
        }

        if self.config.verify {
            let readback = transport.read(base, buffer.len())?;
            if readback[..] != buffer[..] {
                return Err(DriverError::transfer_failed(format!(
                    "{} read-back differs from written image",
                    image.label
                )));
            }
        }

        let duration = start.elapsed();
        let metrics = LoadMetrics {
            bytes_transferred: written,
            duration,
            throughput_mbps: calculate_throughput(written, duration.as_secs_f64()),
        };
        info!(
            "{} loaded: {} bytes in {:?} ({:.2} MB/s)",
            image.label, metrics.bytes_transferred, metrics.duration, metrics.throughput_mbps
        );

        Ok(LoadedImage {
            core,
            base,
            region_addresses,
            metrics,
        })
    }
}

/// Load operation metrics
#[derive(Debug, Clone)]
pub struct LoadMetrics {
    /// Total bytes transferred
    pub bytes_transferred: usize,

    /// Total duration
    pub duration: Duration,

    /// Throughput (MB/s)
    pub throughput_mbps: f64,
}

/// Calculate throughput in MB/s
fn calculate_throughput(bytes: usize, seconds: f64) -> f64 {
    if seconds == 0.0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let megabytes = bytes as f64 / 1_048_576.0;
    megabytes / seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SoftwareBackend;

    fn image() -> VertexImage {
        VertexImage::new("test", 4)
            .with_region(0, vec![1u8, 0, 0, 0])
            .with_region(2, vec![2u8; 8])
    }

    #[test]
    fn pointer_table_addresses_regions() {
        let mut backend = SoftwareBackend::new(1 << 16);
        let core = CoreLocation::new(0, 0, 1);
        let loaded = ImageLoader::default().load(core, &image(), &mut backend).unwrap();

        assert_eq!(loaded.metrics.bytes_transferred, 16 + 4 + 8);
        assert_eq!(loaded.region(0), Some(loaded.base.offset(16)));
        assert_eq!(loaded.region(1), None);
        assert_eq!(loaded.region(2), Some(loaded.base.offset(20)));

        let table = backend.read(loaded.base, 16).unwrap();
        let slot2 = u32::from_le_bytes([table[8], table[9], table[10], table[11]]);
        assert_eq!(slot2, loaded.base.address + 20);
        assert_eq!(&table[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn out_of_order_regions_rejected() {
        let bad = VertexImage::new("bad", 4)
            .with_region(2, vec![0u8; 4])
            .with_region(1, vec![0u8; 4]);
        let mut backend = SoftwareBackend::new(1 << 16);
        assert!(ImageLoader::default()
            .load(CoreLocation::new(0, 0, 1), &bad, &mut backend)
            .is_err());
    }

    #[test]
    fn verified_load_succeeds() {
        let mut backend = SoftwareBackend::new(1 << 16);
        let loader = ImageLoader::new(LoadConfig { verify: true });
        assert!(loader
            .load(CoreLocation::new(0, 0, 1), &image(), &mut backend)
            .is_ok());
    }

    #[test]
    fn test_throughput_calculation() {
        let throughput = calculate_throughput(1_048_576, 1.0);
        assert!((throughput - 1.0).abs() < 0.01);
    }
}
