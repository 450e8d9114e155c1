//! Placement and device-memory transport for compiled vertex images.
//!
//! The compiler hands this crate finished region bytes; everything that
//! touches the machine goes through three injected primitives:
//!
//! ```text
//! place(vertex, resources)  -> core            (Placer)
//! allocate(core, bytes)     -> device address  (MemoryTransport)
//! write(address, bytes) / read(address, len)   (MemoryTransport)
//! ```
//!
//! # Backends
//!
//! ```text
//! SoftwareBackend   chip memories held in process (tests, dry runs)
//! ImageFileBackend  one sparse image file per chip
//! ```
//!
//! # Quick start
//!
//! ```
//! use spinn_driver::{CoreLocation, ImageLoader, SoftwareBackend, VertexImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = SoftwareBackend::reference();
//! let image = VertexImage::new("demo", 2).with_region(1, vec![0u8; 16]);
//! let loaded = ImageLoader::default().load(CoreLocation::new(0, 0, 1), &image, &mut backend)?;
//! assert!(loaded.region(1).is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod error;
mod loading;
mod placement;

pub use backend::{BackendType, ChipCoord, CoreLocation, DeviceAddress, MemoryTransport, SDRAM_BASE};
pub use backends::{ImageFileBackend, SoftwareBackend};
pub use error::{DriverError, Result};
pub use loading::{ImageLoader, LoadConfig, LoadMetrics, LoadedImage, RegionImage, VertexImage};
pub use placement::{Placer, SequentialPlacer, VertexResources};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        CoreLocation, DeviceAddress, DriverError, ImageLoader, MemoryTransport, Placer, Result,
        SequentialPlacer, SoftwareBackend, VertexImage, VertexResources,
    };
}
