//! Backend parity tests
//!
//! The in-process and image-file backends must agree on addresses and on
//! every byte read back.

use spinn_chip::machine::ChipResources;
use spinn_driver::{
    CoreLocation, ImageFileBackend, ImageLoader, LoadConfig, MemoryTransport, Placer, SequentialPlacer,
    SoftwareBackend, VertexImage, VertexResources,
};

fn images() -> Vec<VertexImage> {
    (0..20u8)
        .map(|i| {
            VertexImage::new(format!("vertex/{i}"), 4)
                .with_region(0, vec![i; 12])
                .with_region(2, (0..=i).collect::<Vec<u8>>())
                .with_region(3, vec![0xAB; 40])
        })
        .collect()
}

fn load_all(transport: &mut dyn MemoryTransport) -> Vec<(CoreLocation, Vec<u8>)> {
    let mut placer = SequentialPlacer::new(2, 1, ChipResources::SPINNAKER);
    let loader = ImageLoader::new(LoadConfig { verify: true });
    images()
        .iter()
        .map(|image| {
            let core = placer
                .place(&image.label, &VertexResources::single_core(image.size()))
                .unwrap();
            let loaded = loader.load(core, image, transport).unwrap();
            let bytes = transport.read(loaded.base, image.size()).unwrap();
            (core, bytes)
        })
        .collect()
}

#[test]
fn software_and_file_backends_agree() {
    let dir = tempfile::tempdir().unwrap();
    let mut software = SoftwareBackend::reference();
    let mut file = ImageFileBackend::create(dir.path(), ChipResources::SPINNAKER.sdram_bytes).unwrap();

    let a = load_all(&mut software);
    let b = load_all(&mut file);
    assert_eq!(a, b);
    // Application cores of the first chip fill before the second is used
    assert_eq!(a[16].0, CoreLocation::new(1, 0, 1));
}

#[test]
fn pointer_table_leads_every_image() {
    let mut backend = SoftwareBackend::reference();
    let loader = ImageLoader::default();
    let images = images();
    let image = &images[3];
    let loaded = loader.load(CoreLocation::new(0, 0, 1), image, &mut backend).unwrap();

    let table = backend.read(loaded.base, 16).unwrap();
    let words: Vec<u32> = table
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(words[0], loaded.region(0).unwrap().address);
    assert_eq!(words[1], 0);
    assert_eq!(words[2], loaded.region(2).unwrap().address);
    assert_eq!(words[3], words[2] + 4);
    assert_eq!(backend.read(loaded.region(2).unwrap(), 4).unwrap(), vec![0, 1, 2, 3]);
}
