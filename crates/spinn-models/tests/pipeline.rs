//! End-to-end compilation tests
//!
//! Networks go through compile, place and load on the in-process and
//! image-file backends; synaptic matrices are read back and compared with
//! what the connectors promise.

use spinn_chip::machine::ChipResources;
use spinn_driver::{ChipCoord, ImageFileBackend, SequentialPlacer, SoftwareBackend};
use spinn_models::cluster::SynapseReadback;
use spinn_models::prelude::*;
use spinn_models::{CompiledNetwork, PopulationId, SynapseParam};
use std::collections::BTreeSet;

const DESCRIPTION: &str = r#"
[[population]]
label = "stimulus"
size = 200
cell = "spike_source_poisson"
parameters = { rate = 15.0 }

[[population]]
label = "excitatory"
size = 400
cell = "if_curr_exp"
parameters = { v = { distribution = "uniform", low = -65.0, high = -55.0 } }

[[population]]
label = "inhibitory"
size = 100
cell = "if_cond_exp"

[[projection]]
pre = "stimulus"
post = "excitatory"
connector = { type = "fixed_probability", p_connect = 0.1 }
weight = { distribution = "uniform", low = 0.1, high = 0.4, native = true }

[[projection]]
pre = "excitatory"
post = "excitatory"
connector = { type = "fixed_number_pre", n = 20, allow_self_connections = false }
synapse = { model = "stdp", w_max = 0.5 }
weight = 0.2
delay = { distribution = "uniform_int", low = 1, high = 12 }

[[projection]]
pre = "excitatory"
post = "inhibitory"
connector = { type = "all_to_all" }
weight = 0.05

[[projection]]
pre = "inhibitory"
post = "excitatory"
receptor = "inhibitory"
connector = { type = "fixed_probability", p_connect = 0.2 }
weight = 0.3
delay = 2.0
"#;

fn placer() -> SequentialPlacer {
    SequentialPlacer::new(4, 4, ChipResources::SPINNAKER)
}

fn read_back(
    compiled: &CompiledNetwork,
    pre: PopulationId,
    post: PopulationId,
    config: &CompileConfig,
    backend: &mut SoftwareBackend,
) -> Vec<SynapseReadback> {
    let mut synapses = Vec::new();
    for cluster in &compiled.synapse[&post] {
        synapses.extend(cluster.read_synaptic_matrices(pre, config, &mut *backend).unwrap());
    }
    synapses.sort_by(|a, b| (a.pre, a.post).cmp(&(b.pre, b.post)));
    synapses
}

#[test]
fn description_compiles_and_loads() {
    let network = NetworkDescription::from_toml_str(DESCRIPTION)
        .unwrap()
        .into_network()
        .unwrap();
    let config = CompileConfig {
        num_profile_samples: Some(8),
        ..CompileConfig::default()
    };
    let compiler = Compiler::new(config).unwrap();
    let mut backend = SoftwareBackend::reference();
    let (compiled, report) = compiler.run(&network, &mut placer(), &mut backend).unwrap();

    assert_eq!(
        report.vertices,
        compiled.neuron_vertices() + compiled.synapse_vertices() + compiled.current_input_vertices()
    );
    assert!(report.bytes > 0);

    // Every population has outgoing synaptic projections, so every one gets neuron cores
    assert_eq!(compiled.neural.len(), 3);
    let excitatory = network.find_population("excitatory").unwrap();
    // Static excitatory, STDP excitatory and static inhibitory input
    assert_eq!(compiled.synapse[&excitatory].len(), 3);
    assert!(compiled.synapse[&excitatory].iter().any(|c| c.model().is_plastic()));

    for cluster in compiled.neural.values() {
        assert!(cluster.placements().iter().all(|p| p.image.is_some()));
        let profiles = cluster.read_profile(&mut backend).unwrap();
        assert_eq!(profiles.len(), cluster.vertices.len());
        assert!(profiles.iter().all(|(_, samples)| samples.is_empty()));
    }
    for cluster in compiled.synapse.values().flatten() {
        assert!(cluster.placements().iter().all(|p| p.image.is_some() && p.out_buffers.is_some()));
    }
}

#[test]
fn host_delays_survive_the_round_trip() {
    let network = NetworkDescription::from_toml_str(DESCRIPTION)
        .unwrap()
        .into_network()
        .unwrap();
    let config = CompileConfig::default();
    let compiler = Compiler::new(config.clone()).unwrap();
    let mut backend = SoftwareBackend::reference();
    let (compiled, _) = compiler.run(&network, &mut placer(), &mut backend).unwrap();

    let excitatory = network.find_population("excitatory").unwrap();
    let inhibitory = network.find_population("inhibitory").unwrap();

    let recurrent = read_back(&compiled, excitatory, excitatory, &config, &mut backend);
    assert_eq!(recurrent.len(), 400 * 20);
    assert!(recurrent.iter().all(|s| s.pre != s.post));
    assert!(recurrent.iter().all(|s| (1.0..=12.0).contains(&s.delay_ms)));
    assert!(recurrent.iter().any(|s| s.delay_ms > 7.0));

    let feedback = read_back(&compiled, inhibitory, excitatory, &config, &mut backend);
    assert!(!feedback.is_empty());
    assert!(feedback.iter().all(|s| (s.delay_ms - 2.0).abs() < 1e-9));
    assert!(feedback.iter().all(|s| (s.weight - 0.3).abs() < 1e-3));
}

#[test]
fn fixed_total_is_conserved_across_slices() {
    let mut network = Network::new();
    let pre = network.add_population("pre", 300, CellModel::IfCurrExp);
    let post = network.add_population("post", 2000, CellModel::IfCurrExp);
    network
        .add_projection(
            pre,
            post,
            // Ten ticks of delay keeps the rows on the host
            ProjectionSpec::new(Connector::FixedTotalNumber {
                n: 1000,
                with_replacement: false,
            })
            .delay(10.0),
        )
        .unwrap();

    let config = CompileConfig::default();
    let compiler = Compiler::new(config.clone()).unwrap();
    let mut backend = SoftwareBackend::reference();
    let (compiled, _) = compiler.run(&network, &mut placer(), &mut backend).unwrap();
    assert!(compiled.synapse[&post][0].post_slices.len() > 1);

    let synapses = read_back(&compiled, pre, post, &config, &mut backend);
    let pairs: BTreeSet<(u32, u32)> = synapses.iter().map(|s| (s.pre, s.post)).collect();
    assert_eq!(synapses.len(), 1000);
    assert_eq!(pairs.len(), 1000);
}

#[test]
fn full_width_delayed_rows_load() {
    let mut network = Network::new();
    let pre = network.add_population("pre", 1024, CellModel::IfCurrExp);
    let post = network.add_population("post", 1024, CellModel::IfCurrExp);
    network
        .add_projection(
            pre,
            post,
            ProjectionSpec::new(Connector::AllToAll {
                allow_self_connections: true,
            })
            .delay(10.0),
        )
        .unwrap();

    let config = CompileConfig::default();
    let compiler = Compiler::new(config.clone()).unwrap();
    let mut backend = SoftwareBackend::reference();
    let (compiled, _) = compiler.run(&network, &mut placer(), &mut backend).unwrap();
    let widths: Vec<u32> = compiled.synapse[&post][0].post_slices.iter().map(|s| s.len()).collect();
    assert_eq!(widths, vec![1024]);

    // Every row holds 1024 synapses in a single extension slot
    let synapses = read_back(&compiled, pre, post, &config, &mut backend);
    assert_eq!(synapses.len(), 1024 * 1024);
    assert!(synapses.iter().all(|s| (s.delay_ms - 10.0).abs() < 1e-9));
}

#[test]
fn direct_input_round_trips_through_image_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut network = Network::new();
    let stimulus = network.add_population("stimulus", 300, CellModel::SpikeSourcePoisson);
    let target = network.add_population("target", 200, CellModel::IfCurrExp);
    network
        .add_projection(stimulus, target, ProjectionSpec::new(Connector::OneToOne).weight(0.25).delay(3.0))
        .unwrap();

    let config = CompileConfig::default();
    let mut backend = ImageFileBackend::create(dir.path(), ChipResources::SPINNAKER.sdram_bytes).unwrap();
    let (compiled, report) = Compiler::new(config.clone())
        .unwrap()
        .run(&network, &mut placer(), &mut backend)
        .unwrap();
    assert_eq!(report.vertices, compiled.neuron_vertices() + compiled.current_input_vertices());

    // Neurons both populations share are linked one to one
    let links = compiled.current_input[&target][0].read_connections(&config, &mut backend).unwrap();
    assert_eq!(links.len(), 200);
    assert!(links.iter().all(|l| l.pre == l.post && l.post < 200));
    assert!(links.iter().all(|l| (l.weight - 0.25).abs() < 1e-3 && (l.delay_ms - 3.0).abs() < 1e-9));
}

#[test]
fn compilation_is_deterministic() {
    let build = || {
        let mut network = Network::new();
        let pre = network.add_population("pre", 500, CellModel::IfCurrExp);
        let post = network.add_population("post", 500, CellModel::IfCurrExp);
        network
            .add_projection(
                pre,
                post,
                ProjectionSpec::new(Connector::FixedProbability {
                    p_connect: 0.05,
                    allow_self_connections: true,
                })
                .weight(SynapseParam::Random(RandomDistribution::host(Distribution::Normal {
                    mu: 0.5,
                    sigma: 0.1,
                })))
                .delay(9.0),
            )
            .unwrap();
        let config = CompileConfig::default();
        let mut backend = SoftwareBackend::reference();
        let (compiled, report) = Compiler::new(config.clone())
            .unwrap()
            .run(&network, &mut placer(), &mut backend)
            .unwrap();
        let synapses = read_back(&compiled, pre, post, &config, &mut backend);
        let slices = compiled.neural[&pre].vertices.clone();
        let synapse_vertices = compiled.synapse[&post][0].vertices.clone();
        (report.bytes, slices, synapse_vertices, synapses)
    };

    let (bytes_a, slices_a, vertices_a, synapses_a) = build();
    let (bytes_b, slices_b, vertices_b, synapses_b) = build();
    assert_eq!(bytes_a, bytes_b);
    assert_eq!(slices_a, slices_b);
    assert_eq!(vertices_a, vertices_b);
    assert!(!synapses_a.is_empty());
    assert_eq!(synapses_a, synapses_b);
}

#[test]
fn image_files_hold_loaded_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let network = NetworkDescription::from_toml_str(DESCRIPTION)
        .unwrap()
        .into_network()
        .unwrap();
    let mut backend = ImageFileBackend::create(dir.path(), ChipResources::SPINNAKER.sdram_bytes).unwrap();
    let (_, report) = Compiler::new(CompileConfig::default())
        .unwrap()
        .run(&network, &mut placer(), &mut backend)
        .unwrap();

    let path = backend.image_path(ChipCoord::new(0, 0));
    let written = std::fs::metadata(path).unwrap().len();
    assert!(report.bytes > 0);
    assert!(written > 0);
}

#[test]
fn placement_failure_names_the_vertex() {
    let mut network = Network::new();
    let pre = network.add_population("big", 1000, CellModel::IfCurrExp);
    network
        .add_projection(pre, pre, ProjectionSpec::new(Connector::AllToAll { allow_self_connections: true }))
        .unwrap();

    let tiny = ChipResources {
        sdram_bytes: 1024,
        ..ChipResources::SPINNAKER
    };
    let mut placer = SequentialPlacer::new(1, 1, tiny);
    let mut backend = SoftwareBackend::reference();
    let err = Compiler::new(CompileConfig::default())
        .unwrap()
        .run(&network, &mut placer, &mut backend)
        .unwrap_err();
    match err {
        CompileError::Loading { vertex, .. } => assert!(vertex.starts_with("big/neurons/")),
        other => panic!("unexpected error: {other}"),
    }
}
