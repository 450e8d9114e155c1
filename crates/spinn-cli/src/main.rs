//! `spinn`: command-line front end for the spiking network compiler.
//!
//! ```text
//! USAGE:
//!   spinn partition <network.toml>             Per-core widths and vertex layout
//!   spinn compile <network.toml> [--out DIR]   Compile, place and load (dry run without --out)
//!   spinn inspect <network.toml> <pre> <post>  Read back the synapses between two populations
//! ```
//!
//! Every command takes `--config <compile.toml>` for compile-wide settings
//! and `-v` for debug logging (`RUST_LOG` takes precedence).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spinn_chip::machine::ChipResources;
use spinn_driver::{ChipCoord, ImageFileBackend, MemoryTransport, SequentialPlacer, SoftwareBackend};
use spinn_models::{CompileConfig, CompiledNetwork, Compiler, Network, NetworkDescription};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spinn", about = "Spiking neural network compiler", version)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct Common {
    /// Network description (TOML).
    network: PathBuf,
    /// Compile settings (TOML); defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Machine width in chips.
    #[arg(long, default_value_t = 8)]
    width: u8,
    /// Machine height in chips.
    #[arg(long, default_value_t = 8)]
    height: u8,
}

#[derive(Subcommand)]
enum Cmd {
    /// Derive per-core widths and partition every population.
    Partition(Common),
    /// Compile, place and load a network.
    Compile {
        #[command(flatten)]
        common: Common,
        /// Write one image file per chip into this directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load in memory and read back the synapses of one pair of populations.
    Inspect {
        #[command(flatten)]
        common: Common,
        /// Pre-synaptic population label.
        pre: String,
        /// Post-synaptic population label.
        post: String,
        /// Print every synapse instead of a summary.
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    match cli.command {
        Cmd::Partition(common) => cmd_partition(&common)?,
        Cmd::Compile { common, out } => cmd_compile(&common, out.as_deref())?,
        Cmd::Inspect {
            common,
            pre,
            post,
            all,
        } => cmd_inspect(&common, &pre, &post, all)?,
    }

    Ok(())
}

fn setup(common: &Common) -> Result<(Network, Compiler)> {
    let network = NetworkDescription::from_file(&common.network)
        .and_then(NetworkDescription::into_network)
        .with_context(|| format!("reading network {}", common.network.display()))?;
    let config = match &common.config {
        Some(path) => CompileConfig::from_file(path).with_context(|| format!("reading config {}", path.display()))?,
        None => CompileConfig::default(),
    };
    info!("{} ticks of {} us", config.sim_ticks(), config.timer_period_us());
    Ok((network, Compiler::new(config)?))
}

fn placer(common: &Common) -> SequentialPlacer {
    SequentialPlacer::new(common.width, common.height, ChipResources::SPINNAKER)
}

fn cmd_partition(common: &Common) -> Result<()> {
    let (network, compiler) = setup(common)?;
    let compiled = compiler.compile(&network)?;

    println!("{:<20} {:>8} {:>8} {:>6} {:>8}", "population", "size", "neuron", "cores", "vertices");
    for population in network.populations() {
        let Some(constraints) = compiled.constraints.get(&population.id) else {
            continue;
        };
        let vertices = compiled.neural.get(&population.id).map_or(0, |c| c.vertices.len());
        println!(
            "{:<20} {:>8} {:>8} {:>6} {:>8}",
            population.label, population.size, constraints.neuron, constraints.cores, vertices
        );
        for (synapse_type, width) in &constraints.synapse {
            println!("    {synapse_type:<24} width {width}");
        }
        for cluster in compiled.synapse.get(&population.id).into_iter().flatten() {
            for (i, vertex) in cluster.vertices.iter().enumerate() {
                let sources: usize = vertex.pre_vertices().iter().map(|(_, v)| v.len()).sum();
                println!(
                    "    {:<32} {} from {sources} vertices ({} connections), {} bytes",
                    cluster.vertex_label(i),
                    vertex.post_slice,
                    vertex.num_connections(),
                    vertex.sdram_bytes
                );
            }
        }
        for cluster in compiled.current_input.get(&population.id).into_iter().flatten() {
            for (i, slice) in cluster.slices.iter().enumerate() {
                println!("    {:<32} {slice} direct", cluster.vertex_label(i));
            }
        }
    }
    println!();
    println!(
        "{} neuron vertices, {} synapse vertices, {} current-input vertices",
        compiled.neuron_vertices(),
        compiled.synapse_vertices(),
        compiled.current_input_vertices()
    );
    Ok(())
}

fn run(
    common: &Common,
    network: &Network,
    compiler: &Compiler,
    transport: &mut dyn MemoryTransport,
) -> Result<CompiledNetwork> {
    let (compiled, report) = compiler
        .run(network, &mut placer(common), transport)
        .context("compiling network")?;
    println!(
        "Loaded {} vertices ({} neuron, {} synapse, {} current-input), {} bytes in {:.1?}",
        report.vertices,
        compiled.neuron_vertices(),
        compiled.synapse_vertices(),
        compiled.current_input_vertices(),
        report.bytes,
        report.duration
    );
    Ok(compiled)
}

fn cmd_compile(common: &Common, out: Option<&Path>) -> Result<()> {
    let (network, compiler) = setup(common)?;
    if let Some(dir) = out {
        let mut backend = ImageFileBackend::create(dir, ChipResources::SPINNAKER.sdram_bytes)?;
        run(common, &network, &compiler, &mut backend)?;
        println!("Images written to {}", dir.display());
        return Ok(());
    }

    let mut backend = SoftwareBackend::reference();
    run(common, &network, &compiler, &mut backend)?;
    for y in 0..common.height {
        for x in 0..common.width {
            let chip = ChipCoord::new(x, y);
            let used = backend.used_bytes(chip);
            if used > 0 {
                println!("  chip {chip}: {used} bytes");
            }
        }
    }
    Ok(())
}

fn cmd_inspect(common: &Common, pre: &str, post: &str, all: bool) -> Result<()> {
    let (network, compiler) = setup(common)?;
    let find = |label: &str| {
        network
            .find_population(label)
            .ok_or_else(|| anyhow::anyhow!("Population not found: {label}"))
    };
    let (pre_id, post_id) = (find(pre)?, find(post)?);

    let mut backend = SoftwareBackend::reference();
    let compiled = run(common, &network, &compiler, &mut backend)?;

    let mut synapses = Vec::new();
    for cluster in compiled.synapse.get(&post_id).into_iter().flatten() {
        synapses.extend(cluster.read_synaptic_matrices(pre_id, compiler.config(), &mut backend)?);
    }
    for cluster in compiled.current_input.get(&post_id).into_iter().flatten() {
        if cluster.pre == pre_id {
            synapses.extend(cluster.read_connections(compiler.config(), &mut backend)?);
        }
    }
    synapses.sort_by(|a, b| (a.pre, a.post).cmp(&(b.pre, b.post)));

    if all {
        for s in &synapses {
            println!("{:>6} -> {:<6} weight {:.6} delay {} ms", s.pre, s.post, s.weight, s.delay_ms);
        }
    }
    if synapses.is_empty() {
        println!("{pre} -> {post}: no synapses");
        return Ok(());
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = synapses.iter().map(|s| s.weight).sum::<f64>() / synapses.len() as f64;
    let (min_delay, max_delay) = synapses
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s.delay_ms), hi.max(s.delay_ms)));
    println!(
        "{pre} -> {post}: {} synapses, mean weight {mean:.4}, delays {min_delay}..{max_delay} ms",
        synapses.len()
    );
    Ok(())
}
