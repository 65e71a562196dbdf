//! Cochain CLI - ring-lookup datasets and message passing from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Generate (or load) the cached dataset
//! cochain generate --root data/RING-LOOKUP --nodes 10
//!
//! # Split sizes and cell counts
//! cochain stats --root data/RING-LOOKUP --nodes 10
//!
//! # Three rounds of default up/down propagation on the edges
//! cochain propagate --root data/RING-LOOKUP --nodes 10 --dim 1 --layers 3
//! ```
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `warn`).

use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor};
use clap::{Parser, Subcommand, ValueEnum};
use cochain_core::datasets::{RingLookupConfig, RingLookupDataset};
use cochain_nn::{Aggregation, ChainConfig, ChainParams, ChainPropagator, DefaultChain};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cochain")]
#[command(about = "Cell complex datasets and directional message passing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or load the cached ring-lookup dataset
    Generate {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Show split sizes and cell counts
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Run default propagation on one dimension and report feature magnitude
    Propagate {
        #[command(flatten)]
        data: DataArgs,

        /// Number of propagation rounds
        #[arg(long, default_value = "2")]
        layers: usize,

        /// Reduction for up-adjacency messages
        #[arg(long, default_value = "add")]
        aggr_up: AggrArg,

        /// Reduction for down-adjacency messages
        #[arg(long, default_value = "add")]
        aggr_down: AggrArg,

        /// Cell dimension to propagate on (0 = nodes, 1 = edges, 2 = rings)
        #[arg(long, default_value = "0")]
        dim: usize,

        /// Number of complexes to process
        #[arg(long, default_value = "16")]
        limit: usize,
    },
}

#[derive(clap::Args)]
struct DataArgs {
    /// Dataset root; the cache lives in <root>/complex
    #[arg(long)]
    root: PathBuf,

    /// Ring length
    #[arg(long, default_value = "10")]
    nodes: usize,

    /// Training samples
    #[arg(long, default_value = "10000")]
    train: usize,

    /// Validation samples
    #[arg(long, default_value = "1000")]
    val: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Attach down adjacency to edges and rings
    #[arg(long)]
    down_adj: bool,
}

impl DataArgs {
    fn config(&self) -> RingLookupConfig {
        RingLookupConfig::default()
            .with_nodes(self.nodes)
            .with_samples(self.train, self.val)
            .with_seed(self.seed)
            .with_down_adj(self.down_adj)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AggrArg {
    /// Sum of messages
    Add,
    /// Mean of messages (0 without messages)
    Mean,
    /// Elementwise maximum (0 without messages)
    Max,
}

impl From<AggrArg> for Aggregation {
    fn from(arg: AggrArg) -> Self {
        match arg {
            AggrArg::Add => Aggregation::Add,
            AggrArg::Mean => Aggregation::Mean,
            AggrArg::Max => Aggregation::Max,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { data } => cmd_generate(&data),
        Commands::Stats { data } => cmd_stats(&data),
        Commands::Propagate {
            data,
            layers,
            aggr_up,
            aggr_down,
            dim,
            limit,
        } => cmd_propagate(&data, layers, aggr_up.into(), aggr_down.into(), dim, limit),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn load_dataset(data: &DataArgs) -> Result<RingLookupDataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading ring lookup (n={}) from {}...", data.nodes, data.root.display()));

    let dataset = RingLookupDataset::load(&data.root, data.config(), &Device::Cpu)
        .with_context(|| format!("Failed to load dataset under {}", data.root.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    tracing::info!(complexes = dataset.len(), nodes = data.nodes, "dataset ready");
    Ok(dataset)
}

fn cmd_generate(data: &DataArgs) -> Result<()> {
    let dataset = load_dataset(data)?;
    let [complexes, idx] = dataset.processed_paths();
    let (train, val, _) = dataset.split();

    println!("Complexes:      {}", dataset.len());
    println!("Train:          {}", train.len());
    println!("Val:            {}", val.len());
    println!("Cache:          {}", complexes.display());
    println!("Split:          {}", idx.display());
    Ok(())
}

fn cmd_stats(data: &DataArgs) -> Result<()> {
    let dataset = load_dataset(data)?;
    let (train, val, test) = dataset.split();

    println!("{} Statistics", RingLookupDataset::NAME);
    println!("========================");
    println!("Complexes:      {}", dataset.len());
    println!("Train:          {}", train.len());
    println!("Val:            {}", val.len());
    println!("Test:           {}", test.map_or(0, <[usize]>::len));
    println!("Classes:        {}", dataset.num_classes());

    for dim in 0..=RingLookupDataset::MAX_DIM {
        let mut cells = 0;
        let mut up = 0;
        let mut down = 0;
        for complex in dataset.complexes() {
            if let Some(cochain) = complex.cochain(dim) {
                cells += cochain.num_cells()?;
                up += cochain.num_up()?;
                down += cochain.num_down()?;
            }
        }
        let avg = |total: usize| total as f64 / dataset.len().max(1) as f64;
        println!(
            "Dim {dim}:          {:.2} cells, {:.2} up, {:.2} down (avg per complex)",
            avg(cells),
            avg(up),
            avg(down)
        );
    }
    Ok(())
}

fn cmd_propagate(
    data: &DataArgs,
    layers: usize,
    aggr_up: Aggregation,
    aggr_down: Aggregation,
    dim: usize,
    limit: usize,
) -> Result<()> {
    if dim > RingLookupDataset::MAX_DIM {
        bail!("dimension {dim} is above the complex dimension {}", RingLookupDataset::MAX_DIM);
    }
    let dataset = load_dataset(data)?;
    let config = ChainConfig::new(Some(aggr_up), Some(aggr_down));
    let propagator = ChainPropagator::new(DefaultChain::new(config));

    let mut inputs = Vec::new();
    for complex in dataset.complexes().iter().take(limit) {
        let cochain = complex
            .cochain(dim)
            .with_context(|| format!("complex has no cells of dimension {dim}"))?;
        inputs.push(ChainParams::from_cochain(cochain));
    }
    if inputs.is_empty() {
        bail!("no complexes to propagate");
    }

    println!("Propagating on dim {dim} of {} complexes", inputs.len());
    println!("Layer 0:        {:.6}", mean_abs(&inputs)?);
    for layer in 1..=layers {
        for params in &mut inputs {
            params.x = propagator
                .propagate_params(params)
                .with_context(|| format!("propagation failed at layer {layer}"))?;
        }
        println!("Layer {layer}:        {:.6}", mean_abs(&inputs)?);
    }
    Ok(())
}

/// Mean absolute feature value across all inputs.
fn mean_abs(inputs: &[ChainParams]) -> Result<f64> {
    let mut total = 0.0;
    for params in inputs {
        total += f64::from(mean_abs_one(&params.x)?);
    }
    Ok(total / inputs.len() as f64)
}

fn mean_abs_one(x: &Tensor) -> Result<f32> {
    Ok(x.abs()?.mean_all()?.to_scalar::<f32>()?)
}
