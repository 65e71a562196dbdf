//! Ring-lookup: a synthetic long-range task on cycles.
//!
//! Each sample is a ring of `n` nodes. Nodes `1..n` store a key/value pair
//! as two one-hot halves of a `2n`-wide feature row. Node 0 stores only a
//! key, copied from one of the others, and the label is the value stored
//! under that key. Answering at node 0 requires information from across
//! the ring, which the ring's 2-cell makes reachable in a few hops.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::lift::{CellInit, ComplexBuilder};
use crate::{Complex, ComplexRecord, Error, Result};

/// Ring-lookup generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingLookupConfig {
    /// Ring length, also the number of distinct keys plus one.
    pub nodes: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub seed: u64,
    /// Give edges and rings a down adjacency. Off for the ring-lookup task.
    pub include_down_adj: bool,
}

impl Default for RingLookupConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            train_samples: 10_000,
            val_samples: 1_000,
            seed: 42,
            include_down_adj: false,
        }
    }
}

impl RingLookupConfig {
    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_samples(mut self, train: usize, val: usize) -> Self {
        self.train_samples = train;
        self.val_samples = val;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_down_adj(mut self, include: bool) -> Self {
        self.include_down_adj = include;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.nodes < 3 {
            return Err(Error::InvalidConfig(format!(
                "ring lookup needs at least 3 nodes, got {}",
                self.nodes
            )));
        }
        Ok(())
    }
}

/// One ring-lookup sample as a plain graph.
#[derive(Debug, Clone)]
pub struct RingLookupGraph {
    /// `[n, 2n]` node features.
    pub x: Tensor,
    /// `[2, 2n]` `i64` edge list, both directions of every ring edge.
    pub edge_index: Tensor,
    /// The value stored under node 0's key.
    pub y: usize,
}

/// Sample one ring.
pub fn generate_ring_lookup_graph(
    nodes: usize,
    rng: &mut impl Rng,
    device: &Device,
) -> Result<RingLookupGraph> {
    if nodes < 3 {
        return Err(Error::InvalidConfig(format!(
            "ring lookup needs at least 3 nodes, got {nodes}"
        )));
    }
    let width = 2 * nodes;
    let mut vals: Vec<usize> = (0..nodes - 1).collect();
    vals.shuffle(rng);

    let mut x = vec![0f32; nodes * width];
    for node in 1..nodes {
        let row = &mut x[node * width..(node + 1) * width];
        row[node] = 1.0;
        row[nodes + vals[node - 1]] = 1.0;
    }
    let key_idx = rng.gen_range(0..nodes - 1);
    x[key_idx + 1] = 1.0;

    let mut sources = Vec::with_capacity(2 * nodes);
    let mut targets = Vec::with_capacity(2 * nodes);
    for a in 0..nodes {
        let b = (a + 1) % nodes;
        sources.extend([a as i64, b as i64]);
        targets.extend([b as i64, a as i64]);
    }
    let edge_index: Vec<i64> = sources.into_iter().chain(targets).collect();

    Ok(RingLookupGraph {
        x: Tensor::from_vec(x, (nodes, width), device)?,
        edge_index: Tensor::from_vec(edge_index, (2, 2 * nodes), device)?,
        y: vals[key_idx],
    })
}

/// Sample `samples` rings.
pub fn generate_ring_lookup_dataset(
    nodes: usize,
    samples: usize,
    rng: &mut impl Rng,
    device: &Device,
) -> Result<Vec<RingLookupGraph>> {
    (0..samples)
        .map(|_| generate_ring_lookup_graph(nodes, &mut *rng, device))
        .collect()
}

/// Generated graphs with their split, without lifting:
/// `(graphs, train_ids, val_ids, test_ids)`.
pub fn load_ring_lookup_graphs(
    config: &RingLookupConfig,
    device: &Device,
) -> Result<(Vec<RingLookupGraph>, Vec<usize>, Vec<usize>, Option<Vec<usize>>)> {
    config.validate()?;
    let mut rng = XorShiftRng::seed_from_u64(config.seed);
    let mut graphs = generate_ring_lookup_dataset(config.nodes, config.train_samples, &mut rng, device)?;
    graphs.extend(generate_ring_lookup_dataset(
        config.nodes,
        config.val_samples,
        &mut rng,
        device,
    )?);
    let (train_ids, val_ids) = split_ids(config);
    Ok((graphs, train_ids, val_ids, None))
}

fn split_ids(config: &RingLookupConfig) -> (Vec<usize>, Vec<usize>) {
    let train = config.train_samples;
    (
        (0..train).collect(),
        (train..train + config.val_samples).collect(),
    )
}

/// Lift one sample: ring edges plus the ring as a 2-cell, zero features on
/// edges and rings, node 0 masked as the target.
pub fn ring_lookup_complex(graph: &RingLookupGraph, include_down_adj: bool) -> Result<Complex> {
    let nodes = graph.x.dim(0)?;
    let device = graph.x.device();
    let ring: Vec<usize> = (0..nodes).collect();
    let edges: Vec<(usize, usize)> = (0..nodes).map(|a| (a, (a + 1) % nodes)).collect();

    let mut mask = vec![0u8; nodes];
    mask[0] = 1;
    let y = Tensor::new(&[graph.y as i64], device)?;

    let complex = ComplexBuilder::new(graph.x.clone())
        .edges(&edges)
        .ring(&ring)
        .init(CellInit::Zeros)
        .include_down_adj(include_down_adj)
        .node_mask(Tensor::from_vec(mask, nodes, device)?)
        .y(y)
        .build()?;
    if complex.num_cells(2)? != 1 {
        return Err(Error::InvalidComplex(format!(
            "expected a single ring, got {}",
            complex.num_cells(2)?
        )));
    }
    Ok(complex)
}

/// On-disk split file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SplitFile {
    config: RingLookupConfig,
    train_ids: Vec<usize>,
    val_ids: Vec<usize>,
    test_ids: Option<Vec<usize>>,
}

/// Ring-lookup complexes cached under `<root>/complex`.
///
/// ```rust,no_run
/// use candle_core::Device;
/// use cochain_core::datasets::{RingLookupConfig, RingLookupDataset};
///
/// let config = RingLookupConfig::default().with_samples(100, 10);
/// let dataset = RingLookupDataset::load("data/RING-LOOKUP", config, &Device::Cpu)?;
/// let (train, val, test) = dataset.split();
/// assert_eq!((train.len(), val.len(), test), (100, 10, None));
/// # Ok::<(), cochain_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RingLookupDataset {
    root: PathBuf,
    config: RingLookupConfig,
    complexes: Vec<Complex>,
    train_ids: Vec<usize>,
    val_ids: Vec<usize>,
    test_ids: Option<Vec<usize>>,
}

impl RingLookupDataset {
    pub const NAME: &'static str = "RING-LOOKUP";
    pub const MAX_DIM: usize = 2;

    /// Load from cache, generating and caching first when the cache is
    /// missing or was built with a different config.
    pub fn load(root: impl AsRef<Path>, config: RingLookupConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        let [data_path, idx_path] = processed_paths(&root, config.nodes);

        let cached = match read_split(&idx_path) {
            Some(split) if split.config == config && data_path.exists() => Some(split),
            Some(_) => {
                info!(path = %idx_path.display(), "cached dataset was built with a different config");
                None
            }
            None => None,
        };

        let split = match cached {
            Some(split) => split,
            None => {
                info!(nodes = config.nodes, "processing ring lookup dataset");
                process(&config, &data_path, &idx_path, device)?
            }
        };

        info!(path = %data_path.display(), "loading ring lookup complexes");
        let file = File::open(&data_path)?;
        let records: Vec<ComplexRecord> = serde_json::from_reader(BufReader::new(file))?;
        let complexes = records
            .iter()
            .map(|r| Complex::from_record(r, device))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root,
            config,
            complexes,
            train_ids: split.train_ids,
            val_ids: split.val_ids,
            test_ids: split.test_ids,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RingLookupConfig {
        &self.config
    }

    /// `<root>/complex`.
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("complex")
    }

    /// `[ringlookup-n<nodes>.json, idx-n<nodes>.json]` inside
    /// [`processed_dir`](Self::processed_dir).
    pub fn processed_paths(&self) -> [PathBuf; 2] {
        processed_paths(&self.root, self.config.nodes)
    }

    pub fn num_classes(&self) -> usize {
        self.config.nodes - 1
    }

    pub fn complexes(&self) -> &[Complex] {
        &self.complexes
    }

    pub fn get(&self, idx: usize) -> Option<&Complex> {
        self.complexes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.complexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complexes.is_empty()
    }

    /// `(train_ids, val_ids, test_ids)`.
    pub fn split(&self) -> (&[usize], &[usize], Option<&[usize]>) {
        (&self.train_ids, &self.val_ids, self.test_ids.as_deref())
    }
}

fn processed_paths(root: &Path, nodes: usize) -> [PathBuf; 2] {
    let dir = root.join("complex");
    [
        dir.join(format!("ringlookup-n{nodes}.json")),
        dir.join(format!("idx-n{nodes}.json")),
    ]
}

fn read_split(path: &Path) -> Option<SplitFile> {
    let file = File::open(path).ok()?;
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(split) => Some(split),
        Err(err) => {
            debug!(path = %path.display(), %err, "ignoring unreadable split file");
            None
        }
    }
}

/// Generate, lift and write both cache files.
fn process(
    config: &RingLookupConfig,
    data_path: &Path,
    idx_path: &Path,
    device: &Device,
) -> Result<SplitFile> {
    let (graphs, train_ids, val_ids, test_ids) = load_ring_lookup_graphs(config, device)?;

    debug!(samples = graphs.len(), "converting dataset to cell complexes");
    let records = graphs
        .iter()
        .map(|g| ring_lookup_complex(g, config.include_down_adj)?.to_record())
        .collect::<Result<Vec<_>>>()?;

    if let Some(dir) = data_path.parent() {
        fs::create_dir_all(dir)?;
    }
    info!(path = %data_path.display(), "saving processed dataset");
    serde_json::to_writer(BufWriter::new(File::create(data_path)?), &records)?;

    let split = SplitFile {
        config: *config,
        train_ids,
        val_ids,
        test_ids,
    };
    info!(path = %idx_path.display(), "saving split");
    serde_json::to_writer_pretty(BufWriter::new(File::create(idx_path)?), &split)?;
    Ok(split)
}
