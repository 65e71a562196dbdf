//! Lifting a graph with known rings to a 2-dimensional cell complex.
//!
//! Cells: nodes (dim 0), undirected edges (dim 1), rings (dim 2).
//!
//! | dim | up-adjacent when         | down-adjacent when   |
//! |-----|--------------------------|----------------------|
//! | 0   | joined by an edge        | -                    |
//! | 1   | both bound the same ring | they share a node    |
//! | 2   | -                        | they share an edge   |
//!
//! Every adjacency lists both directions of each pair. Empty adjacencies
//! are left as `None`.

use std::collections::{BTreeMap, HashSet};

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::{Cochain, Complex, Error, Result};

/// Initial features of edges and rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellInit {
    /// Zeros with the node feature width.
    #[default]
    Zeros,
    /// Sum of the features of the cell's nodes.
    Sum,
}

/// Builds a [`Complex`] from node features, edges and rings.
///
/// ```rust
/// use candle_core::{DType, Device, Tensor};
/// use cochain_core::ComplexBuilder;
///
/// let x = Tensor::zeros((4, 2), DType::F32, &Device::Cpu).unwrap();
/// let complex = ComplexBuilder::new(x)
///     .edges(&[(0, 1), (1, 2), (2, 3), (3, 0)])
///     .ring(&[0, 1, 2, 3])
///     .build()
///     .unwrap();
/// assert_eq!(complex.num_cells(1).unwrap(), 4);
/// assert_eq!(complex.num_cells(2).unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ComplexBuilder {
    x: Tensor,
    edges: Vec<(usize, usize)>,
    rings: Vec<Vec<usize>>,
    init: CellInit,
    include_down_adj: bool,
    node_mask: Option<Tensor>,
    y: Option<Tensor>,
}

impl ComplexBuilder {
    pub fn new(x: Tensor) -> Self {
        Self {
            x,
            edges: Vec::new(),
            rings: Vec::new(),
            init: CellInit::default(),
            include_down_adj: true,
            node_mask: None,
            y: None,
        }
    }

    /// Add undirected edges; repeats and reversed duplicates are dropped.
    pub fn edges(mut self, edges: &[(usize, usize)]) -> Self {
        self.edges.extend_from_slice(edges);
        self
    }

    /// Add a ring given as its cyclic node sequence.
    pub fn ring(mut self, nodes: &[usize]) -> Self {
        self.rings.push(nodes.to_vec());
        self
    }

    pub fn init(mut self, init: CellInit) -> Self {
        self.init = init;
        self
    }

    /// Whether edges and rings get a down adjacency.
    pub fn include_down_adj(mut self, include: bool) -> Self {
        self.include_down_adj = include;
        self
    }

    /// Per-node flags stored as the node cochain's `mask`.
    pub fn node_mask(mut self, mask: Tensor) -> Self {
        self.node_mask = Some(mask);
        self
    }

    pub fn y(mut self, y: Tensor) -> Self {
        self.y = Some(y);
        self
    }

    pub fn build(self) -> Result<Complex> {
        let device = self.x.device().clone();
        let num_nodes = self.x.dim(0)?;
        let node_rows = self.x.to_dtype(candle_core::DType::F32)?.to_vec2::<f32>()?;

        // Edge ids in first-seen order.
        let mut edge_ids: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for &(a, b) in &self.edges {
            if a >= num_nodes || b >= num_nodes {
                return Err(Error::InvalidComplex(format!(
                    "edge ({a}, {b}) is out of bounds for {num_nodes} nodes"
                )));
            }
            if a == b {
                return Err(Error::InvalidComplex(format!("self-loop on node {a}")));
            }
            let key = (a.min(b), a.max(b));
            if !edge_ids.contains_key(&key) {
                edge_ids.insert(key, edges.len());
                edges.push(key);
            }
        }

        let mut ring_edges: Vec<Vec<usize>> = Vec::with_capacity(self.rings.len());
        for ring in &self.rings {
            if ring.len() < 3 {
                return Err(Error::InvalidComplex(format!(
                    "a ring needs at least 3 nodes, got {}",
                    ring.len()
                )));
            }
            let mut ids = Vec::with_capacity(ring.len());
            for (k, &a) in ring.iter().enumerate() {
                let b = ring[(k + 1) % ring.len()];
                let id = edge_ids.get(&(a.min(b), a.max(b))).ok_or_else(|| {
                    Error::InvalidComplex(format!("ring uses missing edge ({a}, {b})"))
                })?;
                ids.push(*id);
            }
            ring_edges.push(ids);
        }

        // dim 0
        let mut node_up = PairList::default();
        for &(a, b) in &edges {
            node_up.push_both(a, b);
        }
        let mut nodes = Cochain::new(0, self.x.clone());
        if let Some(index) = node_up.to_tensor(&device)? {
            nodes = nodes.with_up_index(index);
        }
        if let Some(mask) = &self.node_mask {
            nodes = nodes.with_mask(mask.clone());
        }
        let mut cochains = vec![nodes];

        // dim 1
        if !edges.is_empty() {
            let mut edge_up = PairList::default();
            for ids in &ring_edges {
                for (k, &e1) in ids.iter().enumerate() {
                    for &e2 in &ids[k + 1..] {
                        edge_up.push_both(e1, e2);
                    }
                }
            }
            let mut incident: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
            for (id, &(a, b)) in edges.iter().enumerate() {
                incident[a].push(id);
                incident[b].push(id);
            }
            let mut edge_down = PairList::default();
            for ids in &incident {
                for (k, &e1) in ids.iter().enumerate() {
                    for &e2 in &ids[k + 1..] {
                        edge_down.push_both(e1, e2);
                    }
                }
            }

            let cells: Vec<Vec<usize>> = edges.iter().map(|&(a, b)| vec![a, b]).collect();
            let mut cochain = Cochain::new(1, self.cell_features(&node_rows, &cells, &device)?);
            if let Some(index) = edge_up.to_tensor(&device)? {
                cochain = cochain.with_up_index(index);
            }
            if self.include_down_adj {
                if let Some(index) = edge_down.to_tensor(&device)? {
                    cochain = cochain.with_down_index(index);
                }
            }
            cochains.push(cochain);
        }

        // dim 2
        if !ring_edges.is_empty() {
            let mut containing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (r, ids) in ring_edges.iter().enumerate() {
                for &e in ids {
                    containing.entry(e).or_default().push(r);
                }
            }
            let mut ring_down = PairList::default();
            for rings in containing.values() {
                for (k, &r1) in rings.iter().enumerate() {
                    for &r2 in &rings[k + 1..] {
                        ring_down.push_both(r1, r2);
                    }
                }
            }

            let mut cochain = Cochain::new(2, self.cell_features(&node_rows, &self.rings, &device)?);
            if self.include_down_adj {
                if let Some(index) = ring_down.to_tensor(&device)? {
                    cochain = cochain.with_down_index(index);
                }
            }
            cochains.push(cochain);
        }

        Complex::new(cochains, self.y)
    }

    fn cell_features(
        &self,
        node_rows: &[Vec<f32>],
        cells: &[Vec<usize>],
        device: &Device,
    ) -> Result<Tensor> {
        let width = self.x.dim(1)?;
        let mut data = vec![0f32; cells.len() * width];
        if self.init == CellInit::Sum {
            for (c, nodes) in cells.iter().enumerate() {
                let row = &mut data[c * width..(c + 1) * width];
                for &n in nodes {
                    for (acc, v) in row.iter_mut().zip(&node_rows[n]) {
                        *acc += v;
                    }
                }
            }
        }
        Ok(Tensor::from_vec(data, (cells.len(), width), device)?)
    }
}

/// Ordered, de-duplicated directed pairs.
#[derive(Debug, Default)]
struct PairList {
    sources: Vec<i64>,
    targets: Vec<i64>,
    seen: HashSet<(usize, usize)>,
}

impl PairList {
    fn push(&mut self, a: usize, b: usize) {
        if self.seen.insert((a, b)) {
            self.sources.push(a as i64);
            self.targets.push(b as i64);
        }
    }

    fn push_both(&mut self, a: usize, b: usize) {
        self.push(a, b);
        self.push(b, a);
    }

    fn to_tensor(&self, device: &Device) -> Result<Option<Tensor>> {
        if self.sources.is_empty() {
            return Ok(None);
        }
        let data: Vec<i64> = self.sources.iter().chain(&self.targets).copied().collect();
        Ok(Some(Tensor::from_vec(data, (2, self.sources.len()), device)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    /// Two squares sharing the edge (1, 2).
    fn two_squares() -> ComplexBuilder {
        let x = Tensor::new(
            &[[1f32], [2.], [3.], [4.], [5.], [6.]],
            &Device::Cpu,
        )
        .unwrap();
        ComplexBuilder::new(x)
            .edges(&[(0, 1), (1, 2), (2, 3), (3, 0), (1, 4), (4, 5), (5, 2), (2, 1)])
            .ring(&[0, 1, 2, 3])
            .ring(&[1, 4, 5, 2])
    }

    #[test]
    fn test_counts_and_adjacency() {
        let complex = two_squares().build().unwrap();

        assert_eq!(complex.dimension(), 2);
        assert_eq!(complex.num_cells(1).unwrap(), 7);
        assert_eq!(complex.num_cells(2).unwrap(), 2);
        assert_eq!(complex.nodes().num_up().unwrap(), 14);

        let edges = complex.edges().unwrap();
        // 4 edges per ring, 12 ordered pairs each, sharing one edge
        assert_eq!(edges.num_up().unwrap(), 24);
        // degrees 2,3,3,2,2,2 -> 2 + 6 + 6 + 2 + 2 + 2
        assert_eq!(edges.num_down().unwrap(), 20);

        let rings = complex.two_cells().unwrap();
        assert_eq!(rings.num_down().unwrap(), 2);
        assert_eq!(rings.num_up().unwrap(), 0);
    }

    #[test]
    fn test_sum_init() {
        let complex = two_squares().init(CellInit::Sum).build().unwrap();
        let edges = complex.edges().unwrap().x.to_vec2::<f32>().unwrap();
        let rings = complex.two_cells().unwrap().x.to_vec2::<f32>().unwrap();

        assert_eq!(edges[0], vec![3.]);
        assert_eq!(rings, vec![vec![10.], vec![16.]]);
    }

    #[test]
    fn test_without_down_adj() {
        let complex = two_squares().include_down_adj(false).build().unwrap();
        assert!(complex.edges().unwrap().down_index.is_none());
        assert!(complex.two_cells().unwrap().down_index.is_none());
    }

    #[test]
    fn test_ring_with_missing_edge() {
        let x = Tensor::zeros((3, 1), DType::F32, &Device::Cpu).unwrap();
        let err = ComplexBuilder::new(x)
            .edges(&[(0, 1), (1, 2)])
            .ring(&[0, 1, 2])
            .build();
        assert!(matches!(err, Err(Error::InvalidComplex(_))));
    }

    #[test]
    fn test_nodes_only() {
        let x = Tensor::zeros((2, 1), DType::F32, &Device::Cpu).unwrap();
        let complex = ComplexBuilder::new(x).build().unwrap();
        assert_eq!(complex.dimension(), 0);
        assert!(complex.nodes().up_index.is_none());
    }
}
