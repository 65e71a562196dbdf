//! Gathering of per-edge arguments for one propagation direction.
//!
//! The collector turns the caller's named bag into the arguments a user
//! callable asked for. Names ending in `_i` / `_j` with the current
//! direction prefix are lifted: `up_x_j` reads `x` from the bag and selects
//! one row per up-adjacency edge, taken at the edge's source.

use std::collections::BTreeSet;

use candle_core::Tensor;

use crate::adjacency::{index_tensor, index_to_vec, Adjacency, Size};
use crate::config::{resolve_axis, ChainConfig, Flow};
use crate::inspector::{Direction, Endpoint};
use crate::value::{Args, Value};
use crate::{Error, Result};

/// Lifts features to edge endpoints and fills in derived arguments.
#[derive(Debug, Clone, Copy)]
pub struct Collector {
    flow: Flow,
    node_dim: isize,
}

impl Collector {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            flow: config.flow,
            node_dim: config.node_dim,
        }
    }

    /// Build the argument map for `names` in `direction`.
    ///
    /// `size` is the endpoint-count pair of `adj`. Unknown entries are
    /// filled by the first lifted tensor; later tensors must agree.
    /// The bag is left untouched. A sparse adjacency only supports
    /// forward flow.
    pub fn collect(
        &self,
        names: &BTreeSet<String>,
        adj: Option<&Adjacency>,
        size: &mut Size,
        direction: Direction,
        bag: &Args,
    ) -> Result<Args> {
        if let Some(adj) = adj {
            self.check_flow(adj)?;
        }
        let (i, j) = self.flow.endpoints();
        let prefix = format!("{}_", direction.tag());
        let mut out = Args::new();

        for name in names {
            let Some(endpoint) = Endpoint::from_name(name) else {
                if let Some(value) = bag.get(name) {
                    out.insert(name.as_str(), value.clone());
                }
                continue;
            };
            let Some(adj) = adj else { continue };
            let Some(base) = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix("_i").or_else(|| rest.strip_suffix("_j")))
            else {
                continue;
            };
            let Some(value) = bag.get(base) else { continue };

            let value = match value {
                Value::Tensor(src) => {
                    self.set_size(size, endpoint.size_slot(), src)?;
                    let row = match endpoint {
                        Endpoint::Source => j,
                        Endpoint::Target => i,
                    };
                    Value::Tensor(self.lift(src, adj, row)?)
                }
                other => other.clone(),
            };
            out.insert(name.as_str(), value);
        }

        let d = direction.tag();
        match adj {
            Some(Adjacency::Index(index)) => {
                let index_i = index.get(i)?.contiguous()?;
                let index_j = index.get(j)?.contiguous()?;
                out.insert("adj_t", Value::None);
                out.insert("ptr", Value::None);
                out.insert(format!("{d}_index_i"), index_i.clone());
                out.insert(format!("{d}_index_j"), index_j);
                out.insert(format!("{d}_index"), index_i);
            }
            Some(Adjacency::Sparse(adj_t)) => {
                out.insert("edge_index", Value::None);
                out.insert(format!("{d}_adj_t"), adj_t.clone());
                out.insert(format!("{d}_index_i"), adj_t.row());
                out.insert(format!("{d}_index_j"), adj_t.col());
                out.insert(format!("{d}_ptr"), adj_t.rowptr());
                for suffix in ["weight", "attr", "type"] {
                    out.insert(format!("{d}_{suffix}"), adj_t.value().cloned());
                }
                out.insert(format!("{d}_index"), adj_t.row());
            }
            None => {}
        }

        let size_i = size[1].or(size[0]);
        let size_j = size[0].or(size[1]);
        out.insert(format!("{d}_size"), *size);
        out.insert(format!("{d}_size_i"), size_i);
        out.insert(format!("{d}_size_j"), size_j);
        out.insert(format!("{d}_dim_size"), size_i);
        Ok(out)
    }

    /// Select one row of `src` per edge, at the endpoint stored in `row`.
    pub fn lift(&self, src: &Tensor, adj: &Adjacency, row: usize) -> Result<Tensor> {
        self.check_flow(adj)?;
        let axis = resolve_axis(self.node_dim, src.rank())?;
        let extent = src.dim(axis)?;
        let ids = match adj {
            Adjacency::Index(index) => index_to_vec(&index.get(row)?)?,
            Adjacency::Sparse(adj_t) if row == 1 => index_to_vec(adj_t.row())?,
            Adjacency::Sparse(adj_t) => index_to_vec(adj_t.col())?,
        };
        if let Some(&bad) = ids.iter().find(|&&v| v >= extent) {
            return Err(Error::InvalidAdjacency(format!(
                "index {bad} is out of bounds for {extent} cells along axis {axis}"
            )));
        }
        let ids = index_tensor(&ids, src.device())?;
        Ok(src.contiguous()?.index_select(&ids, axis)?)
    }

    fn check_flow(&self, adj: &Adjacency) -> Result<()> {
        if adj.is_sparse() && self.flow == Flow::TargetToSource {
            return Err(Error::InvalidFlow);
        }
        Ok(())
    }

    fn set_size(&self, size: &mut Size, slot: usize, src: &Tensor) -> Result<()> {
        let axis = resolve_axis(self.node_dim, src.rank())?;
        let got = src.dim(axis)?;
        match size[slot] {
            None => size[slot] = Some(got),
            Some(expected) if expected != got => {
                return Err(Error::SizeMismatch {
                    dim: axis,
                    expected,
                    got,
                })
            }
            Some(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::SparseAdjacency;
    use candle_core::Device;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn path(device: &Device) -> Adjacency {
        Adjacency::from_pairs(&[0, 1, 2], &[1, 2, 3], device).unwrap()
    }

    fn features(device: &Device) -> Tensor {
        Tensor::new(&[[1f32, 10.], [2., 20.], [3., 30.], [4., 40.]], device).unwrap()
    }

    #[test]
    fn test_lifts_both_endpoints() {
        let device = Device::Cpu;
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new().with("x", features(&device));
        let mut size = [None, None];

        let out = collector
            .collect(
                &names(&["up_x_i", "up_x_j"]),
                Some(&path(&device)),
                &mut size,
                Direction::Up,
                &bag,
            )
            .unwrap();

        let x_j = out.tensor("up_x_j").unwrap().to_vec2::<f32>().unwrap();
        let x_i = out.tensor("up_x_i").unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(x_j, vec![vec![1., 10.], vec![2., 20.], vec![3., 30.]]);
        assert_eq!(x_i, vec![vec![2., 20.], vec![3., 30.], vec![4., 40.]]);
        assert_eq!(size, [Some(4), Some(4)]);
        assert_eq!(out.usize("up_dim_size"), Some(4));
    }

    #[test]
    fn test_reverse_flow_swaps_rows() {
        let device = Device::Cpu;
        let config = ChainConfig::default().with_flow(Flow::TargetToSource);
        let collector = Collector::new(&config);
        let bag = Args::new().with("x", features(&device));
        let mut size = [None, None];

        let out = collector
            .collect(
                &names(&["up_x_j"]),
                Some(&path(&device)),
                &mut size,
                Direction::Up,
                &bag,
            )
            .unwrap();

        let x_j = out.tensor("up_x_j").unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(x_j, vec![vec![2., 20.], vec![3., 30.], vec![4., 40.]]);
        let index_i = out.tensor("up_index").unwrap().to_vec1::<i64>().unwrap();
        assert_eq!(index_i, vec![0, 1, 2]);
    }

    #[test]
    fn test_other_direction_and_plain_names() {
        let device = Device::Cpu;
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new()
            .with("x", features(&device))
            .with("alpha", 0.5);
        let mut size = [None, None];

        let out = collector
            .collect(
                &names(&["alpha", "beta", "down_x_j", "up_j"]),
                Some(&path(&device)),
                &mut size,
                Direction::Up,
                &bag,
            )
            .unwrap();

        assert_eq!(out.scalar("alpha"), Some(0.5));
        assert!(!out.contains("beta"));
        assert!(!out.contains("down_x_j"));
        assert!(!out.contains("up_j"));
        assert_eq!(size, [None, None]);
        assert!(out.get("up_size_i").unwrap().is_none());
    }

    #[test]
    fn test_non_tensor_base_passes_through() {
        let device = Device::Cpu;
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new().with("scale", 2.0);
        let mut size = [None, None];

        let out = collector
            .collect(
                &names(&["up_scale_j"]),
                Some(&path(&device)),
                &mut size,
                Direction::Up,
                &bag,
            )
            .unwrap();
        assert_eq!(out.scalar("up_scale_j"), Some(2.0));
    }

    #[test]
    fn test_without_adjacency_skips_suffixed() {
        let device = Device::Cpu;
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new().with("x", features(&device));
        let mut size = [None, None];

        let out = collector
            .collect(&names(&["x", "down_x_j"]), None, &mut size, Direction::Down, &bag)
            .unwrap();

        assert!(out.contains("x"));
        assert!(!out.contains("down_x_j"));
        assert!(!out.contains("down_index"));
        assert!(out.contains("down_size"));
    }

    #[test]
    fn test_size_mismatch() {
        let device = Device::Cpu;
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new().with("x", features(&device));
        let mut size = [Some(5), Some(5)];

        let err = collector
            .collect(
                &names(&["up_x_j"]),
                Some(&path(&device)),
                &mut size,
                Direction::Up,
                &bag,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 5,
                got: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_sparse_rejects_reverse_flow() {
        let device = Device::Cpu;
        let edge_index = Tensor::new(&[[0i64, 1, 2], [1, 2, 3]], &device).unwrap();
        let adj_t = SparseAdjacency::from_edge_index(&edge_index, [4, 4], None).unwrap();
        let adj = Adjacency::Sparse(adj_t);
        let config = ChainConfig::default().with_flow(Flow::TargetToSource);
        let collector = Collector::new(&config);
        let bag = Args::new().with("x", features(&device));
        let mut size = [None, None];

        let err = collector
            .collect(&names(&["up_x_i"]), Some(&adj), &mut size, Direction::Up, &bag)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFlow));
        assert!(matches!(
            collector.lift(&features(&device), &adj, 0),
            Err(Error::InvalidFlow)
        ));
        assert_eq!(size, [None, None]);
    }

    #[test]
    fn test_sparse_populates_csr_names() {
        let device = Device::Cpu;
        let edge_index = Tensor::new(&[[0i64, 1, 2], [1, 2, 3]], &device).unwrap();
        let weight = Tensor::new(&[0.5f32, 1.0, 2.0], &device).unwrap();
        let adj_t = SparseAdjacency::from_edge_index(&edge_index, [4, 4], Some(&weight)).unwrap();
        let adj = Adjacency::Sparse(adj_t);
        let collector = Collector::new(&ChainConfig::default());
        let bag = Args::new().with("x", features(&device));
        let mut size = adj.resolve_size(None, Flow::SourceToTarget).unwrap();

        let out = collector
            .collect(
                &names(&["down_x_i", "down_x_j"]),
                Some(&adj),
                &mut size,
                Direction::Down,
                &bag,
            )
            .unwrap();

        let x_i = out.tensor("down_x_i").unwrap().to_vec2::<f32>().unwrap();
        let x_j = out.tensor("down_x_j").unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(x_i, vec![vec![2., 20.], vec![3., 30.], vec![4., 40.]]);
        assert_eq!(x_j, vec![vec![1., 10.], vec![2., 20.], vec![3., 30.]]);
        assert_eq!(
            out.tensor("down_ptr").unwrap().to_vec1::<u32>().unwrap(),
            vec![0, 0, 1, 2, 3]
        );
        assert_eq!(
            out.tensor("down_weight").unwrap().to_vec1::<f32>().unwrap(),
            vec![0.5, 1.0, 2.0]
        );
        assert!(out.get("edge_index").unwrap().is_none());
        assert!(out.get("down_adj_t").and_then(Value::as_adj).is_some());
    }
}
