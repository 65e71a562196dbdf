//! Adjacency representations consumed by the propagation engine.
//!
//! Two forms are supported:
//!
//! - [`Adjacency::Index`]: an explicit `[2, E]` integer tensor. Under
//!   `source_to_target` flow, row 0 lists sources and row 1 lists targets.
//! - [`Adjacency::Sparse`]: a [`SparseAdjacency`] in CSR form. It stores the
//!   *transposed* adjacency (`adj_t`): rows are targets, columns are sources.
//!
//! ```text
//! edges (0,1) (1,2) (2,3)      adj_t rowptr = [0, 0, 1, 2, 3]
//! edge_index = [[0, 1, 2],           col    = [0, 1, 2]
//!               [1, 2, 3]]
//! ```

use candle_core::{DType, Device, Tensor};

use crate::aggr::segment_csr_ptr;
use crate::config::{Aggregation, Flow};
use crate::value::Value;
use crate::{Error, Result};

/// Endpoint counts `[size_j, size_i]`, possibly partially unknown.
pub type Size = [Option<usize>; 2];

/// A directed adjacency relation between cells.
#[derive(Debug, Clone)]
pub enum Adjacency {
    /// Explicit `[2, E]` index tensor (`u8`, `u32` or `i64`).
    Index(Tensor),
    /// Compressed sparse transposed adjacency.
    Sparse(SparseAdjacency),
}

impl Adjacency {
    /// Build an explicit adjacency from parallel source/target lists.
    pub fn from_pairs(sources: &[usize], targets: &[usize], device: &Device) -> Result<Self> {
        if sources.len() != targets.len() {
            return Err(Error::InvalidAdjacency(format!(
                "source list has {} entries but target list has {}",
                sources.len(),
                targets.len()
            )));
        }
        let mut data = Vec::with_capacity(2 * sources.len());
        for &v in sources.iter().chain(targets) {
            data.push(i64::try_from(v).map_err(|_| {
                Error::InvalidAdjacency(format!("index {v} does not fit in i64"))
            })?);
        }
        let index = Tensor::from_vec(data, (2, sources.len()), device)?;
        Ok(Self::Index(index))
    }

    /// Number of edges described.
    pub fn num_edges(&self) -> Result<usize> {
        match self {
            Self::Index(index) => Ok(index.dim(1)?),
            Self::Sparse(adj) => Ok(adj.nnz()),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Structural validation and size resolution.
    ///
    /// Explicit form: the declared size (if any) is taken as is. Sparse
    /// form: the size is `[num_cols, num_rows]` and reverse flow is
    /// rejected.
    pub(crate) fn resolve_size(&self, declared: Option<[usize; 2]>, flow: Flow) -> Result<Size> {
        match self {
            Self::Index(index) => {
                check_index_tensor(index)?;
                Ok(declared.map_or([None, None], |[a, b]| [Some(a), Some(b)]))
            }
            Self::Sparse(adj) => {
                if flow == Flow::TargetToSource {
                    return Err(Error::InvalidFlow);
                }
                let (rows, cols) = adj.sparse_size();
                Ok([Some(cols), Some(rows)])
            }
        }
    }

    /// Check that explicit indices are within the resolved size bounds.
    ///
    /// Row `j` (sources under the flow) is bounded by `size[0]`, row `i` by
    /// `size[1]`. Unknown sizes are not checked.
    pub(crate) fn check_bounds(&self, size: &Size, flow: Flow) -> Result<()> {
        let Self::Index(index) = self else {
            return Ok(());
        };
        let (i, j) = flow.endpoints();
        for (row, bound) in [(j, size[0]), (i, size[1])] {
            let Some(bound) = bound else { continue };
            let values = index_to_vec(&index.get(row)?)?;
            if let Some(&bad) = values.iter().find(|&&v| v >= bound) {
                return Err(Error::InvalidAdjacency(format!(
                    "index {bad} in row {row} is out of bounds for size {bound}"
                )));
            }
        }
        Ok(())
    }
}

impl From<SparseAdjacency> for Adjacency {
    fn from(adj: SparseAdjacency) -> Self {
        Self::Sparse(adj)
    }
}

impl TryFrom<Value> for Adjacency {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Tensor(index) => {
                check_index_tensor(&index)?;
                Ok(Self::Index(index))
            }
            Value::Adj(adj) => Ok(Self::Sparse(adj)),
            other => Err(Error::InvalidAdjacency(format!(
                "propagation only supports `[2, num_edges]` integer tensors or sparse \
                 adjacency, got {}",
                other.kind()
            ))),
        }
    }
}

fn check_index_tensor(index: &Tensor) -> Result<()> {
    if !is_index_dtype(index.dtype()) {
        return Err(Error::InvalidAdjacency(format!(
            "expected an integer index tensor, got {:?}",
            index.dtype()
        )));
    }
    if index.rank() != 2 {
        return Err(Error::InvalidAdjacency(format!(
            "expected a rank-2 index tensor, got rank {}",
            index.rank()
        )));
    }
    if index.dim(0)? != 2 {
        return Err(Error::InvalidAdjacency(format!(
            "expected an index tensor with 2 rows, got {}",
            index.dim(0)?
        )));
    }
    Ok(())
}

pub(crate) fn is_index_dtype(dtype: DType) -> bool {
    matches!(dtype, DType::U8 | DType::U32 | DType::I64)
}

/// Read a rank-1 integer tensor into host indices, rejecting negatives.
pub(crate) fn index_to_vec(index: &Tensor) -> Result<Vec<usize>> {
    if index.rank() != 1 {
        return Err(Error::InvalidAdjacency(format!(
            "expected a rank-1 index, got shape {:?}",
            index.dims()
        )));
    }
    match index.dtype() {
        DType::U8 => Ok(index.to_vec1::<u8>()?.into_iter().map(usize::from).collect()),
        DType::U32 => Ok(index
            .to_vec1::<u32>()?
            .into_iter()
            .map(|v| v as usize)
            .collect()),
        DType::I64 => index
            .to_vec1::<i64>()?
            .into_iter()
            .map(|v| {
                usize::try_from(v)
                    .map_err(|_| Error::InvalidAdjacency(format!("negative index {v}")))
            })
            .collect(),
        other => Err(Error::InvalidAdjacency(format!(
            "expected an integer index tensor, got {other:?}"
        ))),
    }
}

pub(crate) fn index_tensor(values: &[usize], device: &Device) -> Result<Tensor> {
    let data = values
        .iter()
        .map(|&v| {
            u32::try_from(v)
                .map_err(|_| Error::InvalidAdjacency(format!("index {v} does not fit in u32")))
        })
        .collect::<Result<Vec<u32>>>()?;
    Ok(Tensor::from_vec(data, values.len(), device)?)
}

/// Transposed adjacency in compressed sparse row form.
///
/// Rows index target cells and columns index source cells, so row `r`
/// lists the sources sending messages to `r`. Per-edge values (weights,
/// attributes or types) are optional and follow CSR order.
#[derive(Debug, Clone)]
pub struct SparseAdjacency {
    rowptr: Tensor,
    row: Tensor,
    col: Tensor,
    value: Option<Tensor>,
    sparse_size: (usize, usize),
    ptr: Vec<usize>,
}

impl SparseAdjacency {
    /// Build from raw CSR arrays.
    pub fn new(
        rowptr: Vec<usize>,
        col: Vec<usize>,
        value: Option<Tensor>,
        sparse_size: (usize, usize),
        device: &Device,
    ) -> Result<Self> {
        let (rows, cols) = sparse_size;
        if rowptr.len() != rows + 1 {
            return Err(Error::InvalidAdjacency(format!(
                "rowptr has {} entries, expected {}",
                rowptr.len(),
                rows + 1
            )));
        }
        if rowptr[0] != 0 || rowptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidAdjacency(
                "rowptr must start at 0 and be non-decreasing".to_string(),
            ));
        }
        if rowptr[rows] != col.len() {
            return Err(Error::InvalidAdjacency(format!(
                "rowptr ends at {} but there are {} columns",
                rowptr[rows],
                col.len()
            )));
        }
        if let Some(&bad) = col.iter().find(|&&c| c >= cols) {
            return Err(Error::InvalidAdjacency(format!(
                "column {bad} is out of bounds for {cols} columns"
            )));
        }
        if let Some(value) = &value {
            if value.rank() == 0 || value.dim(0)? != col.len() {
                return Err(Error::InvalidAdjacency(format!(
                    "edge values of shape {:?} do not match {} edges",
                    value.dims(),
                    col.len()
                )));
            }
        }

        let row = expand_ptr(&rowptr);
        Ok(Self {
            rowptr: index_tensor(&rowptr, device)?,
            row: index_tensor(&row, device)?,
            col: index_tensor(&col, device)?,
            value,
            sparse_size,
            ptr: rowptr,
        })
    }

    /// Build from unsorted coordinate lists; entries are sorted by row
    /// (stable), and `value` is permuted along.
    pub fn from_coo(
        row: &[usize],
        col: &[usize],
        value: Option<&Tensor>,
        sparse_size: (usize, usize),
        device: &Device,
    ) -> Result<Self> {
        if row.len() != col.len() {
            return Err(Error::InvalidAdjacency(format!(
                "row list has {} entries but column list has {}",
                row.len(),
                col.len()
            )));
        }
        let (rows, _) = sparse_size;
        if let Some(&bad) = row.iter().find(|&&r| r >= rows) {
            return Err(Error::InvalidAdjacency(format!(
                "row {bad} is out of bounds for {rows} rows"
            )));
        }

        let mut perm: Vec<usize> = (0..row.len()).collect();
        perm.sort_by_key(|&e| (row[e], col[e]));

        let mut rowptr = vec![0usize; rows + 1];
        for &r in row {
            rowptr[r + 1] += 1;
        }
        for r in 0..rows {
            rowptr[r + 1] += rowptr[r];
        }
        let sorted_col = perm.iter().map(|&e| col[e]).collect();
        let value = match value {
            Some(v) => Some(v.contiguous()?.index_select(&index_tensor(&perm, device)?, 0)?),
            None => None,
        };
        Self::new(rowptr, sorted_col, value, sparse_size, device)
    }

    /// Transposed CSR form of an explicit `[2, E]` adjacency, assuming
    /// `source_to_target` flow: rows are `edge_index[1]`, columns are
    /// `edge_index[0]`.
    pub fn from_edge_index(
        edge_index: &Tensor,
        size: [usize; 2],
        value: Option<&Tensor>,
    ) -> Result<Self> {
        check_index_tensor(edge_index)?;
        let sources = index_to_vec(&edge_index.get(0)?)?;
        let targets = index_to_vec(&edge_index.get(1)?)?;
        let [num_sources, num_targets] = size;
        if let Some(&bad) = sources.iter().find(|&&s| s >= num_sources) {
            return Err(Error::InvalidAdjacency(format!(
                "source {bad} is out of bounds for size {num_sources}"
            )));
        }
        Self::from_coo(
            &targets,
            &sources,
            value,
            (num_targets, num_sources),
            edge_index.device(),
        )
    }

    /// The transpose, swapping the roles of rows and columns.
    pub fn t(&self) -> Result<Self> {
        let row = index_to_vec(&self.row)?;
        let col = index_to_vec(&self.col)?;
        let (rows, cols) = self.sparse_size;
        Self::from_coo(
            &col,
            &row,
            self.value.as_ref(),
            (cols, rows),
            self.col.device(),
        )
    }

    /// Row pointer, `u32` of length `rows + 1`.
    pub fn rowptr(&self) -> &Tensor {
        &self.rowptr
    }

    /// Row of every stored entry (the expanded row pointer).
    pub fn row(&self) -> &Tensor {
        &self.row
    }

    /// Column of every stored entry.
    pub fn col(&self) -> &Tensor {
        &self.col
    }

    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    /// `(rows, cols)`.
    pub fn sparse_size(&self) -> (usize, usize) {
        self.sparse_size
    }

    pub fn nnz(&self) -> usize {
        *self.ptr.last().unwrap_or(&0)
    }

    /// Row pointer on the host.
    pub fn ptr(&self) -> &[usize] {
        &self.ptr
    }

    pub fn device(&self) -> &Device {
        self.col.device()
    }

    /// Sparse-dense product `adj_t @ x` along `axis`, reducing each row's
    /// entries with `reduce`. Scalar edge values, when present, weight the
    /// gathered rows.
    pub fn spmm(&self, x: &Tensor, axis: usize, reduce: Aggregation) -> Result<Tensor> {
        let gathered = x.contiguous()?.index_select(&self.col, axis)?;
        let gathered = match &self.value {
            None => gathered,
            Some(value) if value.rank() == 1 => {
                let mut shape = vec![1usize; gathered.rank()];
                shape[axis] = self.nnz();
                let weight = value.reshape(shape)?.to_dtype(gathered.dtype())?;
                gathered.broadcast_mul(&weight)?
            }
            Some(value) => {
                return Err(Error::InvalidAdjacency(format!(
                    "spmm needs scalar edge values, got shape {:?}",
                    value.dims()
                )))
            }
        };
        segment_csr_ptr(&gathered, &self.ptr, axis, reduce)
    }
}

/// Expand a row pointer into the row of every entry.
pub(crate) fn expand_ptr(ptr: &[usize]) -> Vec<usize> {
    let mut row = Vec::with_capacity(*ptr.last().unwrap_or(&0));
    for (r, w) in ptr.windows(2).enumerate() {
        row.extend(std::iter::repeat(r).take(w[1] - w[0]));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_edge_index(device: &Device) -> Tensor {
        Tensor::from_vec(vec![0i64, 1, 2, 1, 2, 3], (2, 3), device).unwrap()
    }

    #[test]
    fn test_expand_ptr() {
        assert_eq!(expand_ptr(&[0, 0, 2, 3]), vec![1, 1, 2]);
        assert!(expand_ptr(&[0]).is_empty());
    }

    #[test]
    fn test_from_edge_index_builds_transpose() {
        let device = Device::Cpu;
        let adj = SparseAdjacency::from_edge_index(&path_edge_index(&device), [4, 4], None)
            .unwrap();

        assert_eq!(adj.ptr(), &[0, 0, 1, 2, 3]);
        assert_eq!(adj.col().to_vec1::<u32>().unwrap(), vec![0, 1, 2]);
        assert_eq!(adj.row().to_vec1::<u32>().unwrap(), vec![1, 2, 3]);
        assert_eq!(adj.nnz(), 3);
    }

    #[test]
    fn test_from_coo_sorts_values() {
        let device = Device::Cpu;
        let value = Tensor::new(&[10f32, 20., 30.], &device).unwrap();
        let adj =
            SparseAdjacency::from_coo(&[2, 0, 2], &[1, 1, 0], Some(&value), (3, 2), &device)
                .unwrap();

        assert_eq!(adj.ptr(), &[0, 1, 1, 3]);
        assert_eq!(adj.col().to_vec1::<u32>().unwrap(), vec![1, 0, 1]);
        assert_eq!(
            adj.value().unwrap().to_vec1::<f32>().unwrap(),
            vec![20., 30., 10.]
        );
    }

    #[test]
    fn test_transpose_round_trip() {
        let device = Device::Cpu;
        let adj = SparseAdjacency::from_edge_index(&path_edge_index(&device), [4, 4], None)
            .unwrap();
        let t = adj.t().unwrap();

        assert_eq!(t.ptr(), &[0, 1, 2, 3, 3]);
        assert_eq!(t.col().to_vec1::<u32>().unwrap(), vec![1, 2, 3]);
        let back = t.t().unwrap();
        assert_eq!(back.ptr(), adj.ptr());
    }

    #[test]
    fn test_new_rejects_bad_rowptr() {
        let device = Device::Cpu;
        assert!(SparseAdjacency::new(vec![0, 2, 1], vec![0, 0], None, (2, 2), &device).is_err());
        assert!(SparseAdjacency::new(vec![0, 1], vec![0, 0], None, (1, 2), &device).is_err());
        assert!(SparseAdjacency::new(vec![0, 1], vec![5], None, (1, 2), &device).is_err());
    }

    #[test]
    fn test_spmm_weighted_sum() {
        let device = Device::Cpu;
        let value = Tensor::new(&[2f32, 3., 4.], &device).unwrap();
        let adj =
            SparseAdjacency::from_edge_index(&path_edge_index(&device), [4, 4], Some(&value))
                .unwrap();
        let x = Tensor::new(&[[1f32], [2.], [3.], [4.]], &device).unwrap();

        let out = adj.spmm(&x, 0, Aggregation::Add).unwrap();
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            vec![vec![0.], vec![2.], vec![6.], vec![12.]]
        );
    }

    #[test]
    fn test_index_validation() {
        let device = Device::Cpu;
        let float_index = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        assert!(matches!(
            Adjacency::Index(float_index).resolve_size(None, Flow::SourceToTarget),
            Err(Error::InvalidAdjacency(_))
        ));

        let three_rows = Tensor::zeros((3, 3), DType::I64, &device).unwrap();
        assert!(Adjacency::Index(three_rows)
            .resolve_size(None, Flow::SourceToTarget)
            .is_err());

        let flat = Tensor::zeros(6, DType::I64, &device).unwrap();
        assert!(Adjacency::Index(flat)
            .resolve_size(None, Flow::SourceToTarget)
            .is_err());
    }

    #[test]
    fn test_negative_index_rejected() {
        let device = Device::Cpu;
        let index = Tensor::from_vec(vec![0i64, -1, 1, 0], (2, 2), &device).unwrap();
        let adj = Adjacency::Index(index);
        let size = adj.resolve_size(None, Flow::SourceToTarget).unwrap();
        assert!(adj.check_bounds(&[Some(2), Some(2)], Flow::SourceToTarget).is_err());
        assert_eq!(size, [None, None]);
    }

    #[test]
    fn test_bounds_follow_flow() {
        let device = Device::Cpu;
        // sources in 0..2, targets in 0..5
        let adj = Adjacency::from_pairs(&[0, 1], &[4, 3], &device).unwrap();
        assert!(adj
            .check_bounds(&[Some(2), Some(5)], Flow::SourceToTarget)
            .is_ok());
        assert!(adj
            .check_bounds(&[Some(2), Some(5)], Flow::TargetToSource)
            .is_err());
    }

    #[test]
    fn test_sparse_rejects_reverse_flow() {
        let device = Device::Cpu;
        let adj = SparseAdjacency::from_edge_index(&path_edge_index(&device), [4, 4], None)
            .unwrap();
        let adj = Adjacency::from(adj);
        assert!(matches!(
            adj.resolve_size(None, Flow::TargetToSource),
            Err(Error::InvalidFlow)
        ));
        assert_eq!(
            adj.resolve_size(None, Flow::SourceToTarget).unwrap(),
            [Some(4), Some(4)]
        );
    }

    #[test]
    fn test_unsupported_representation() {
        let err = Adjacency::try_from(Value::Scalar(1.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidAdjacency(_)));
    }
}
