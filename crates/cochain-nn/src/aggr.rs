//! Reduction of per-edge messages into per-endpoint outputs.
//!
//! Two forms, matching the two adjacency representations:
//!
//! - [`scatter`]: every edge `e` contributes to endpoint `index[e]`. Input
//!   does not need to be sorted.
//! - [`segment_csr`]: endpoint `k` owns the contiguous range
//!   `ptr[k]..ptr[k + 1]`, so messages must already be sorted by endpoint.
//!
//! Endpoints without incoming messages get 0 for every reduction,
//! including `max`.

use candle_core::Tensor;

use crate::adjacency::{index_tensor, index_to_vec};
use crate::config::Aggregation;
use crate::{Error, Result};

/// Scatter-reduce `src` along `axis` into `dim_size` endpoints.
///
/// `dim_size` defaults to `max(index) + 1`.
///
/// ```rust
/// use candle_core::{Device, Tensor};
/// use cochain_nn::aggr::scatter;
/// use cochain_nn::Aggregation;
///
/// let device = Device::Cpu;
/// let src = Tensor::new(&[[1f32], [2.], [3.]], &device).unwrap();
/// let index = Tensor::new(&[1u32, 1, 3], &device).unwrap();
/// let out = scatter(&src, &index, 0, Some(4), Aggregation::Add).unwrap();
/// assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![0.], vec![3.], vec![0.], vec![3.]]);
/// ```
pub fn scatter(
    src: &Tensor,
    index: &Tensor,
    axis: usize,
    dim_size: Option<usize>,
    reduce: Aggregation,
) -> Result<Tensor> {
    check_axis(src, axis)?;
    let index = index_to_vec(index)?;
    let num_edges = src.dim(axis)?;
    if index.len() != num_edges {
        return Err(Error::InvalidAdjacency(format!(
            "index has {} entries but messages have {num_edges} along axis {axis}",
            index.len()
        )));
    }
    let n = dim_size.unwrap_or_else(|| index.iter().max().map_or(0, |m| m + 1));
    if let Some(&bad) = index.iter().find(|&&i| i >= n) {
        return Err(Error::InvalidAdjacency(format!(
            "index {bad} is out of bounds for dim_size {n}"
        )));
    }

    let src = src.contiguous()?;
    match reduce {
        Aggregation::Add => scatter_sum(&src, &index, axis, n),
        Aggregation::Mean => {
            let sum = scatter_sum(&src, &index, axis, n)?;
            let mut counts = vec![0usize; n];
            for &i in &index {
                counts[i] += 1;
            }
            divide_by_counts(&sum, &counts, axis)
        }
        Aggregation::Max => scatter_max(&src, &index, axis, n),
    }
}

/// Segment-reduce `src` along `axis` using a row-pointer tensor.
pub fn segment_csr(src: &Tensor, ptr: &Tensor, axis: usize, reduce: Aggregation) -> Result<Tensor> {
    segment_csr_ptr(src, &index_to_vec(ptr)?, axis, reduce)
}

/// Segment-reduce `src` along `axis` using a host row pointer.
pub fn segment_csr_ptr(
    src: &Tensor,
    ptr: &[usize],
    axis: usize,
    reduce: Aggregation,
) -> Result<Tensor> {
    check_axis(src, axis)?;
    let num_edges = src.dim(axis)?;
    if ptr.first() != Some(&0) || ptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::InvalidAdjacency(
            "ptr must start at 0 and be non-decreasing".to_string(),
        ));
    }
    if ptr[ptr.len() - 1] != num_edges {
        return Err(Error::InvalidAdjacency(format!(
            "ptr ends at {} but messages have {num_edges} entries along axis {axis}",
            ptr[ptr.len() - 1]
        )));
    }

    let segments = ptr.len() - 1;
    if segments == 0 {
        return zeros_with(src, axis, 0);
    }

    let mut parts = Vec::with_capacity(segments);
    for w in ptr.windows(2) {
        let (start, len) = (w[0], w[1] - w[0]);
        let part = if len == 0 {
            zeros_with(src, axis, 1)?
        } else {
            let segment = src.narrow(axis, start, len)?;
            match reduce {
                Aggregation::Add => segment.sum_keepdim(axis)?,
                Aggregation::Mean => (segment.sum_keepdim(axis)? / len as f64)?,
                Aggregation::Max => segment.max_keepdim(axis)?,
            }
        };
        parts.push(part);
    }
    Ok(Tensor::cat(&parts, axis)?)
}

fn scatter_sum(src: &Tensor, index: &[usize], axis: usize, n: usize) -> Result<Tensor> {
    let out = zeros_with(src, axis, n)?;
    if index.is_empty() {
        return Ok(out);
    }
    let ids = index_tensor(index, src.device())?;
    Ok(out.index_add(&ids, src, axis)?)
}

fn scatter_max(src: &Tensor, index: &[usize], axis: usize, n: usize) -> Result<Tensor> {
    if n == 0 {
        return zeros_with(src, axis, 0);
    }
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (pos, &target) in index.iter().enumerate() {
        groups[target].push(pos);
    }

    let mut parts = Vec::with_capacity(n);
    for group in &groups {
        let part = if group.is_empty() {
            zeros_with(src, axis, 1)?
        } else {
            let ids = index_tensor(group, src.device())?;
            src.index_select(&ids, axis)?.max_keepdim(axis)?
        };
        parts.push(part);
    }
    Ok(Tensor::cat(&parts, axis)?)
}

fn divide_by_counts(sum: &Tensor, counts: &[usize], axis: usize) -> Result<Tensor> {
    let mut shape = vec![1usize; sum.rank()];
    shape[axis] = counts.len();
    let counts: Vec<f64> = counts.iter().map(|&c| c.max(1) as f64).collect();
    let counts = Tensor::from_vec(counts, shape, sum.device())?.to_dtype(sum.dtype())?;
    Ok(sum.broadcast_div(&counts)?)
}

/// Zeros shaped like `src` except for `len` entries along `axis`.
fn zeros_with(src: &Tensor, axis: usize, len: usize) -> Result<Tensor> {
    let mut dims = src.dims().to_vec();
    dims[axis] = len;
    Ok(Tensor::zeros(dims, src.dtype(), src.device())?)
}

fn check_axis(src: &Tensor, axis: usize) -> Result<()> {
    if axis >= src.rank() {
        return Err(Error::InvalidConfig(format!(
            "axis {axis} is out of range for messages of rank {}",
            src.rank()
        )));
    }
    Ok(())
}
