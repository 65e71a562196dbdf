use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The cells of one dimension of a complex, with their features and
/// adjacencies.
///
/// Adjacencies are `[2, E]` `i64` tensors: row 0 lists sources, row 1
/// targets. `up_index` links cells sharing a coface, `down_index` cells
/// sharing a face.
#[derive(Debug, Clone)]
pub struct Cochain {
    /// Dimension of the cells (0 = nodes, 1 = edges, 2 = rings).
    pub dim: usize,
    /// Features, `[num_cells, feature_dim]`.
    pub x: Tensor,
    pub up_index: Option<Tensor>,
    pub down_index: Option<Tensor>,
    /// Per-cell `u8` flags.
    pub mask: Option<Tensor>,
    /// Per-cell or per-layer labels.
    pub y: Option<Tensor>,
}

impl Cochain {
    pub fn new(dim: usize, x: Tensor) -> Self {
        Self {
            dim,
            x,
            up_index: None,
            down_index: None,
            mask: None,
            y: None,
        }
    }

    pub fn with_up_index(mut self, index: Tensor) -> Self {
        self.up_index = Some(index);
        self
    }

    pub fn with_down_index(mut self, index: Tensor) -> Self {
        self.down_index = Some(index);
        self
    }

    pub fn with_mask(mut self, mask: Tensor) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_y(mut self, y: Tensor) -> Self {
        self.y = Some(y);
        self
    }

    pub fn num_cells(&self) -> Result<usize> {
        Ok(self.x.dim(0)?)
    }

    pub fn num_features(&self) -> Result<usize> {
        Ok(self.x.dim(1)?)
    }

    /// Number of up-adjacency entries (0 when absent).
    pub fn num_up(&self) -> Result<usize> {
        index_len(self.up_index.as_ref())
    }

    /// Number of down-adjacency entries (0 when absent).
    pub fn num_down(&self) -> Result<usize> {
        index_len(self.down_index.as_ref())
    }

    fn validate(&self) -> Result<()> {
        if self.x.rank() != 2 {
            return Err(Error::InvalidComplex(format!(
                "dim {} features must be [num_cells, feature_dim], got {:?}",
                self.dim,
                self.x.dims()
            )));
        }
        let cells = self.num_cells()?;
        for (name, index) in [("up_index", &self.up_index), ("down_index", &self.down_index)] {
            let Some(index) = index else { continue };
            if index.rank() != 2 || index.dim(0)? != 2 {
                return Err(Error::InvalidComplex(format!(
                    "dim {} {name} must be [2, E], got {:?}",
                    self.dim,
                    index.dims()
                )));
            }
            let values = index.to_dtype(DType::I64)?.flatten_all()?.to_vec1::<i64>()?;
            if let Some(&bad) = values.iter().find(|&&v| v < 0 || v as usize >= cells) {
                return Err(Error::InvalidComplex(format!(
                    "dim {} {name} entry {bad} is out of bounds for {cells} cells",
                    self.dim
                )));
            }
        }
        if let Some(mask) = &self.mask {
            if mask.dims() != &[cells] {
                return Err(Error::InvalidComplex(format!(
                    "dim {} mask has shape {:?}, expected [{cells}]",
                    self.dim,
                    mask.dims()
                )));
            }
        }
        Ok(())
    }

    pub fn to_record(&self) -> Result<CochainRecord> {
        Ok(CochainRecord {
            dim: self.dim,
            x: TensorRecord::from_tensor(&self.x)?,
            up_index: self.up_index.as_ref().map(IndexRecord::from_tensor).transpose()?,
            down_index: self
                .down_index
                .as_ref()
                .map(IndexRecord::from_tensor)
                .transpose()?,
            mask: self
                .mask
                .as_ref()
                .map(|m| m.to_dtype(DType::U8)?.to_vec1::<u8>())
                .transpose()?,
            y: self
                .y
                .as_ref()
                .map(|y| y.to_dtype(DType::I64)?.flatten_all()?.to_vec1::<i64>())
                .transpose()?,
        })
    }

    pub fn from_record(record: &CochainRecord, device: &Device) -> Result<Self> {
        Ok(Self {
            dim: record.dim,
            x: record.x.to_tensor(device)?,
            up_index: record
                .up_index
                .as_ref()
                .map(|r| r.to_tensor(device))
                .transpose()?,
            down_index: record
                .down_index
                .as_ref()
                .map(|r| r.to_tensor(device))
                .transpose()?,
            mask: record
                .mask
                .as_ref()
                .map(|m| Tensor::new(m.as_slice(), device))
                .transpose()?,
            y: record
                .y
                .as_ref()
                .map(|y| Tensor::new(y.as_slice(), device))
                .transpose()?,
        })
    }
}

fn index_len(index: Option<&Tensor>) -> Result<usize> {
    match index {
        Some(index) => Ok(index.dim(1)?),
        None => Ok(0),
    }
}

/// A cell complex: one [`Cochain`] per dimension, plus an optional
/// complex-level label.
///
/// ```rust
/// use candle_core::{DType, Device, Tensor};
/// use cochain_core::{Cochain, Complex};
///
/// let x = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
/// let complex = Complex::new(vec![Cochain::new(0, x)], None).unwrap();
/// assert_eq!(complex.dimension(), 0);
/// assert_eq!(complex.num_cells(0).unwrap(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Complex {
    cochains: Vec<Cochain>,
    y: Option<Tensor>,
}

impl Complex {
    /// Cochains must be ordered by dimension, starting at 0.
    pub fn new(cochains: Vec<Cochain>, y: Option<Tensor>) -> Result<Self> {
        if cochains.is_empty() {
            return Err(Error::InvalidComplex("a complex needs at least nodes".into()));
        }
        for (expected, cochain) in cochains.iter().enumerate() {
            if cochain.dim != expected {
                return Err(Error::InvalidComplex(format!(
                    "cochain at position {expected} has dim {}",
                    cochain.dim
                )));
            }
            cochain.validate()?;
        }
        Ok(Self { cochains, y })
    }

    /// Highest cell dimension.
    pub fn dimension(&self) -> usize {
        self.cochains.len() - 1
    }

    pub fn cochain(&self, dim: usize) -> Option<&Cochain> {
        self.cochains.get(dim)
    }

    pub fn cochains(&self) -> &[Cochain] {
        &self.cochains
    }

    pub fn nodes(&self) -> &Cochain {
        &self.cochains[0]
    }

    pub fn edges(&self) -> Option<&Cochain> {
        self.cochains.get(1)
    }

    /// Rings (or triangles).
    pub fn two_cells(&self) -> Option<&Cochain> {
        self.cochains.get(2)
    }

    pub fn y(&self) -> Option<&Tensor> {
        self.y.as_ref()
    }

    /// Cells of dimension `dim` (0 beyond the top dimension).
    pub fn num_cells(&self, dim: usize) -> Result<usize> {
        self.cochain(dim).map_or(Ok(0), Cochain::num_cells)
    }

    pub fn to_record(&self) -> Result<ComplexRecord> {
        Ok(ComplexRecord {
            cochains: self
                .cochains
                .iter()
                .map(Cochain::to_record)
                .collect::<Result<_>>()?,
            y: self
                .y
                .as_ref()
                .map(|y| y.to_dtype(DType::I64)?.flatten_all()?.to_vec1::<i64>())
                .transpose()?,
        })
    }

    pub fn from_record(record: &ComplexRecord, device: &Device) -> Result<Self> {
        let cochains = record
            .cochains
            .iter()
            .map(|c| Cochain::from_record(c, device))
            .collect::<Result<_>>()?;
        let y = record
            .y
            .as_ref()
            .map(|y| Tensor::new(y.as_slice(), device))
            .transpose()?;
        Self::new(cochains, y)
    }
}

/// Row-major `f32` tensor on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorRecord {
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        Ok(Self {
            shape: t.dims().to_vec(),
            data: t.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?,
        })
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(self.data.clone(), self.shape.clone(), device)?)
    }
}

/// `[2, E]` adjacency on disk, one list per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub sources: Vec<i64>,
    pub targets: Vec<i64>,
}

impl IndexRecord {
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        let t = t.to_dtype(DType::I64)?;
        Ok(Self {
            sources: t.get(0)?.to_vec1::<i64>()?,
            targets: t.get(1)?.to_vec1::<i64>()?,
        })
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        if self.sources.len() != self.targets.len() {
            return Err(Error::InvalidComplex(format!(
                "index record has {} sources and {} targets",
                self.sources.len(),
                self.targets.len()
            )));
        }
        let data: Vec<i64> = self.sources.iter().chain(&self.targets).copied().collect();
        Ok(Tensor::from_vec(data, (2, self.sources.len()), device)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CochainRecord {
    pub dim: usize,
    pub x: TensorRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_index: Option<IndexRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_index: Option<IndexRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexRecord {
    pub cochains: Vec<CochainRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_nodes(device: &Device) -> Cochain {
        let x = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.]], device).unwrap();
        let up = Tensor::new(&[[0i64, 1, 1, 2], [1, 0, 2, 1]], device).unwrap();
        Cochain::new(0, x)
            .with_up_index(up)
            .with_mask(Tensor::new(&[1u8, 0, 0], device).unwrap())
    }

    #[test]
    fn test_complex_rejects_gaps() {
        let device = Device::Cpu;
        let x = Tensor::zeros((1, 2), DType::F32, &device).unwrap();
        let err = Complex::new(vec![triangle_nodes(&device), Cochain::new(2, x)], None);
        assert!(matches!(err, Err(Error::InvalidComplex(_))));
    }

    #[test]
    fn test_out_of_bounds_adjacency() {
        let device = Device::Cpu;
        let x = Tensor::zeros((2, 2), DType::F32, &device).unwrap();
        let up = Tensor::new(&[[0i64], [5]], &device).unwrap();
        let err = Complex::new(vec![Cochain::new(0, x).with_up_index(up)], None);
        assert!(matches!(err, Err(Error::InvalidComplex(_))));
    }

    #[test]
    fn test_record_round_trip() {
        let device = Device::Cpu;
        let y = Tensor::new(&[3i64], &device).unwrap();
        let complex = Complex::new(vec![triangle_nodes(&device)], Some(y)).unwrap();

        let record = complex.to_record().unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: ComplexRecord = serde_json::from_str(&json).unwrap();
        let restored = Complex::from_record(&back, &device).unwrap();

        assert_eq!(restored.to_record().unwrap(), record);
        assert_eq!(restored.nodes().num_up().unwrap(), 4);
        assert_eq!(restored.nodes().num_down().unwrap(), 0);
        assert!(!json.contains("down_index"));
    }
}
