//! Named values passed between the caller, the engine and user callables.

use candle_core::Tensor;

use crate::adjacency::{Size, SparseAdjacency};
use crate::{Error, Result};

/// A single named argument.
///
/// `Value::None` is an explicit "no value" (for example `up_ptr` on an
/// explicit adjacency). It is distinct from a name being absent: absent
/// names fall back to declared defaults, `None` does not.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Tensor(Tensor),
    Scalar(f64),
    Int(usize),
    Size(Size),
    Adj(SparseAdjacency),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<Size> {
        match self {
            Self::Size(size) => Some(*size),
            _ => None,
        }
    }

    pub fn as_adj(&self) -> Option<&SparseAdjacency> {
        match self {
            Self::Adj(adj) => Some(adj),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tensor(_) => "tensor",
            Self::Scalar(_) => "scalar",
            Self::Int(_) => "integer",
            Self::Size(_) => "size",
            Self::Adj(_) => "sparse adjacency",
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<&Tensor> for Value {
    fn from(t: &Tensor) -> Self {
        Self::Tensor(t.clone())
    }
}

impl From<Option<Tensor>> for Value {
    fn from(t: Option<Tensor>) -> Self {
        t.map_or(Self::None, Self::Tensor)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Int(n)
    }
}

impl From<Option<usize>> for Value {
    fn from(n: Option<usize>) -> Self {
        n.map_or(Self::None, Self::Int)
    }
}

impl From<Size> for Value {
    fn from(size: Size) -> Self {
        Self::Size(size)
    }
}

impl From<SparseAdjacency> for Value {
    fn from(adj: SparseAdjacency) -> Self {
        Self::Adj(adj)
    }
}

/// An ordered bag of named values.
///
/// Keeps insertion order. Inserting an existing name replaces its value in
/// place, so `extend` behaves like a dictionary update.
///
/// ```rust
/// use candle_core::{Device, Tensor};
/// use cochain_nn::Args;
///
/// let x = Tensor::new(&[[1f32], [2.]], &Device::Cpu).unwrap();
/// let args = Args::new().with("x", x).with("alpha", 0.5);
/// assert_eq!(args.len(), 2);
/// assert_eq!(args.scalar("alpha"), Some(0.5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Merge `other` into `self`; values from `other` win on collision.
    pub fn extend(&mut self, other: Args) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }

    /// The tensor stored under `name`.
    pub fn tensor(&self, name: &str) -> Result<&Tensor> {
        match self.get(name) {
            Some(Value::Tensor(t)) => Ok(t),
            Some(other) => Err(Error::ArgumentType {
                name: name.to_string(),
                expected: "tensor",
                got: other.kind(),
            }),
            None => Err(Error::ArgumentType {
                name: name.to_string(),
                expected: "tensor",
                got: "nothing",
            }),
        }
    }

    /// The tensor stored under `name`, or `None` when absent or `Value::None`.
    pub fn opt_tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name).and_then(Value::as_tensor)
    }

    pub fn usize(&self, name: &str) -> Option<usize> {
        self.get(name).and_then(Value::as_usize)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_scalar)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}
