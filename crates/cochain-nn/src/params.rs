//! Inputs of one propagation call, bundled.

use candle_core::Tensor;
use cochain_core::Cochain;

use crate::adjacency::Adjacency;
use crate::value::{Args, Value};

/// Features, adjacencies and extra named values for one cochain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub x: Tensor,
    pub up_index: Option<Adjacency>,
    pub down_index: Option<Adjacency>,
    pub kwargs: Args,
}

impl ChainParams {
    pub fn new(x: Tensor, up_index: Option<Adjacency>, down_index: Option<Adjacency>) -> Self {
        Self {
            x,
            up_index,
            down_index,
            kwargs: Args::new(),
        }
    }

    pub fn with_kwargs(mut self, kwargs: Args) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Explicit-index parameters of a cochain. The mask, when present, is
    /// passed along as `mask`.
    pub fn from_cochain(cochain: &Cochain) -> Self {
        let mut kwargs = Args::new();
        if let Some(mask) = &cochain.mask {
            kwargs.insert("mask", mask);
        }
        Self::new(
            cochain.x.clone(),
            cochain.up_index.clone().map(Adjacency::Index),
            cochain.down_index.clone().map(Adjacency::Index),
        )
        .with_kwargs(kwargs)
    }

    /// The named bag: `kwargs` plus `x`.
    pub fn args(&self) -> Args {
        let mut args = self.kwargs.clone();
        args.insert("x", Value::Tensor(self.x.clone()));
        args
    }
}
