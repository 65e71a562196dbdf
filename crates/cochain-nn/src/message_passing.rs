//! The `ChainMessagePassing` trait and its default callables.
//!
//! A module computes, for every cell `i`,
//!
//! ```text
//! x_i' = update( aggr_up_{j in N_up(i)} message_up(x_i, x_j, ...),
//!                aggr_down_{j in N_down(i)} message_down(x_i, x_j, ...),
//!                x_i )
//! ```
//!
//! Each callable receives only the named arguments its [`Signature`]
//! declares. Overriding a callable with different inputs means overriding
//! [`ChainMessagePassing::signature`] for that role as well.

use candle_core::Tensor;

use crate::adjacency::SparseAdjacency;
use crate::aggr::{scatter, segment_csr};
use crate::config::ChainConfig;
use crate::inspector::{Direction, Role, Signature};
use crate::value::{Args, Value};
use crate::{Error, Result};

/// User-pluggable callables of a directional message-passing layer.
///
/// Only [`config`](Self::config) is required. Fused callables are
/// considered implemented when [`signature`](Self::signature) returns
/// `Some` for their role. Overriding `message_and_aggregate_*` without
/// also registering its signature has no effect: sparse input still goes
/// through `message_*` and `aggregate_*`.
pub trait ChainMessagePassing {
    fn config(&self) -> &ChainConfig;

    /// Declared inputs of the callable for `role`.
    fn signature(&self, role: Role) -> Option<Signature> {
        default_signature(role)
    }

    /// Messages along up-adjacency edges. Default: `up_x_j`.
    fn message_up(&self, args: &Args) -> Result<Tensor> {
        Ok(args.tensor("up_x_j")?.clone())
    }

    /// Messages along down-adjacency edges. Default: `down_x_j`.
    fn message_down(&self, args: &Args) -> Result<Tensor> {
        Ok(args.tensor("down_x_j")?.clone())
    }

    fn aggregate_up(&self, inputs: &Tensor, args: &Args) -> Result<Tensor> {
        default_aggregate(self.config(), Direction::Up, inputs, args)
    }

    fn aggregate_down(&self, inputs: &Tensor, args: &Args) -> Result<Tensor> {
        default_aggregate(self.config(), Direction::Down, inputs, args)
    }

    /// Fused message and aggregation over a sparse up-adjacency.
    fn message_and_aggregate_up(&self, _adj_t: &SparseAdjacency, _args: &Args) -> Result<Tensor> {
        Err(Error::NotImplemented(Role::MessageAndAggregateUp))
    }

    /// Fused message and aggregation over a sparse down-adjacency.
    fn message_and_aggregate_down(
        &self,
        _adj_t: &SparseAdjacency,
        _args: &Args,
    ) -> Result<Tensor> {
        Err(Error::NotImplemented(Role::MessageAndAggregateDown))
    }

    /// Combine both directions. `None` marks a direction without adjacency.
    fn update(&self, up: Option<Tensor>, down: Option<Tensor>, args: &Args) -> Result<Tensor> {
        default_update(up, down, args)
    }
}

/// Signatures of the default callables. Fused roles have none.
pub fn default_signature(role: Role) -> Option<Signature> {
    let sig = match role {
        Role::MessageUp => Signature::new()
            .required("up_x_j")
            .optional("up_attr", Value::None),
        Role::MessageDown => Signature::new()
            .required("down_x_j")
            .optional("down_attr", Value::None),
        Role::AggregateUp => aggregate_signature(Direction::Up),
        Role::AggregateDown => aggregate_signature(Direction::Down),
        Role::MessageAndAggregateUp | Role::MessageAndAggregateDown => return None,
        Role::Update => Signature::new().required("x"),
    };
    Some(sig)
}

fn aggregate_signature(direction: Direction) -> Signature {
    let d = direction.tag();
    Signature::new()
        .required(format!("{d}_index"))
        .optional(format!("{d}_ptr"), Value::None)
        .optional(format!("{d}_dim_size"), Value::None)
}

/// Reduce `inputs` with the configured aggregation of `direction`.
///
/// Uses the CSR pointer when one was collected (sparse adjacency), the
/// target index otherwise.
pub fn default_aggregate(
    config: &ChainConfig,
    direction: Direction,
    inputs: &Tensor,
    args: &Args,
) -> Result<Tensor> {
    let d = direction.tag();
    let reduce = config.aggr(direction).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "aggr_{d} is none; override aggregate_{d} to reduce messages"
        ))
    })?;
    let axis = config.axis(inputs.rank())?;

    match args.opt_tensor(&format!("{d}_ptr")) {
        Some(ptr) => segment_csr(inputs, ptr, axis, reduce),
        None => scatter(
            inputs,
            args.tensor(&format!("{d}_index"))?,
            axis,
            args.usize(&format!("{d}_dim_size")),
            reduce,
        ),
    }
}

/// Sum of the present directions, or `x` when neither is present.
pub fn default_update(up: Option<Tensor>, down: Option<Tensor>, args: &Args) -> Result<Tensor> {
    match (up, down) {
        (None, None) => Ok(args.tensor("x")?.clone()),
        (Some(up), None) => Ok(up),
        (None, Some(down)) => Ok(down),
        (Some(up), Some(down)) => Ok((up + down)?),
    }
}

/// A module using every default callable.
#[derive(Debug, Clone, Default)]
pub struct DefaultChain {
    config: ChainConfig,
}

impl DefaultChain {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }
}

impl ChainMessagePassing for DefaultChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }
}
