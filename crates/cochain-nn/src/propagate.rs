//! Propagation dispatcher.
//!
//! [`ChainPropagator`] wraps a [`ChainMessagePassing`] module, registers its
//! signatures once, and runs one propagation step: up direction, down
//! direction, then update.

use std::collections::BTreeSet;

use candle_core::Tensor;
use tracing::debug;

use crate::adjacency::{Adjacency, Size, SparseAdjacency};
use crate::collect::Collector;
use crate::config::ChainConfig;
use crate::inspector::{Direction, Inspector, Role};
use crate::message_passing::{default_signature, ChainMessagePassing};
use crate::params::ChainParams;
use crate::value::Args;
use crate::{Error, Result};

/// How one direction turns features into aggregated messages.
enum Route<'a> {
    /// A single `message_and_aggregate_*` call over the sparse adjacency.
    Fused(&'a SparseAdjacency),
    /// `message_*` per edge, then `aggregate_*` per endpoint.
    Separate,
}

/// Runs directional message passing for a module.
///
/// ```rust
/// use candle_core::{Device, Tensor};
/// use cochain_nn::{Adjacency, Args, ChainPropagator, DefaultChain};
///
/// let device = Device::Cpu;
/// let up = Adjacency::from_pairs(&[0, 1, 2], &[1, 2, 3], &device).unwrap();
/// let x = Tensor::new(&[[1f32], [2.], [3.], [4.]], &device).unwrap();
///
/// let propagator = ChainPropagator::new(DefaultChain::default());
/// let out = propagator
///     .propagate(Some(&up), None, None, None, &Args::new().with("x", x))
///     .unwrap();
/// assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![0.], vec![1.], vec![2.], vec![3.]]);
/// ```
#[derive(Debug, Clone)]
pub struct ChainPropagator<M> {
    module: M,
    inspector: Inspector,
    collector: Collector,
    user_args: BTreeSet<String>,
    fused_user_args: BTreeSet<String>,
    update_user_args: BTreeSet<String>,
    fuse_up: bool,
    fuse_down: bool,
}

impl<M: ChainMessagePassing> ChainPropagator<M> {
    /// Register the module's signatures.
    ///
    /// Non-fused roles without a signature fall back to the defaults, so
    /// they are always implemented.
    pub fn new(module: M) -> Self {
        let mut inspector = Inspector::new();
        for role in Role::ALL {
            let signature = match module.signature(role) {
                Some(signature) => Some(signature),
                None if !role.is_fused() => default_signature(role),
                None => None,
            };
            match signature {
                Some(signature) => inspector.inspect(role, signature),
                None => debug!(
                    %role,
                    "no signature for fused role; sparse input takes the separate route"
                ),
            }
        }

        let user_args = inspector.keys(&[
            Role::MessageUp,
            Role::MessageDown,
            Role::AggregateUp,
            Role::AggregateDown,
        ]);
        let fused_user_args =
            inspector.keys(&[Role::MessageAndAggregateUp, Role::MessageAndAggregateDown]);
        let update_user_args = inspector.keys(&[Role::Update]);
        let fuse_up = inspector.implements(Role::MessageAndAggregateUp);
        let fuse_down = inspector.implements(Role::MessageAndAggregateDown);
        let collector = Collector::new(module.config());

        debug!(fuse_up, fuse_down, user_args = ?user_args, "registered chain module");

        Self {
            module,
            inspector,
            collector,
            user_args,
            fused_user_args,
            update_user_args,
            fuse_up,
            fuse_down,
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    pub fn config(&self) -> &ChainConfig {
        self.module.config()
    }

    /// Whether `direction` has a fused callable.
    pub fn fuses(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.fuse_up,
            Direction::Down => self.fuse_down,
        }
    }

    /// One propagation step.
    ///
    /// `up_size` / `down_size` declare `[num_sources, num_targets]` for
    /// explicit adjacencies; sparse adjacencies carry their own size.
    /// A direction without adjacency contributes `None` to `update`.
    pub fn propagate(
        &self,
        up: Option<&Adjacency>,
        down: Option<&Adjacency>,
        up_size: Option<[usize; 2]>,
        down_size: Option<[usize; 2]>,
        kwargs: &Args,
    ) -> Result<Tensor> {
        let flow = self.config().flow;
        let mut up_size = match up {
            Some(adj) => adj.resolve_size(up_size, flow)?,
            None => [None, None],
        };
        let mut down_size = match down {
            Some(adj) => adj.resolve_size(down_size, flow)?,
            None => [None, None],
        };
        check_together(up, down, &up_size, &down_size)?;
        if let Some(adj) = up {
            adj.check_bounds(&up_size, flow)?;
        }
        if let Some(adj) = down {
            adj.check_bounds(&down_size, flow)?;
        }

        let up_out = match up {
            Some(adj) => Some(self.run_direction(Direction::Up, adj, &mut up_size, kwargs)?),
            None => None,
        };
        let down_out = match down {
            Some(adj) => Some(self.run_direction(Direction::Down, adj, &mut down_size, kwargs)?),
            None => None,
        };

        let mut collected = self.collector.collect(
            &self.update_user_args,
            up,
            &mut up_size,
            Direction::Up,
            kwargs,
        )?;
        collected.extend(self.collector.collect(
            &self.update_user_args,
            down,
            &mut down_size,
            Direction::Down,
            kwargs,
        )?);
        let update_args = self.inspector.distribute(Role::Update, &collected)?;
        self.module.update(up_out, down_out, &update_args)
    }

    /// Propagate the inputs bundled in `params`, with `x` in the bag.
    pub fn propagate_params(&self, params: &ChainParams) -> Result<Tensor> {
        self.propagate(
            params.up_index.as_ref(),
            params.down_index.as_ref(),
            None,
            None,
            &params.args(),
        )
    }

    /// Invoke the fused callable of `direction` directly.
    ///
    /// Unlike [`propagate`](Self::propagate) there is no fallback: a module
    /// without a fused callable for `direction` gives
    /// [`Error::NotImplemented`].
    pub fn message_and_aggregate(
        &self,
        direction: Direction,
        adj_t: &SparseAdjacency,
        kwargs: &Args,
    ) -> Result<Tensor> {
        let role = Role::message_and_aggregate(direction);
        if !self.inspector.implements(role) {
            return Err(Error::NotImplemented(role));
        }
        let adj = Adjacency::Sparse(adj_t.clone());
        let mut size = adj.resolve_size(None, self.config().flow)?;
        self.fused(direction, adj_t, &adj, &mut size, kwargs)
    }

    fn route<'a>(&self, direction: Direction, adj: &'a Adjacency) -> Route<'a> {
        match adj {
            Adjacency::Sparse(adj_t) if self.fuses(direction) => Route::Fused(adj_t),
            _ => Route::Separate,
        }
    }

    fn run_direction(
        &self,
        direction: Direction,
        adj: &Adjacency,
        size: &mut Size,
        kwargs: &Args,
    ) -> Result<Tensor> {
        let _span = tracing::debug_span!("propagate", %direction).entered();
        match self.route(direction, adj) {
            Route::Fused(adj_t) => {
                debug!(nnz = adj_t.nnz(), "fused message and aggregate");
                self.fused(direction, adj_t, adj, size, kwargs)
            }
            Route::Separate => {
                debug!(edges = adj.num_edges()?, sparse = adj.is_sparse(), "separate message and aggregate");
                let collected =
                    self.collector
                        .collect(&self.user_args, Some(adj), size, direction, kwargs)?;

                let message_args = self
                    .inspector
                    .distribute(Role::message(direction), &collected)?;
                let messages = match direction {
                    Direction::Up => self.module.message_up(&message_args)?,
                    Direction::Down => self.module.message_down(&message_args)?,
                };

                let aggregate_args = self
                    .inspector
                    .distribute(Role::aggregate(direction), &collected)?;
                match direction {
                    Direction::Up => self.module.aggregate_up(&messages, &aggregate_args),
                    Direction::Down => self.module.aggregate_down(&messages, &aggregate_args),
                }
            }
        }
    }

    fn fused(
        &self,
        direction: Direction,
        adj_t: &SparseAdjacency,
        adj: &Adjacency,
        size: &mut Size,
        kwargs: &Args,
    ) -> Result<Tensor> {
        let collected =
            self.collector
                .collect(&self.fused_user_args, Some(adj), size, direction, kwargs)?;
        let args = self
            .inspector
            .distribute(Role::message_and_aggregate(direction), &collected)?;
        match direction {
            Direction::Up => self.module.message_and_aggregate_up(adj_t, &args),
            Direction::Down => self.module.message_and_aggregate_down(adj_t, &args),
        }
    }
}

/// Explicit up and down adjacencies with fully known sizes must agree.
fn check_together(
    up: Option<&Adjacency>,
    down: Option<&Adjacency>,
    up_size: &Size,
    down_size: &Size,
) -> Result<()> {
    let (Some(Adjacency::Index(_)), Some(Adjacency::Index(_))) = (up, down) else {
        return Ok(());
    };
    let known = |size: &Size| size.iter().all(Option::is_some);
    if known(up_size) && known(down_size) && up_size != down_size {
        return Err(Error::MismatchedAdjacency {
            up: *up_size,
            down: *down_size,
        });
    }
    Ok(())
}
