//! Directional message passing on cell complexes.
//!
//! `cochain-nn` propagates features between the cells of one dimension of
//! a cell complex along two adjacency relations at once:
//!
//! - **up**: cells sharing a higher-dimensional coface (two edges of the
//!   same ring),
//! - **down**: cells sharing a lower-dimensional face (two edges meeting
//!   at a node).
//!
//! A layer is a [`ChainMessagePassing`] implementation. It supplies the
//! per-direction `message`, `aggregate` and `update` callables (defaults
//! exist for all of them) and declares the named inputs of each through a
//! [`Signature`]. [`ChainPropagator`] gathers those inputs, lifting `x` to
//! `up_x_j` / `down_x_i` and so on, and runs the callables.
//!
//! # Modules
//!
//! - [`adjacency`]: explicit `[2, E]` index tensors and CSR [`SparseAdjacency`]
//! - [`inspector`]: signature registration and argument distribution
//! - [`collect`]: feature lifting and derived arguments
//! - [`propagate`]: the dispatcher
//! - [`aggr`]: scatter and segment reductions
//!
//! # Example: a custom message
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use cochain_nn::{
//!     default_signature, Adjacency, Args, ChainConfig, ChainMessagePassing, ChainPropagator,
//!     Role, Signature,
//! };
//!
//! /// Sends the difference of endpoint features.
//! struct Diff(ChainConfig);
//!
//! impl ChainMessagePassing for Diff {
//!     fn config(&self) -> &ChainConfig {
//!         &self.0
//!     }
//!
//!     fn signature(&self, role: Role) -> Option<Signature> {
//!         match role {
//!             Role::MessageUp => Some(Signature::new().required("up_x_i").required("up_x_j")),
//!             _ => default_signature(role),
//!         }
//!     }
//!
//!     fn message_up(&self, args: &Args) -> cochain_nn::Result<Tensor> {
//!         Ok((args.tensor("up_x_j")? - args.tensor("up_x_i")?)?)
//!     }
//! }
//!
//! let device = Device::Cpu;
//! let up = Adjacency::from_pairs(&[0, 1], &[1, 0], &device).unwrap();
//! let x = Tensor::new(&[[1f32], [3.]], &device).unwrap();
//!
//! let propagator = ChainPropagator::new(Diff(ChainConfig::default()));
//! let out = propagator
//!     .propagate(Some(&up), None, None, None, &Args::new().with("x", x))
//!     .unwrap();
//! assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![2.], vec![-2.]]);
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod adjacency;
pub mod aggr;
pub mod collect;
pub mod config;
pub mod error;
pub mod inspector;
pub mod message_passing;
pub mod params;
pub mod propagate;
pub mod value;

pub use adjacency::{Adjacency, Size, SparseAdjacency};
pub use collect::Collector;
pub use config::{Aggregation, ChainConfig, Flow};
pub use error::{Error, Result};
pub use inspector::{Direction, Endpoint, Inspector, Param, Role, Signature, SPECIAL_ARGS};
pub use message_passing::{
    default_aggregate, default_signature, default_update, ChainMessagePassing, DefaultChain,
};
pub use params::ChainParams;
pub use propagate::ChainPropagator;
pub use value::{Args, Value};
