#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]

//! Cell complexes and the datasets built on them.
//!
//! A cell complex generalises a graph with higher-dimensional cells:
//!
//! ```text
//! dim 0   nodes        0 --- 1
//! dim 1   edges        |     |
//! dim 2   rings        3 --- 2     one ring bounded by 4 edges
//! ```
//!
//! Each dimension is a [`Cochain`]: a feature matrix plus the up-adjacency
//! (cells sharing a coface) and down-adjacency (cells sharing a face) used
//! by message passing in `cochain-nn`.
//!
//! - [`Complex`] / [`Cochain`]: the layered data model
//! - [`ComplexBuilder`]: lift a graph with known rings
//! - [`datasets`]: the ring-lookup task with an on-disk cache

pub mod complex;
pub mod datasets;
pub mod error;
pub mod lift;

pub use complex::{Cochain, CochainRecord, Complex, ComplexRecord, IndexRecord, TensorRecord};
pub use error::{Error, Result};
pub use lift::{CellInit, ComplexBuilder};
