//! Error types for cochain-nn.

use thiserror::Error;

use crate::adjacency::Size;
use crate::inspector::Role;

/// Propagation error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Adjacency with the wrong rank, dtype, row count or index bounds.
    #[error("invalid adjacency: {0}")]
    InvalidAdjacency(String),

    /// Reverse flow requested against a representation that only supports
    /// forward traversal.
    #[error(
        "flow \"target_to_source\" is invalid for propagation over a sparse adjacency; \
         pass the transposed adjacency instead (`adj_t.t()`)"
    )]
    InvalidFlow,

    /// A lifted tensor disagrees with the size already established for
    /// that endpoint.
    #[error("encountered tensor with size {got} in dimension {dim}, but expected size {expected}")]
    SizeMismatch {
        dim: usize,
        expected: usize,
        got: usize,
    },

    /// Up and down adjacency declare different size pairs.
    #[error("up adjacency has size {up:?} but down adjacency has size {down:?}")]
    MismatchedAdjacency { up: Size, down: Size },

    /// A required parameter of a registered callable has no value.
    #[error("required parameter `{name}` of `{role}` is empty")]
    MissingArgument { role: Role, name: String },

    /// A named argument is absent or holds the wrong kind of value.
    #[error("argument `{name}`: expected {expected}, got {got}")]
    ArgumentType {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    /// A fused callable was invoked without being implemented.
    #[error("`{0}` is not implemented")]
    NotImplemented(Role),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for both per-tensor and up/down size disagreements.
    pub fn is_size_mismatch(&self) -> bool {
        matches!(
            self,
            Self::SizeMismatch { .. } | Self::MismatchedAdjacency { .. }
        )
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
