//! Construction-time configuration for chain message passing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inspector::Direction;
use crate::{Error, Result};

/// Reduction applied to per-edge messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Sum of incoming messages. Empty endpoints get 0.
    #[serde(alias = "sum")]
    Add,
    /// Arithmetic mean. Empty endpoints get 0, never NaN.
    Mean,
    /// Elementwise maximum. Empty endpoints get 0.
    Max,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }

    /// Parse an aggregation that may be disabled (`"none"`).
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "sum" => Ok(Self::Add),
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            other => Err(Error::InvalidConfig(format!(
                "unknown aggregation `{other}` (expected add, mean or max)"
            ))),
        }
    }
}

/// Mapping from adjacency row order to source/target roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Row 0 holds sources, row 1 holds targets.
    #[default]
    SourceToTarget,
    /// Row 0 holds targets, row 1 holds sources.
    TargetToSource,
}

impl Flow {
    /// Adjacency rows `(i, j)` holding the target and source endpoints.
    pub fn endpoints(self) -> (usize, usize) {
        match self {
            Self::SourceToTarget => (1, 0),
            Self::TargetToSource => (0, 1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceToTarget => "source_to_target",
            Self::TargetToSource => "target_to_source",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "source_to_target" => Ok(Self::SourceToTarget),
            "target_to_source" => Ok(Self::TargetToSource),
            other => Err(Error::InvalidConfig(format!(
                "unknown flow `{other}` (expected source_to_target or target_to_source)"
            ))),
        }
    }
}

/// Configuration of a chain message-passing module.
///
/// Held by value by the module and never mutated after construction.
///
/// # Example
///
/// ```rust
/// use cochain_nn::{Aggregation, ChainConfig, Flow};
///
/// let config = ChainConfig::new(Some(Aggregation::Mean), Some(Aggregation::Max))
///     .with_flow(Flow::SourceToTarget);
/// assert_eq!(config.node_dim, -2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Reduction for up-adjacency messages. `None` requires an overridden
    /// `aggregate_up`.
    pub aggr_up: Option<Aggregation>,
    /// Reduction for down-adjacency messages.
    pub aggr_down: Option<Aggregation>,
    /// Flow convention shared by both directions.
    pub flow: Flow,
    /// Axis along which cells live in feature tensors. Negative values
    /// count from the end, so `-2` is the row axis of a `[N, D]` matrix.
    pub node_dim: isize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            aggr_up: Some(Aggregation::Add),
            aggr_down: Some(Aggregation::Add),
            flow: Flow::SourceToTarget,
            node_dim: -2,
        }
    }
}

impl ChainConfig {
    pub fn new(aggr_up: Option<Aggregation>, aggr_down: Option<Aggregation>) -> Self {
        Self {
            aggr_up,
            aggr_down,
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_node_dim(mut self, node_dim: isize) -> Self {
        self.node_dim = node_dim;
        self
    }

    /// The reduction configured for `direction`.
    pub fn aggr(&self, direction: Direction) -> Option<Aggregation> {
        match direction {
            Direction::Up => self.aggr_up,
            Direction::Down => self.aggr_down,
        }
    }

    /// Resolve `node_dim` against a tensor of the given rank.
    pub fn axis(&self, rank: usize) -> Result<usize> {
        resolve_axis(self.node_dim, rank)
    }
}

pub(crate) fn resolve_axis(axis: isize, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 {
        rank as isize + axis
    } else {
        axis
    };
    if resolved < 0 || resolved as usize >= rank {
        return Err(Error::InvalidConfig(format!(
            "node_dim {axis} is out of range for a tensor of rank {rank}"
        )));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregation() {
        assert_eq!("add".parse::<Aggregation>().unwrap(), Aggregation::Add);
        assert_eq!("sum".parse::<Aggregation>().unwrap(), Aggregation::Add);
        assert_eq!("MEAN".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!(Aggregation::parse_optional("none").unwrap(), None);
        assert!("lstm".parse::<Aggregation>().is_err());
    }

    #[test]
    fn test_flow_endpoints() {
        assert_eq!(Flow::SourceToTarget.endpoints(), (1, 0));
        assert_eq!(Flow::TargetToSource.endpoints(), (0, 1));
        assert_eq!(
            "target_to_source".parse::<Flow>().unwrap(),
            Flow::TargetToSource
        );
    }

    #[test]
    fn test_resolve_axis() {
        let config = ChainConfig::default();
        assert_eq!(config.axis(2).unwrap(), 0);
        assert_eq!(config.axis(3).unwrap(), 1);
        assert!(config.axis(1).is_err());
        assert_eq!(config.with_node_dim(1).axis(2).unwrap(), 1);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ChainConfig = serde_json::from_str(r#"{"aggr_down": "max"}"#).unwrap();
        assert_eq!(config.aggr_up, Some(Aggregation::Add));
        assert_eq!(config.aggr_down, Some(Aggregation::Max));
        assert_eq!(config.flow, Flow::SourceToTarget);

        let config: ChainConfig =
            serde_json::from_str(r#"{"aggr_up": null, "flow": "target_to_source"}"#).unwrap();
        assert_eq!(config.aggr_up, None);
        assert_eq!(config.flow, Flow::TargetToSource);
    }
}
