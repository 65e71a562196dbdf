//! Explicit signature registration for user callables.
//!
//! Every callable a module plugs into the engine declares the named inputs
//! it needs through a [`Signature`]. The [`Inspector`] collects these once
//! at construction and answers three questions during propagation: which
//! names to gather ([`Inspector::keys`]), whether a fused path exists
//! ([`Inspector::implements`]) and which values a callable receives
//! ([`Inspector::distribute`]).
//!
//! Names ending in `_i` / `_j` request a feature lifted to the target /
//! source endpoint of every edge, e.g. `up_x_j` is `x` gathered at the
//! source of each up-adjacency edge.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::value::{Args, Value};
use crate::{Error, Result};

/// Names the engine populates itself; never gathered from the caller's bag.
pub const SPECIAL_ARGS: [&str; 10] = [
    "edge_index",
    "adj_t",
    "edge_index_i",
    "edge_index_j",
    "size",
    "size_i",
    "size_j",
    "ptr",
    "index",
    "dim_size",
];

/// Adjacency direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Cells sharing a higher-dimensional coface.
    Up,
    /// Cells sharing a lower-dimensional face.
    Down,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Up, Direction::Down];

    /// Prefix used in argument names (`up` / `down`).
    pub fn tag(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Edge endpoint requested by an `_i` / `_j` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `_i`: the cell receiving the message.
    Target,
    /// `_j`: the cell sending the message.
    Source,
}

impl Endpoint {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with("_i") {
            Some(Self::Target)
        } else if name.ends_with("_j") {
            Some(Self::Source)
        } else {
            None
        }
    }

    /// Index into a [`Size`](crate::Size) pair: sources size slot 0,
    /// targets slot 1.
    pub fn size_slot(self) -> usize {
        match self {
            Self::Source => 0,
            Self::Target => 1,
        }
    }
}

/// Logical role of a user callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    MessageUp,
    MessageDown,
    AggregateUp,
    AggregateDown,
    MessageAndAggregateUp,
    MessageAndAggregateDown,
    Update,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::MessageUp,
        Role::MessageDown,
        Role::AggregateUp,
        Role::AggregateDown,
        Role::MessageAndAggregateUp,
        Role::MessageAndAggregateDown,
        Role::Update,
    ];

    pub fn message(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::MessageUp,
            Direction::Down => Self::MessageDown,
        }
    }

    pub fn aggregate(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::AggregateUp,
            Direction::Down => Self::AggregateDown,
        }
    }

    pub fn message_and_aggregate(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::MessageAndAggregateUp,
            Direction::Down => Self::MessageAndAggregateDown,
        }
    }

    /// True for the optional fused roles.
    pub fn is_fused(self) -> bool {
        matches!(
            self,
            Self::MessageAndAggregateUp | Self::MessageAndAggregateDown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageUp => "message_up",
            Self::MessageDown => "message_down",
            Self::AggregateUp => "aggregate_up",
            Self::AggregateDown => "aggregate_down",
            Self::MessageAndAggregateUp => "message_and_aggregate_up",
            Self::MessageAndAggregateDown => "message_and_aggregate_down",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Endpoint tag derived from the name suffix.
    pub fn endpoint(&self) -> Option<Endpoint> {
        Endpoint::from_name(&self.name)
    }
}

/// Ordered, de-duplicated parameter list of a callable.
///
/// ```rust
/// use cochain_nn::{Signature, Value};
///
/// let sig = Signature::new()
///     .required("up_x_j")
///     .optional("up_attr", Value::None)
///     .required("up_x_j");
/// assert_eq!(sig.names().collect::<Vec<_>>(), vec!["up_x_j", "up_attr"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: impl Into<String>) -> Self {
        self.param(Param::required(name))
    }

    pub fn optional(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.param(Param::optional(name, default))
    }

    /// Append `param` unless a parameter of that name is already declared.
    pub fn param(mut self, param: Param) -> Self {
        if !self.params.iter().any(|p| p.name == param.name) {
            self.params.push(param);
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Param::name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Registered signatures of one module, keyed by role.
#[derive(Debug, Clone, Default)]
pub struct Inspector {
    params: BTreeMap<Role, Signature>,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the signature for `role`, replacing any previous one.
    pub fn inspect(&mut self, role: Role, signature: Signature) {
        self.params.insert(role, signature);
    }

    pub fn signature(&self, role: Role) -> Option<&Signature> {
        self.params.get(&role)
    }

    /// Union of the parameter names declared for `roles`, minus
    /// [`SPECIAL_ARGS`].
    pub fn keys(&self, roles: &[Role]) -> BTreeSet<String> {
        roles
            .iter()
            .filter_map(|role| self.params.get(role))
            .flat_map(Signature::names)
            .filter(|name| !SPECIAL_ARGS.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Whether a callable was registered for `role`.
    pub fn implements(&self, role: Role) -> bool {
        self.params.contains_key(&role)
    }

    /// Select the values `role` declares, in declaration order.
    ///
    /// Absent names take their declared default; an absent required name
    /// is a [`Error::MissingArgument`]. An unregistered role is
    /// [`Error::NotImplemented`].
    pub fn distribute(&self, role: Role, available: &Args) -> Result<Args> {
        let signature = self
            .params
            .get(&role)
            .ok_or(Error::NotImplemented(role))?;

        let mut out = Args::new();
        for param in signature.params() {
            let value = match (available.get(param.name()), param.default_value()) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(Error::MissingArgument {
                        role,
                        name: param.name().to_string(),
                    })
                }
            };
            out.insert(param.name(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector() -> Inspector {
        let mut inspector = Inspector::new();
        inspector.inspect(
            Role::MessageUp,
            Signature::new()
                .required("up_x_j")
                .optional("up_attr", Value::None),
        );
        inspector.inspect(
            Role::AggregateUp,
            Signature::new()
                .required("up_index")
                .optional("up_ptr", Value::None)
                .optional("ptr", Value::None),
        );
        inspector.inspect(Role::Update, Signature::new().required("x"));
        inspector
    }

    #[test]
    fn test_keys_drop_special_names() {
        let keys = inspector().keys(&[Role::MessageUp, Role::AggregateUp]);
        let keys: Vec<_> = keys.iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["up_attr", "up_index", "up_ptr", "up_x_j"]);
    }

    #[test]
    fn test_implements_only_registered() {
        let inspector = inspector();
        assert!(inspector.implements(Role::MessageUp));
        assert!(!inspector.implements(Role::MessageAndAggregateUp));
    }

    #[test]
    fn test_distribute_defaults_and_order() {
        let available = Args::new()
            .with("extra", 1usize)
            .with("up_index", 7usize)
            .with("up_x_j", 2.0);
        let out = inspector().distribute(Role::MessageUp, &available).unwrap();

        assert_eq!(out.names().collect::<Vec<_>>(), vec!["up_x_j", "up_attr"]);
        assert!(out.get("up_attr").unwrap().is_none());
    }

    #[test]
    fn test_distribute_missing_required() {
        let err = inspector()
            .distribute(Role::Update, &Args::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument { role: Role::Update, ref name } if name == "x"
        ));
    }

    #[test]
    fn test_distribute_unregistered_role() {
        let err = inspector()
            .distribute(Role::MessageAndAggregateDown, &Args::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotImplemented(Role::MessageAndAggregateDown)
        ));
    }

    #[test]
    fn test_endpoint_suffix() {
        assert_eq!(Param::required("up_x_i").endpoint(), Some(Endpoint::Target));
        assert_eq!(Param::required("down_x_j").endpoint(), Some(Endpoint::Source));
        assert_eq!(Param::required("x").endpoint(), None);
    }
}
