//! Identity types and the values stored in facets.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a node within its [`StateTree`](crate::StateTree).
///
/// Assigned when the node is created and never reused, so it stays stable
/// across detach and re-attach. The root is always [`NodeId::ROOT`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Id of every tree's root node.
    pub const ROOT: NodeId = NodeId(1);

    /// Raw numeric id, as addressed by the transport layer.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Arena slot of this id.
    #[inline]
    pub(crate) const fn slot(self) -> usize {
        (self.0 - 1) as usize
    }

    #[inline]
    pub(crate) const fn from_slot(slot: usize) -> Self {
        NodeId(slot as u32 + 1)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable wire id of a facet type, assigned by the
/// [`FacetRegistry`](crate::FacetRegistry) in registration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetId(pub(crate) u16);

impl FacetId {
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacetId({})", self.0)
    }
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of an interned payload in a [`ConstantPool`](crate::ConstantPool).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstantKey(String);

impl ConstantKey {
    pub(crate) fn new(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConstantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value held by a map entry or a list element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetValue {
    /// Plain JSON data.
    Json(Value),
    /// A child node. Holding it makes the owning node its parent.
    Node(NodeId),
    /// Reference to an interned constant payload.
    Constant(ConstantKey),
}

impl FacetValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FacetValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            FacetValue::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&ConstantKey> {
        match self {
            FacetValue::Constant(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Value::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Value::as_f64)
    }
}

impl From<Value> for FacetValue {
    fn from(value: Value) -> Self {
        FacetValue::Json(value)
    }
}

impl From<NodeId> for FacetValue {
    fn from(id: NodeId) -> Self {
        FacetValue::Node(id)
    }
}

impl From<ConstantKey> for FacetValue {
    fn from(key: ConstantKey) -> Self {
        FacetValue::Constant(key)
    }
}

impl From<&str> for FacetValue {
    fn from(s: &str) -> Self {
        FacetValue::Json(Value::String(s.to_owned()))
    }
}

impl From<String> for FacetValue {
    fn from(s: String) -> Self {
        FacetValue::Json(Value::String(s))
    }
}

impl From<bool> for FacetValue {
    fn from(b: bool) -> Self {
        FacetValue::Json(Value::Bool(b))
    }
}

impl From<i64> for FacetValue {
    fn from(n: i64) -> Self {
        FacetValue::Json(Value::from(n))
    }
}

impl From<i32> for FacetValue {
    fn from(n: i32) -> Self {
        FacetValue::Json(Value::from(n))
    }
}

impl From<f64> for FacetValue {
    fn from(n: f64) -> Self {
        FacetValue::Json(Value::from(n))
    }
}
