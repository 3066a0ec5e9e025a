use thiserror::Error;

use crate::registry::FacetShape;
use crate::value::{FacetId, NodeId};

pub type Result<T> = std::result::Result<T, StateTreeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTreeError {
    // ── Configuration ─────────────────────────────────────────────────────
    #[error("facet type `{0}` is already registered")]
    DuplicateFacet(&'static str),
    #[error("facet type `{0}` is not registered")]
    UnregisteredFacet(String),
    #[error("no facet type registered with id {0}")]
    UnknownFacetId(FacetId),
    #[error("facet registry is full")]
    RegistryFull,
    #[error("facet `{name}` has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: FacetShape,
        actual: FacetShape,
    },
    #[error("factory of facet `{name}` produced a {actual:?} facet, declared {declared:?}")]
    FactoryShapeMismatch {
        name: &'static str,
        declared: FacetShape,
        actual: FacetShape,
    },

    // ── Structure ─────────────────────────────────────────────────────────
    #[error("the root node cannot be given a parent")]
    RootHasNoParent,
    #[error("node {node} already has parent {parent}")]
    AlreadyHasParent { node: NodeId, parent: NodeId },
    #[error("node {node} cannot become a child of its descendant {parent}")]
    CyclicParent { node: NodeId, parent: NodeId },
    #[error("node-valued list `{0}` only accepts node values")]
    NotANodeValue(&'static str),
    #[error("plain list `{0}` cannot hold node values")]
    NodeValueInPlainList(&'static str),

    // ── Invariants ────────────────────────────────────────────────────────
    #[error("node {0} does not exist or has been discarded")]
    StaleNode(NodeId),
    #[error("node {0} is still attached or has a parent")]
    NodeInUse(NodeId),
    #[error("facet {facet} of node {node} has pending changes")]
    TrackerNotEmpty { node: NodeId, facet: FacetId },
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}
