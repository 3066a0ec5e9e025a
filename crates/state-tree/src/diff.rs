//! Change records handed to the transport layer.
//!
//! Facets emit [`FacetDiff`]s; the tree wraps them into per-node
//! [`NodeChange`]s together with attach and detach notifications.

use serde::Serialize;

use crate::value::{FacetId, FacetValue, NodeId};

/// A minimal change to one facet's content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FacetDiff {
    /// A map key now holds `value`.
    Put { key: String, value: FacetValue },
    /// A map key no longer exists.
    Remove { key: String },
    /// Replace `remove` elements starting at `index` with `items`.
    ///
    /// `index` is valid against the list as it stands after every earlier
    /// splice of the same flush has been applied.
    Splice {
        index: usize,
        remove: usize,
        items: Vec<FacetValue>,
    },
}

impl FacetDiff {
    /// Values carried by this diff.
    pub fn values(&self) -> impl Iterator<Item = &FacetValue> {
        let (single, many): (Option<&FacetValue>, &[FacetValue]) = match self {
            FacetDiff::Put { value, .. } => (Some(value), &[]),
            FacetDiff::Remove { .. } => (None, &[]),
            FacetDiff::Splice { items, .. } => (None, items.as_slice()),
        };
        single.into_iter().chain(many.iter())
    }
}

/// What happened to a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeKind {
    /// The node became visible to the client. Followed by a full replay of
    /// its facets.
    Attach,
    /// The node left the client's view.
    Detach,
    /// Content change in one of the node's facets.
    Facet { facet: FacetId, diff: FacetDiff },
}

/// A change record addressed to one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeChange {
    pub node: NodeId,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl NodeChange {
    pub fn attach(node: NodeId) -> Self {
        Self {
            node,
            kind: ChangeKind::Attach,
        }
    }

    pub fn detach(node: NodeId) -> Self {
        Self {
            node,
            kind: ChangeKind::Detach,
        }
    }

    pub fn facet(node: NodeId, facet: FacetId, diff: FacetDiff) -> Self {
        Self {
            node,
            kind: ChangeKind::Facet { facet, diff },
        }
    }

    /// The facet diff, if this is a content change.
    pub fn diff(&self) -> Option<&FacetDiff> {
        match &self.kind {
            ChangeKind::Facet { diff, .. } => Some(diff),
            _ => None,
        }
    }
}
