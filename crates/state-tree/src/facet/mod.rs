//! Per-node data shapes with change tracking.
//!
//! | Shape       | Storage                      | Tracker                        |
//! |-------------|------------------------------|--------------------------------|
//! | `Map`       | `key → value`                | `key → prior value \| REMOVED` |
//! | `List`      | ordered values               | ordered splice log             |
//! | `NodeList`  | ordered child node ids       | ordered splice log             |

pub mod list;
pub mod map;

pub use list::{apply_splices, ListCursor, ListFacet};
pub use map::MapFacet;

use crate::diff::FacetDiff;
use crate::registry::FacetShape;
use crate::value::NodeId;

/// A facet instance owned by one node.
#[derive(Debug, Clone)]
pub enum Facet {
    Map(MapFacet),
    List(ListFacet),
}

impl Facet {
    pub fn shape(&self) -> FacetShape {
        match self {
            Facet::Map(_) => FacetShape::Map,
            Facet::List(list) if list.holds_nodes() => FacetShape::NodeList,
            Facet::List(_) => FacetShape::List,
        }
    }

    /// A fresh, empty facet of the given shape.
    pub fn empty(shape: FacetShape) -> Self {
        match shape {
            FacetShape::Map => Facet::Map(MapFacet::new()),
            FacetShape::List => Facet::List(ListFacet::new()),
            FacetShape::NodeList => Facet::List(ListFacet::node_list()),
        }
    }

    pub fn as_map(&self) -> Option<&MapFacet> {
        match self {
            Facet::Map(map) => Some(map),
            Facet::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListFacet> {
        match self {
            Facet::List(list) => Some(list),
            Facet::Map(_) => None,
        }
    }

    pub(crate) fn as_map_mut(&mut self) -> Option<&mut MapFacet> {
        match self {
            Facet::Map(map) => Some(map),
            Facet::List(_) => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut ListFacet> {
        match self {
            Facet::List(list) => Some(list),
            Facet::Map(_) => None,
        }
    }

    pub fn has_changes(&self) -> bool {
        match self {
            Facet::Map(map) => map.has_changes(),
            Facet::List(list) => list.has_changes(),
        }
    }

    pub fn changes(&self) -> Vec<FacetDiff> {
        match self {
            Facet::Map(map) => map.changes(),
            Facet::List(list) => list.changes(),
        }
    }

    pub fn collect_changes(&mut self, emit: impl FnMut(FacetDiff)) {
        match self {
            Facet::Map(map) => map.collect_changes(emit),
            Facet::List(list) => list.collect_changes(emit),
        }
    }

    pub fn clear_changes(&mut self) {
        match self {
            Facet::Map(map) => map.clear_changes(),
            Facet::List(list) => list.clear_changes(),
        }
    }

    pub fn generate_changes_from_empty(&mut self) {
        match self {
            Facet::Map(map) => map.generate_changes_from_empty(),
            Facet::List(list) => list.generate_changes_from_empty(),
        }
    }

    pub fn for_each_child(&self, f: impl FnMut(NodeId)) {
        match self {
            Facet::Map(map) => map.for_each_child(f),
            Facet::List(list) => list.for_each_child(f),
        }
    }
}

impl From<MapFacet> for Facet {
    fn from(map: MapFacet) -> Self {
        Facet::Map(map)
    }
}

impl From<ListFacet> for Facet {
    fn from(list: ListFacet) -> Self {
        Facet::List(list)
    }
}
