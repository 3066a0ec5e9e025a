//! Server-authoritative shared-state tree.
//!
//! The server owns a tree of nodes; each node carries typed facets (maps and
//! lists) that record what changed since the last flush. A flush turns those
//! records into the minimal diff stream a client needs to mirror the
//! attached part of the tree.
//!
//! ```
//! use state_tree::{FacetDiff, FacetRegistry, FacetSpec, FacetValue, NodeChange, StateTree};
//!
//! let registry = FacetRegistry::bootstrap([
//!     FacetSpec::map("props"),
//!     FacetSpec::node_list("children"),
//! ])?;
//! let props = registry.id_of("props")?;
//! let children = registry.id_of("children")?;
//! let mut tree = StateTree::new(registry);
//!
//! let root = tree.root();
//! let child = tree.create_node();
//! tree.map(child, props)?.put("text", "hello")?;
//! tree.list(root, children)?.add(child)?;
//!
//! let batch = tree.flush();
//! assert_eq!(
//!     batch.changes,
//!     vec![
//!         NodeChange::facet(root, children, FacetDiff::Splice {
//!             index: 0,
//!             remove: 0,
//!             items: vec![FacetValue::Node(child)],
//!         }),
//!         NodeChange::attach(child),
//!         NodeChange::facet(child, props, FacetDiff::Put {
//!             key: "text".into(),
//!             value: "hello".into(),
//!         }),
//!     ]
//! );
//! assert!(tree.flush().is_empty());
//! # Ok::<(), state_tree::StateTreeError>(())
//! ```

pub mod diff;
pub mod error;
pub mod facet;
pub mod node;
pub mod options;
pub mod pool;
pub mod registry;
pub mod resource;
pub mod tree;
pub mod value;

pub use diff::{ChangeKind, FacetDiff, NodeChange};
pub use error::{Result, StateTreeError};
pub use facet::{apply_splices, Facet, ListFacet, MapFacet};
pub use node::{ListenerId, StateNode};
pub use options::TreeOptions;
pub use pool::{ConstantPool, SharedConstantPool};
pub use registry::{
    AttachHook, ChangeGate, DetachHook, FacetFactory, FacetRegistry, FacetShape, FacetSpec,
    FacetType, RegistryBuilder,
};
pub use resource::{HandleId, ResourceBinding, ResourceTable};
pub use tree::{
    ChangeSink, DeferredAction, DeferredQueue, ExecutionId, FlushBatch, FlushReport, ListHandle,
    MapHandle, SetHandle, StateTree,
};
pub use value::{ConstantKey, FacetId, FacetValue, NodeId};
