//! The synchronized tree.
//!
//! # Overview
//!
//! A [`StateTree`] owns every node of one session in an arena addressed by
//! [`NodeId`]. Parent links and listener registrations are ids, never owning
//! references. Mutations go through facet handles ([`MapHandle`],
//! [`ListHandle`], [`SetHandle`]) that record the change in the facet's
//! tracker and queue the node as dirty. [`StateTree::flush`] turns the
//! queued changes into [`NodeChange`](crate::NodeChange) records.
//!
//! A node is attached while it is linked, directly or transitively, below
//! the root. Linking happens by storing the node as a value in one of its
//! parent's facets; unlinking by removing it.

mod flush;
mod handles;
mod listeners;

pub use flush::{
    ChangeSink, DeferredAction, DeferredQueue, ExecutionId, FlushBatch, FlushReport,
};
pub use handles::{ListHandle, MapHandle, SetHandle};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::Value;

use crate::error::{Result, StateTreeError};
use crate::facet::Facet;
use crate::node::{ListenerId, StateNode};
use crate::options::TreeOptions;
use crate::pool::{ConstantPool, PoolScope, SharedConstantPool};
use crate::registry::{FacetRegistry, FacetShape, FacetSpec, FacetType};
use crate::resource::ResourceTable;
use crate::value::{ConstantKey, FacetId, FacetValue, NodeId};

use flush::Execution;

pub struct StateTree {
    registry: Arc<FacetRegistry>,
    options: TreeOptions,
    nodes: Vec<Option<StateNode>>,
    dirty: IndexSet<NodeId>,
    pool: PoolScope,
    transmitted: HashSet<ConstantKey>,
    /// Discarded nodes whose detach has not been reported yet.
    discarded_attached: HashSet<NodeId>,
    next_listener: u64,
    firing: HashSet<ListenerId>,
    cancelled_listeners: HashSet<ListenerId>,
    /// `(node, attach)` pairs whose listeners are running.
    firing_transitions: HashSet<(NodeId, bool)>,
    /// Transitions that happened again while their listeners were running.
    refire: HashSet<(NodeId, bool)>,
    executions: Vec<Execution>,
    running_executions: HashSet<ExecutionId>,
    cancelled_executions: HashSet<ExecutionId>,
    next_execution: u64,
    deferred: DeferredQueue,
    pub(crate) resources: ResourceTable,
}

impl StateTree {
    /// An empty tree with a tree-scoped constant pool.
    pub fn new(registry: Arc<FacetRegistry>) -> Self {
        Self::with_options(registry, TreeOptions::default())
    }

    pub fn with_options(registry: Arc<FacetRegistry>, options: TreeOptions) -> Self {
        Self::build(registry, options, PoolScope::Tree(ConstantPool::new()))
    }

    /// An empty tree interning into `pool`, which may be shared with other
    /// trees.
    pub fn with_shared_pool(
        registry: Arc<FacetRegistry>,
        options: TreeOptions,
        pool: SharedConstantPool,
    ) -> Self {
        Self::build(registry, options, PoolScope::Shared(pool))
    }

    fn build(registry: Arc<FacetRegistry>, options: TreeOptions, pool: PoolScope) -> Self {
        let mut nodes = Vec::with_capacity(options.node_capacity.max(1));
        nodes.push(Some(StateNode::new_root()));
        Self {
            registry,
            options,
            nodes,
            dirty: IndexSet::new(),
            pool,
            transmitted: HashSet::new(),
            discarded_attached: HashSet::new(),
            next_listener: 1,
            firing: HashSet::new(),
            cancelled_listeners: HashSet::new(),
            firing_transitions: HashSet::new(),
            refire: HashSet::new(),
            executions: Vec::new(),
            running_executions: HashSet::new(),
            cancelled_executions: HashSet::new(),
            next_execution: 1,
            deferred: DeferredQueue::default(),
            resources: ResourceTable::default(),
        }
    }

    pub fn registry(&self) -> &Arc<FacetRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    // ── Nodes ─────────────────────────────────────────────────────────────

    /// Create a detached node.
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId::from_slot(self.nodes.len());
        self.nodes.push(Some(StateNode::new(id)));
        id
    }

    /// Number of live (not discarded) nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Always `false`: a tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Result<&StateNode> {
        self.slot(id).ok_or(StateTreeError::StaleNode(id))
    }

    /// The node with `id` if it is currently attached.
    pub fn node_by_id(&self, id: NodeId) -> Option<&StateNode> {
        self.slot(id).filter(|n| n.attached)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|n| n.attached)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|n| n.parent)
    }

    /// Whether `id` withholds changes from the client: one of its own facets
    /// disallows changes, or one of its ancestors is inactive.
    pub fn is_inactive(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(n) = cursor {
            if self.is_inactive_self(n) {
                return true;
            }
            cursor = self.parent(n);
        }
        false
    }

    pub(crate) fn is_inactive_self(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|node| {
            node.facets().any(|(facet, f)| {
                self.registry
                    .spec(facet)
                    .is_ok_and(|spec| !spec.allows_changes(f))
            })
        })
    }

    /// Facet `facet` of `node`, if the node exists and the facet was created.
    pub fn facet(&self, node: NodeId, facet: FacetId) -> Option<&Facet> {
        self.slot(node).and_then(|n| n.facet(facet))
    }

    /// Return facet `facet` of `node`, creating it on first access.
    pub fn get_or_create_facet(&mut self, node: NodeId, facet: FacetId) -> Result<&Facet> {
        let registry = Arc::clone(&self.registry);
        let facet = self.node_mut(node)?.get_or_create_facet(&registry, facet)?;
        Ok(&*facet)
    }

    /// Remove a detached, parentless node and its whole subtree from the
    /// arena. Its id is never reused.
    pub fn discard(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if id == NodeId::ROOT || node.attached || node.parent.is_some() {
            return Err(StateTreeError::NodeInUse(id));
        }
        let subtree = self.subtree_preorder(id);
        for &nid in &subtree {
            if let Some(node) = self.nodes.get_mut(nid.slot()).and_then(Option::take) {
                if node.reported_attached {
                    self.discarded_attached.insert(nid);
                    self.dirty.insert(nid);
                }
            }
            self.resources.release_node(nid);
        }
        let gone: HashSet<NodeId> = subtree.iter().copied().collect();
        self.executions.retain(|e| !gone.contains(&e.node));
        tracing::debug!(node = id.get(), nodes = subtree.len(), "discarded subtree");
        Ok(())
    }

    pub(crate) fn slot(&self, id: NodeId) -> Option<&StateNode> {
        if id.get() == 0 {
            return None;
        }
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    pub(crate) fn slot_mut(&mut self, id: NodeId) -> Option<&mut StateNode> {
        if id.get() == 0 {
            return None;
        }
        self.nodes.get_mut(id.slot()).and_then(Option::as_mut)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut StateNode> {
        self.slot_mut(id).ok_or(StateTreeError::StaleNode(id))
    }

    /// Ids of `top` and all its descendants, parents before children.
    fn subtree_preorder(&self, top: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            let Some(node) = self.slot(id) else {
                continue;
            };
            out.push(id);
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    // ── Dirty tracking ────────────────────────────────────────────────────

    /// Queue `node` for the next flush. Idempotent.
    pub fn mark_dirty(&mut self, node: NodeId) -> Result<()> {
        self.node(node)?;
        self.dirty.insert(node);
        Ok(())
    }

    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.dirty.contains(&node)
    }

    /// Dirty nodes in discovery order.
    pub fn dirty_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dirty.iter().copied()
    }

    pub(crate) fn touch(&mut self, node: NodeId) {
        self.dirty.insert(node);
    }

    /// Reset the trackers of `node` and seed them with its full content, so
    /// the next flush replays the node from scratch.
    pub fn regenerate(&mut self, node: NodeId) -> Result<()> {
        let strict = self.options.strict_invariants;
        let n = self.node_mut(node)?;
        if let Some((facet, _)) = n.facets().find(|(_, f)| f.has_changes()) {
            if strict {
                return Err(StateTreeError::TrackerNotEmpty { node, facet });
            }
            tracing::warn!(
                node = node.get(),
                facet = facet.get(),
                "discarding pending changes before regenerating"
            );
        }
        n.clear_changes();
        n.generate_changes_from_empty();
        self.dirty.insert(node);
        Ok(())
    }

    /// Make the next flush describe the whole attached tree as if the client
    /// started from nothing: every attached node is re-announced and
    /// replayed.
    ///
    /// Nodes the client no longer needs to hear about, detached or discarded
    /// since the last flush, are forgotten instead of reported.
    pub fn resync(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            if node.id() != NodeId::ROOT {
                node.reported_attached = false;
            }
        }
        self.discarded_attached.clear();
        let order = self.subtree_preorder(NodeId::ROOT);
        for id in order {
            if let Some(node) = self.slot_mut(id) {
                if id == NodeId::ROOT {
                    node.clear_changes();
                    node.generate_changes_from_empty();
                    node.initial_changes = true;
                }
            }
            self.dirty.insert(id);
        }
        self.transmitted.clear();
    }

    // ── Constants ─────────────────────────────────────────────────────────

    /// Intern `payload` in this tree's pool.
    pub fn intern(&mut self, payload: Value) -> ConstantKey {
        self.pool.intern(payload)
    }

    pub fn constant(&self, key: &ConstantKey) -> Option<Arc<Value>> {
        self.pool.get(key)
    }

    /// Whether `key` has been sent to the client by an earlier flush.
    pub fn is_transmitted(&self, key: &ConstantKey) -> bool {
        self.transmitted.contains(key)
    }

    // ── Facet handles ─────────────────────────────────────────────────────

    pub fn map(&mut self, node: NodeId, facet: FacetId) -> Result<MapHandle<'_>> {
        self.prepare_facet(node, facet, false)?;
        Ok(MapHandle::new(self, node, facet))
    }

    pub fn list(&mut self, node: NodeId, facet: FacetId) -> Result<ListHandle<'_>> {
        let spec = self.prepare_facet(node, facet, true)?;
        Ok(ListHandle::new(self, node, facet, spec.name, spec.shape))
    }

    /// Set-like view over a list facet.
    pub fn set(&mut self, node: NodeId, facet: FacetId) -> Result<SetHandle<'_>> {
        Ok(SetHandle::new(self.list(node, facet)?))
    }

    pub fn map_of<T: FacetType>(&mut self, node: NodeId) -> Result<MapHandle<'_>> {
        let id = self.registry.id_of_type::<T>()?;
        self.map(node, id)
    }

    pub fn list_of<T: FacetType>(&mut self, node: NodeId) -> Result<ListHandle<'_>> {
        let id = self.registry.id_of_type::<T>()?;
        self.list(node, id)
    }

    pub fn set_of<T: FacetType>(&mut self, node: NodeId) -> Result<SetHandle<'_>> {
        let id = self.registry.id_of_type::<T>()?;
        self.set(node, id)
    }

    fn prepare_facet(
        &mut self,
        node: NodeId,
        facet: FacetId,
        list: bool,
    ) -> Result<FacetSpec> {
        let spec = *self.registry.spec(facet)?;
        let matches = match spec.shape {
            FacetShape::Map => !list,
            FacetShape::List | FacetShape::NodeList => list,
        };
        if !matches {
            return Err(StateTreeError::ShapeMismatch {
                name: spec.name,
                expected: if list { FacetShape::List } else { FacetShape::Map },
                actual: spec.shape,
            });
        }
        self.get_or_create_facet(node, facet)?;
        Ok(spec)
    }

    pub(crate) fn facet_mut(&mut self, node: NodeId, facet: FacetId) -> Result<&mut Facet> {
        let registry = Arc::clone(&self.registry);
        self.node_mut(node)?.get_or_create_facet(&registry, facet)
    }

    // ── Structure ─────────────────────────────────────────────────────────

    /// Check that `child` may be stored under `parent`.
    pub(crate) fn check_can_adopt(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if child == NodeId::ROOT {
            return Err(StateTreeError::RootHasNoParent);
        }
        let node = self.node(child)?;
        if let Some(existing) = node.parent {
            return Err(StateTreeError::AlreadyHasParent {
                node: child,
                parent: existing,
            });
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(StateTreeError::CyclicParent {
                    node: child,
                    parent,
                });
            }
            cursor = self.parent(id);
        }
        Ok(())
    }

    /// Link `child` below `parent`. The caller has run
    /// [`check_can_adopt`](Self::check_can_adopt).
    pub(crate) fn adopt(&mut self, parent: NodeId, child: NodeId) {
        let parent_attached = self.is_attached(parent);
        if let Some(node) = self.slot_mut(child) {
            node.parent = Some(parent);
        }
        if parent_attached {
            self.attach_subtree(child);
        }
    }

    /// Unlink `child` from its parent.
    pub(crate) fn release(&mut self, child: NodeId) {
        let Some(node) = self.slot_mut(child) else {
            return;
        };
        node.parent = None;
        if node.attached {
            self.detach_subtree(child);
        }
    }

    fn attach_subtree(&mut self, top: NodeId) {
        let order = self.subtree_preorder(top);
        let mut transitions = Vec::with_capacity(order.len());
        for id in order {
            if let Some(node) = self.slot_mut(id) {
                let initial = !node.ever_attached;
                node.attached = true;
                node.ever_attached = true;
                transitions.push((id, initial));
            }
            // Queue after the parent even if edited while detached.
            self.dirty.shift_remove(&id);
            self.dirty.insert(id);
        }
        for (id, initial) in transitions.into_iter().rev() {
            self.fire_attach(id, initial);
        }
    }

    fn detach_subtree(&mut self, top: NodeId) {
        let order = self.subtree_preorder(top);
        for &id in &order {
            if let Some(node) = self.slot_mut(id) {
                node.attached = false;
            }
            self.dirty.insert(id);
        }
        for id in order.into_iter().rev() {
            self.fire_detach(id);
        }
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("nodes", &self.len())
            .field("facet_types", &self.registry.len())
            .field("dirty", &self.dirty.len())
            .field("pending_executions", &self.executions.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// Node values referenced by `values`, rejecting a node listed twice.
pub(crate) fn node_values(values: &[FacetValue], parent: NodeId) -> Result<Vec<NodeId>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if let FacetValue::Node(id) = value {
            if !seen.insert(*id) {
                return Err(StateTreeError::AlreadyHasParent { node: *id, parent });
            }
            out.push(*id);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (StateTree, FacetId) {
        let registry = FacetRegistry::bootstrap([FacetSpec::node_list("children")]).unwrap();
        (StateTree::new(registry), FacetId(0))
    }

    #[test]
    fn tree_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StateTree>();
    }

    #[test]
    fn preorder_lists_parents_before_children() {
        let (mut tree, children) = fixture();
        let a = tree.create_node();
        let b = tree.create_node();
        let c = tree.create_node();
        tree.list(NodeId::ROOT, children).unwrap().add(a).unwrap();
        tree.list(a, children).unwrap().add(b).unwrap();
        tree.list(NodeId::ROOT, children).unwrap().add(c).unwrap();
        assert_eq!(tree.subtree_preorder(NodeId::ROOT), vec![NodeId::ROOT, a, b, c]);
    }

    #[test]
    fn attach_queues_subtree_after_its_parent() {
        let (mut tree, children) = fixture();
        let a = tree.create_node();
        let b = tree.create_node();
        tree.list(a, children).unwrap().add(b).unwrap();
        tree.mark_dirty(b).unwrap();
        tree.list(NodeId::ROOT, children).unwrap().add(a).unwrap();
        assert_eq!(tree.dirty_nodes().collect::<Vec<_>>(), vec![NodeId::ROOT, a, b]);
    }

    #[test]
    fn zero_id_is_never_a_node() {
        let (tree, _) = fixture();
        assert!(!tree.contains(NodeId(0)));
        assert_eq!(tree.node(NodeId(0)).unwrap_err(), StateTreeError::StaleNode(NodeId(0)));
    }
}
