//! Tree nodes and their sparse facet slots.

use std::fmt;

use crate::error::{Result, StateTreeError};
use crate::facet::Facet;
use crate::registry::FacetRegistry;
use crate::tree::StateTree;
use crate::value::{FacetId, NodeId};

/// Handle returned when adding a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

pub(crate) type Listener = Box<dyn FnMut(&mut StateTree, NodeId) + Send>;

pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) once: bool,
    pub(crate) callback: Listener,
}

/// A node of a [`StateTree`].
///
/// Facets are created on first access and kept for the node's lifetime,
/// including while it is detached.
pub struct StateNode {
    id: NodeId,
    pub(crate) parent: Option<NodeId>,
    facets: Vec<Option<Facet>>,
    pub(crate) attached: bool,
    /// Attached state as of the last flush that visited this node.
    pub(crate) reported_attached: bool,
    pub(crate) ever_attached: bool,
    /// No flush has collected this node's facets since it was last attached.
    pub(crate) initial_changes: bool,
    pub(crate) attach_listeners: Vec<ListenerEntry>,
    pub(crate) detach_listeners: Vec<ListenerEntry>,
}

impl StateNode {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            facets: Vec::new(),
            attached: false,
            reported_attached: false,
            ever_attached: false,
            initial_changes: true,
            attach_listeners: Vec::new(),
            detach_listeners: Vec::new(),
        }
    }

    pub(crate) fn new_root() -> Self {
        Self {
            attached: true,
            reported_attached: true,
            ever_attached: true,
            ..Self::new(NodeId::ROOT)
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn has_facet(&self, id: FacetId) -> bool {
        self.facet(id).is_some()
    }

    /// The facet `id`, if it has been created.
    pub fn facet(&self, id: FacetId) -> Option<&Facet> {
        self.facets.get(id.index()).and_then(Option::as_ref)
    }

    /// Created facets in id order.
    pub fn facets(&self) -> impl Iterator<Item = (FacetId, &Facet)> {
        self.facets
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|f| (FacetId(i as u16), f)))
    }

    pub(crate) fn facets_mut(&mut self) -> impl Iterator<Item = (FacetId, &mut Facet)> {
        self.facets
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|f| (FacetId(i as u16), f)))
    }

    pub(crate) fn facet_ids(&self) -> Vec<FacetId> {
        self.facets().map(|(id, _)| id).collect()
    }

    /// Return facet `id`, creating it through the registry on first access.
    pub(crate) fn get_or_create_facet(
        &mut self,
        registry: &FacetRegistry,
        id: FacetId,
    ) -> Result<&mut Facet> {
        if id.index() >= self.facets.len() {
            // Validate before growing so an unknown id leaves the node as is.
            registry.spec(id)?;
            self.facets.resize_with(id.index() + 1, || None);
        }
        if self.facets[id.index()].is_none() {
            let facet = registry.create(id, self.id)?;
            tracing::trace!(node = self.id.get(), facet = id.get(), "created facet");
            self.facets[id.index()] = Some(facet);
        }
        self.facets[id.index()]
            .as_mut()
            .ok_or(StateTreeError::UnknownFacetId(id))
    }

    pub fn for_each_child(&self, mut f: impl FnMut(NodeId)) {
        for (_, facet) in self.facets() {
            facet.for_each_child(&mut f);
        }
    }

    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.for_each_child(|c| out.push(c));
        out
    }

    pub fn has_changes(&self) -> bool {
        self.facets().any(|(_, f)| f.has_changes())
    }

    pub(crate) fn clear_changes(&mut self) {
        for (_, facet) in self.facets_mut() {
            facet.clear_changes();
        }
    }

    pub(crate) fn generate_changes_from_empty(&mut self) {
        for (_, facet) in self.facets_mut() {
            facet.generate_changes_from_empty();
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("attached", &self.attached)
            .field("facets", &self.facet_ids())
            .field("attach_listeners", &self.attach_listeners.len())
            .field("detach_listeners", &self.detach_listeners.len())
            .finish()
    }
}
