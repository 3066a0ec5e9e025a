//! Externally addressable resources owned by nodes.
//!
//! A binding gives a node a named resource handle that outside code (a
//! transport, a download endpoint) can resolve back to the node. The handle
//! exists only while the node is attached. Every attach mints a new handle,
//! so a handle seen before a detach never resolves again.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Result;
use crate::node::ListenerId;
use crate::tree::StateTree;
use crate::value::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Live resource handles of one tree.
#[derive(Debug, Default)]
pub struct ResourceTable {
    next: u64,
    live: IndexMap<HandleId, (NodeId, String)>,
    by_owner: HashMap<(NodeId, String), HandleId>,
}

impl ResourceTable {
    pub fn handle_of(&self, node: NodeId, name: &str) -> Option<HandleId> {
        self.by_owner.get(&(node, name.to_owned())).copied()
    }

    /// Owner node and resource name of a live handle.
    pub fn resolve(&self, handle: HandleId) -> Option<(NodeId, &str)> {
        self.live
            .get(&handle)
            .map(|(node, name)| (*node, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live handles in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (HandleId, NodeId, &str)> {
        self.live
            .iter()
            .map(|(handle, (node, name))| (*handle, *node, name.as_str()))
    }

    pub(crate) fn register(&mut self, node: NodeId, name: &str) -> HandleId {
        if let Some(existing) = self.handle_of(node, name) {
            return existing;
        }
        self.next += 1;
        let handle = HandleId(self.next);
        self.live.insert(handle, (node, name.to_owned()));
        self.by_owner.insert((node, name.to_owned()), handle);
        tracing::trace!(node = node.get(), name, handle = handle.0, "registered resource");
        handle
    }

    pub(crate) fn unregister(&mut self, node: NodeId, name: &str) -> Option<HandleId> {
        let handle = self.by_owner.remove(&(node, name.to_owned()))?;
        self.live.shift_remove(&handle);
        tracing::trace!(node = node.get(), name, handle = handle.0, "unregistered resource");
        Some(handle)
    }

    /// Drop every handle owned by `node`.
    pub(crate) fn release_node(&mut self, node: NodeId) {
        self.live.retain(|_, (owner, _)| *owner != node);
        self.by_owner.retain(|(owner, _), _| *owner != node);
    }
}

/// A resource bound with [`StateTree::bind_resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub node: NodeId,
    pub name: String,
    on_attach: ListenerId,
    on_detach: ListenerId,
}

impl StateTree {
    /// Bind resource `name` to `node`. The handle is registered whenever the
    /// node is attached, starting now if it already is.
    ///
    /// Binding the same name twice on one node shares a single handle.
    pub fn bind_resource(&mut self, node: NodeId, name: impl Into<String>) -> Result<ResourceBinding> {
        let name = name.into();
        self.node(node)?;

        let attach_name = name.clone();
        let on_attach = self.add_attach_listener(node, move |tree, id| {
            tree.resources.register(id, &attach_name);
        })?;
        let detach_name = name.clone();
        let on_detach = self.add_detach_listener(node, move |tree, id| {
            tree.resources.unregister(id, &detach_name);
        })?;

        if self.is_attached(node) {
            self.resources.register(node, &name);
        }
        Ok(ResourceBinding {
            node,
            name,
            on_attach,
            on_detach,
        })
    }

    /// Remove a binding and its live handle. Returns whether a handle was
    /// live.
    pub fn unbind_resource(&mut self, binding: &ResourceBinding) -> bool {
        self.remove_listener(binding.node, binding.on_attach);
        self.remove_listener(binding.node, binding.on_detach);
        self.resources.unregister(binding.node, &binding.name).is_some()
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_per_owner() {
        let mut table = ResourceTable::default();
        let a = table.register(NodeId(2), "download");
        assert_eq!(table.register(NodeId(2), "download"), a);
        let b = table.register(NodeId(2), "upload");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(b), Some((NodeId(2), "upload")));
    }

    #[test]
    fn unregister_forgets_the_handle() {
        let mut table = ResourceTable::default();
        let handle = table.register(NodeId(3), "icon");
        assert_eq!(table.unregister(NodeId(3), "icon"), Some(handle));
        assert_eq!(table.resolve(handle), None);
        assert_eq!(table.handle_of(NodeId(3), "icon"), None);
        assert_eq!(table.unregister(NodeId(3), "icon"), None);
    }

    #[test]
    fn handles_are_never_reused() {
        let mut table = ResourceTable::default();
        let first = table.register(NodeId(4), "r");
        table.unregister(NodeId(4), "r");
        let second = table.register(NodeId(4), "r");
        assert!(second > first);
    }

    #[test]
    fn release_node_drops_all_its_handles() {
        let mut table = ResourceTable::default();
        table.register(NodeId(5), "a");
        table.register(NodeId(5), "b");
        let kept = table.register(NodeId(6), "a");
        table.release_node(NodeId(5));
        assert_eq!(table.iter().map(|(h, _, _)| h).collect::<Vec<_>>(), vec![kept]);
    }
}
