//! Attach and detach listeners.

use std::sync::Arc;

use crate::error::Result;
use crate::node::{Listener, ListenerEntry, ListenerId, StateNode};
use crate::value::NodeId;

use super::StateTree;

impl StateTree {
    pub fn add_attach_listener(
        &mut self,
        node: NodeId,
        listener: impl FnMut(&mut StateTree, NodeId) + Send + 'static,
    ) -> Result<ListenerId> {
        self.push_listener(node, true, false, Box::new(listener))
    }

    /// Attach listener removed after its first call.
    pub fn add_attach_listener_once(
        &mut self,
        node: NodeId,
        listener: impl FnOnce(&mut StateTree, NodeId) + Send + 'static,
    ) -> Result<ListenerId> {
        let mut slot = Some(listener);
        self.push_listener(
            node,
            true,
            true,
            Box::new(move |tree, id| {
                if let Some(f) = slot.take() {
                    f(tree, id);
                }
            }),
        )
    }

    pub fn add_detach_listener(
        &mut self,
        node: NodeId,
        listener: impl FnMut(&mut StateTree, NodeId) + Send + 'static,
    ) -> Result<ListenerId> {
        self.push_listener(node, false, false, Box::new(listener))
    }

    pub fn add_detach_listener_once(
        &mut self,
        node: NodeId,
        listener: impl FnOnce(&mut StateTree, NodeId) + Send + 'static,
    ) -> Result<ListenerId> {
        let mut slot = Some(listener);
        self.push_listener(
            node,
            false,
            true,
            Box::new(move |tree, id| {
                if let Some(f) = slot.take() {
                    f(tree, id);
                }
            }),
        )
    }

    /// Remove a listener. Returns `false` if it is unknown or already gone.
    pub fn remove_listener(&mut self, node: NodeId, listener: ListenerId) -> bool {
        if let Some(n) = self.slot_mut(node) {
            for list in [&mut n.attach_listeners, &mut n.detach_listeners] {
                if let Some(pos) = list.iter().position(|e| e.id == listener) {
                    list.remove(pos);
                    return true;
                }
            }
        }
        if self.firing.contains(&listener) {
            return self.cancelled_listeners.insert(listener);
        }
        false
    }

    /// Run `action` now if `node` is attached, otherwise on its next attach.
    pub fn run_when_attached(
        &mut self,
        node: NodeId,
        action: impl FnOnce(&mut StateTree, NodeId) + Send + 'static,
    ) -> Result<()> {
        if self.node(node)?.attached {
            action(self, node);
        } else {
            self.add_attach_listener_once(node, action)?;
        }
        Ok(())
    }

    fn push_listener(
        &mut self,
        node: NodeId,
        attach: bool,
        once: bool,
        callback: Listener,
    ) -> Result<ListenerId> {
        let id = ListenerId(self.next_listener);
        let n = self.node_mut(node)?;
        let entry = ListenerEntry { id, once, callback };
        if attach {
            n.attach_listeners.push(entry);
        } else {
            n.detach_listeners.push(entry);
        }
        self.next_listener += 1;
        Ok(id)
    }

    pub(super) fn fire_attach(&mut self, id: NodeId, initial: bool) {
        if !self.is_attached(id) {
            return;
        }
        tracing::trace!(node = id.get(), initial, "node attached");
        self.fire_listeners(id, true);
        if !self.is_attached(id) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        for facet in self.slot(id).map(StateNode::facet_ids).unwrap_or_default() {
            if let Some(hook) = registry.spec(facet).ok().and_then(|s| s.attach_hook()) {
                hook(self, id, initial);
            }
        }
    }

    pub(super) fn fire_detach(&mut self, id: NodeId) {
        if self.is_attached(id) || !self.contains(id) {
            return;
        }
        tracing::trace!(node = id.get(), "node detached");
        self.fire_listeners(id, false);
        let registry = Arc::clone(&self.registry);
        for facet in self.slot(id).map(StateNode::facet_ids).unwrap_or_default() {
            if let Some(hook) = registry.spec(facet).ok().and_then(|s| s.detach_hook()) {
                hook(self, id);
            }
        }
    }

    /// Call the attach or detach listeners of `id` in registration order.
    /// Listeners may freely mutate the tree, including adding and removing
    /// listeners on this node.
    ///
    /// If a listener makes the same transition happen again, the listeners
    /// run once more after the current round instead of being skipped.
    fn fire_listeners(&mut self, id: NodeId, attach: bool) {
        let transition = (id, attach);
        if !self.firing_transitions.insert(transition) {
            self.refire.insert(transition);
            return;
        }
        loop {
            self.fire_listener_round(id, attach);
            if !self.refire.remove(&transition) || self.is_attached(id) != attach {
                break;
            }
        }
        self.firing_transitions.remove(&transition);
    }

    fn fire_listener_round(&mut self, id: NodeId, attach: bool) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        let mut taken = std::mem::take(if attach {
            &mut node.attach_listeners
        } else {
            &mut node.detach_listeners
        });
        if taken.is_empty() {
            return;
        }
        self.firing.extend(taken.iter().map(|e| e.id));

        for entry in taken.iter_mut() {
            if self.cancelled_listeners.contains(&entry.id) {
                continue;
            }
            (entry.callback)(self, id);
        }

        let mut keep = Vec::with_capacity(taken.len());
        for entry in taken {
            self.firing.remove(&entry.id);
            let cancelled = self.cancelled_listeners.remove(&entry.id);
            if !entry.once && !cancelled {
                keep.push(entry);
            }
        }

        if let Some(node) = self.slot_mut(id) {
            let list = if attach {
                &mut node.attach_listeners
            } else {
                &mut node.detach_listeners
            };
            // Listeners added while firing go after the surviving ones.
            keep.append(list);
            *list = keep;
        }
    }
}
