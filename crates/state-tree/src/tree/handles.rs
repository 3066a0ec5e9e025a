//! Mutable views of one facet of one node.
//!
//! A handle borrows the whole tree, so structural side effects of a write
//! (linking a child, attach and detach listeners) run before the write
//! returns. Every write queues the node as dirty.

use crate::error::{Result, StateTreeError};
use crate::facet::{Facet, ListFacet, MapFacet};
use crate::registry::FacetShape;
use crate::value::{FacetId, FacetValue, NodeId};

use super::{node_values, StateTree};

// ── Map ───────────────────────────────────────────────────────────────────

/// Handle to a map facet.
pub struct MapHandle<'a> {
    tree: &'a mut StateTree,
    node: NodeId,
    facet: FacetId,
}

impl<'a> MapHandle<'a> {
    pub(super) fn new(tree: &'a mut StateTree, node: NodeId, facet: FacetId) -> Self {
        Self { tree, node, facet }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn map(&self) -> Option<&MapFacet> {
        self.tree.facet(self.node, self.facet).and_then(Facet::as_map)
    }

    fn map_mut(&mut self) -> Result<&mut MapFacet> {
        let (node, facet) = (self.node, self.facet);
        self.tree
            .facet_mut(node, facet)?
            .as_map_mut()
            .ok_or(StateTreeError::StaleNode(node))
    }

    pub fn len(&self) -> usize {
        self.map().map_or(0, MapFacet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map().is_some_and(|m| m.contains(key))
    }

    pub fn get(&self, key: &str) -> Option<&FacetValue> {
        self.map().and_then(|m| m.get(key))
    }

    pub fn get_str_or<'b>(&'b self, key: &str, default: &'b str) -> &'b str {
        self.get(key).and_then(FacetValue::as_str).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(FacetValue::as_bool).unwrap_or(default)
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(FacetValue::as_i64).unwrap_or(default)
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(FacetValue::as_f64).unwrap_or(default)
    }

    pub fn keys(&self) -> Vec<String> {
        self.map()
            .map(|m| m.keys().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Store `value` under `key`, returning the previous value.
    ///
    /// A node value links the node as a child; a replaced node value is
    /// unlinked.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FacetValue>,
    ) -> Result<Option<FacetValue>> {
        self.write(key.into(), value.into(), true)
    }

    /// Like [`put`](Self::put) without recording a change for the client.
    pub fn put_untracked(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FacetValue>,
    ) -> Result<Option<FacetValue>> {
        self.write(key.into(), value.into(), false)
    }

    fn write(&mut self, key: String, value: FacetValue, tracked: bool) -> Result<Option<FacetValue>> {
        let unchanged = self.get(&key) == Some(&value);
        if !unchanged {
            if let FacetValue::Node(child) = value {
                self.tree.check_can_adopt(self.node, child)?;
            }
        }
        let adopted = value.as_node();
        let map = self.map_mut()?;
        let previous = if tracked {
            map.put(key, value)
        } else {
            map.put_untracked(key, value)
        };
        self.tree.touch(self.node);
        if !unchanged {
            if let Some(FacetValue::Node(old)) = &previous {
                self.tree.release(*old);
            }
            if let Some(child) = adopted {
                self.tree.adopt(self.node, child);
            }
        }
        Ok(previous)
    }

    /// Remove `key`. Removing an absent key records nothing.
    pub fn remove(&mut self, key: &str) -> Result<Option<FacetValue>> {
        let removed = self.map_mut()?.remove(key);
        if let Some(value) = &removed {
            self.tree.touch(self.node);
            if let FacetValue::Node(child) = value {
                self.tree.release(*child);
            }
        }
        Ok(removed)
    }

    /// Remove every key, returning the removed values.
    pub fn clear(&mut self) -> Result<Vec<FacetValue>> {
        let removed = self.map_mut()?.clear();
        if !removed.is_empty() {
            self.tree.touch(self.node);
        }
        for value in &removed {
            if let FacetValue::Node(child) = value {
                self.tree.release(*child);
            }
        }
        Ok(removed)
    }
}

// ── List ──────────────────────────────────────────────────────────────────

/// Handle to a list facet.
pub struct ListHandle<'a> {
    tree: &'a mut StateTree,
    node: NodeId,
    facet: FacetId,
    name: &'static str,
    shape: FacetShape,
}

impl<'a> ListHandle<'a> {
    pub(super) fn new(
        tree: &'a mut StateTree,
        node: NodeId,
        facet: FacetId,
        name: &'static str,
        shape: FacetShape,
    ) -> Self {
        Self {
            tree,
            node,
            facet,
            name,
            shape,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn shape(&self) -> FacetShape {
        self.shape
    }

    fn list(&self) -> Option<&ListFacet> {
        self.tree.facet(self.node, self.facet).and_then(Facet::as_list)
    }

    fn list_mut(&mut self) -> Result<&mut ListFacet> {
        let (node, facet) = (self.node, self.facet);
        self.tree
            .facet_mut(node, facet)?
            .as_list_mut()
            .ok_or(StateTreeError::StaleNode(node))
    }

    pub fn len(&self) -> usize {
        self.list().map_or(0, ListFacet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&FacetValue> {
        self.list().and_then(|l| l.get(index))
    }

    pub fn index_of(&self, item: &FacetValue) -> Option<usize> {
        self.list().and_then(|l| l.index_of(item))
    }

    pub fn contains(&self, item: &FacetValue) -> bool {
        self.index_of(item).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FacetValue> {
        self.list().map(ListFacet::as_slice).unwrap_or(&[]).iter()
    }

    pub fn to_vec(&self) -> Vec<FacetValue> {
        self.iter().cloned().collect()
    }

    /// Validate `items` for insertion, returning the nodes they link.
    fn check_items(&self, items: &[FacetValue]) -> Result<Vec<NodeId>> {
        for item in items {
            match (self.shape, item) {
                (FacetShape::NodeList, FacetValue::Node(_)) => {}
                (FacetShape::NodeList, _) => return Err(StateTreeError::NotANodeValue(self.name)),
                (_, FacetValue::Node(_)) => {
                    return Err(StateTreeError::NodeValueInPlainList(self.name))
                }
                _ => {}
            }
        }
        let children = node_values(items, self.node)?;
        for &child in &children {
            self.tree.check_can_adopt(self.node, child)?;
        }
        Ok(children)
    }

    fn adopt_all(&mut self, children: Vec<NodeId>) {
        for child in children {
            self.tree.adopt(self.node, child);
        }
    }

    fn release_all(&mut self, removed: &[FacetValue]) {
        for value in removed {
            if let FacetValue::Node(child) = value {
                self.tree.release(*child);
            }
        }
    }

    pub fn add(&mut self, item: impl Into<FacetValue>) -> Result<()> {
        let item = item.into();
        let children = self.check_items(std::slice::from_ref(&item))?;
        self.list_mut()?.add(item);
        self.tree.touch(self.node);
        self.adopt_all(children);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, item: impl Into<FacetValue>) -> Result<()> {
        self.insert_all(index, vec![item.into()])
    }

    /// Insert `items` before `index` as one splice.
    pub fn insert_all(&mut self, index: usize, items: Vec<FacetValue>) -> Result<()> {
        let children = self.check_items(&items)?;
        self.list_mut()?.insert_all(index, items)?;
        self.tree.touch(self.node);
        self.adopt_all(children);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<FacetValue> {
        let removed = self.list_mut()?.remove(index)?;
        self.tree.touch(self.node);
        self.release_all(std::slice::from_ref(&removed));
        Ok(removed)
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&mut self, index: usize, item: impl Into<FacetValue>) -> Result<FacetValue> {
        let item = item.into();
        let unchanged = self.get(index) == Some(&item);
        let children = if unchanged {
            Vec::new()
        } else {
            self.check_items(std::slice::from_ref(&item))?
        };
        let old = self.list_mut()?.set(index, item)?;
        self.tree.touch(self.node);
        if !unchanged {
            self.release_all(std::slice::from_ref(&old));
            self.adopt_all(children);
        }
        Ok(old)
    }

    /// Remove every element, returning them in removal order.
    pub fn clear(&mut self) -> Result<Vec<FacetValue>> {
        let removed = self.list_mut()?.clear();
        if !removed.is_empty() {
            self.tree.touch(self.node);
        }
        self.release_all(&removed);
        Ok(removed)
    }

    /// Keep only elements matching `keep`, returning the dropped ones.
    pub fn retain(&mut self, keep: impl FnMut(&FacetValue) -> bool) -> Result<Vec<FacetValue>> {
        let removed = self.list_mut()?.retain(keep);
        if !removed.is_empty() {
            self.tree.touch(self.node);
        }
        self.release_all(&removed);
        Ok(removed)
    }
}

// ── Set ───────────────────────────────────────────────────────────────────

/// Set semantics over a list facet. Elements keep insertion order and diffs
/// are the list's splices.
pub struct SetHandle<'a> {
    list: ListHandle<'a>,
}

impl<'a> SetHandle<'a> {
    pub(super) fn new(list: ListHandle<'a>) -> Self {
        Self { list }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, item: &FacetValue) -> bool {
        self.list.contains(item)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FacetValue> {
        self.list.iter()
    }

    /// Add `item` unless present. Returns whether it was added.
    pub fn add(&mut self, item: impl Into<FacetValue>) -> Result<bool> {
        let item = item.into();
        if self.list.contains(&item) {
            return Ok(false);
        }
        self.list.add(item)?;
        Ok(true)
    }

    /// Remove `item` if present. Returns whether it was removed.
    pub fn remove(&mut self, item: &FacetValue) -> Result<bool> {
        match self.list.index_of(item) {
            Some(index) => {
                self.list.remove(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) -> Result<Vec<FacetValue>> {
        self.list.clear()
    }
}
