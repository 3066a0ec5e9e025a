//! Ordered facet recording an append-only splice log.

use crate::diff::FacetDiff;
use crate::error::{Result, StateTreeError};
use crate::value::{FacetValue, NodeId};

#[derive(Debug, Clone, PartialEq)]
struct Splice {
    index: usize,
    remove: usize,
    items: Vec<FacetValue>,
}

/// List-shaped facet.
///
/// Every structural mutation appends one splice to the tracker. Splices are
/// neither merged nor rewritten: each record's index refers to the list as
/// left by the records before it, so replaying the log in order against the
/// list as it was at the last flush yields the current content.
#[derive(Debug, Clone, Default)]
pub struct ListFacet {
    items: Vec<FacetValue>,
    holds_nodes: bool,
    tracker: Option<Vec<Splice>>,
}

impl ListFacet {
    /// A list of plain values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A list of child nodes. Nodes spliced out of it are detached by the
    /// owning tree.
    pub fn node_list() -> Self {
        Self {
            holds_nodes: true,
            ..Self::default()
        }
    }

    pub fn holds_nodes(&self) -> bool {
        self.holds_nodes
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FacetValue> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FacetValue> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[FacetValue] {
        &self.items
    }

    /// Linear search; lists are expected to stay small.
    pub fn index_of(&self, item: &FacetValue) -> Option<usize> {
        self.items.iter().position(|v| v == item)
    }

    pub fn contains(&self, item: &FacetValue) -> bool {
        self.index_of(item).is_some()
    }

    pub fn for_each_child(&self, mut f: impl FnMut(NodeId)) {
        for item in &self.items {
            if let FacetValue::Node(id) = item {
                f(*id);
            }
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Append `item`.
    pub fn add(&mut self, item: FacetValue) {
        let index = self.items.len();
        self.items.push(item.clone());
        self.record(index, 0, vec![item]);
    }

    /// Insert `item` before position `index` (`index == len` appends).
    pub fn insert(&mut self, index: usize, item: FacetValue) -> Result<()> {
        self.insert_all(index, vec![item])
    }

    /// Insert all `items` before position `index` as a single splice.
    pub fn insert_all(&mut self, index: usize, items: Vec<FacetValue>) -> Result<()> {
        if index > self.items.len() {
            return Err(StateTreeError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        if items.is_empty() {
            return Ok(());
        }
        self.items.splice(index..index, items.iter().cloned());
        self.record(index, 0, items);
        Ok(())
    }

    /// Remove and return the element at `index`.
    pub fn remove(&mut self, index: usize) -> Result<FacetValue> {
        if index >= self.items.len() {
            return Err(StateTreeError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        let removed = self.items.remove(index);
        self.record(index, 1, Vec::new());
        Ok(removed)
    }

    /// Replace the element at `index`, recorded as a remove followed by an
    /// insert. Returns the replaced element.
    pub fn set(&mut self, index: usize, item: FacetValue) -> Result<FacetValue> {
        let old = self.remove(index)?;
        self.items.insert(index, item.clone());
        self.record(index, 0, vec![item]);
        Ok(old)
    }

    /// Remove every element one at a time from the tail. Returns the removed
    /// elements in removal order.
    pub fn clear(&mut self) -> Vec<FacetValue> {
        let mut removed = Vec::with_capacity(self.items.len());
        while let Some(item) = self.items.pop() {
            let index = self.items.len();
            self.record(index, 1, Vec::new());
            removed.push(item);
        }
        removed
    }

    /// Keep only elements for which `keep` returns `true`, recording one
    /// removal per dropped element. Returns the dropped elements.
    pub fn retain(&mut self, mut keep: impl FnMut(&FacetValue) -> bool) -> Vec<FacetValue> {
        let mut removed = Vec::new();
        let mut cursor = self.cursor();
        while let Some(item) = cursor.next() {
            if !keep(item) {
                if let Some(item) = cursor.remove() {
                    removed.push(item);
                }
            }
        }
        removed
    }

    /// Cursor allowing removal of elements while iterating.
    pub fn cursor(&mut self) -> ListCursor<'_> {
        ListCursor {
            list: self,
            next: 0,
            current: None,
        }
    }

    fn record(&mut self, index: usize, remove: usize, items: Vec<FacetValue>) {
        self.tracker.get_or_insert_with(Vec::new).push(Splice {
            index,
            remove,
            items,
        });
    }

    // ── Change tracking ───────────────────────────────────────────────────

    pub fn has_changes(&self) -> bool {
        self.tracker.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Recorded splices of the current window, without resetting the tracker.
    pub fn changes(&self) -> Vec<FacetDiff> {
        self.tracker
            .iter()
            .flatten()
            .map(|s| FacetDiff::Splice {
                index: s.index,
                remove: s.remove,
                items: s.items.clone(),
            })
            .collect()
    }

    /// Emit the recorded splices in order and reset the tracker.
    pub fn collect_changes(&mut self, mut emit: impl FnMut(FacetDiff)) {
        let Some(tracker) = self.tracker.take() else {
            return;
        };
        for s in tracker {
            emit(FacetDiff::Splice {
                index: s.index,
                remove: s.remove,
                items: s.items,
            });
        }
    }

    pub fn clear_changes(&mut self) {
        self.tracker = None;
    }

    /// Seed the tracker with one splice inserting the whole current content.
    pub fn generate_changes_from_empty(&mut self) {
        debug_assert!(
            !self.has_changes(),
            "generate_changes_from_empty called with pending changes"
        );
        self.tracker = None;
        if !self.items.is_empty() {
            let items = self.items.clone();
            self.record(0, 0, items);
        }
    }
}

/// Iteration over a [`ListFacet`] that supports removing the element most
/// recently returned by [`next`](ListCursor::next).
#[derive(Debug)]
pub struct ListCursor<'a> {
    list: &'a mut ListFacet,
    next: usize,
    current: Option<usize>,
}

impl ListCursor<'_> {
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&FacetValue> {
        let index = self.next;
        let item = self.list.items.get(index)?;
        self.current = Some(index);
        self.next = index + 1;
        Some(item)
    }

    /// Remove the element last returned by `next`. Returns `None` if there is
    /// no such element or it was already removed.
    pub fn remove(&mut self) -> Option<FacetValue> {
        let index = self.current.take()?;
        let removed = self.list.remove(index).ok()?;
        self.next = index;
        Some(removed)
    }
}

/// Apply splice diffs in order to `target`. Used to rebuild a mirror.
pub fn apply_splices<'a>(
    target: &mut Vec<FacetValue>,
    diffs: impl IntoIterator<Item = &'a FacetDiff>,
) -> Result<()> {
    for diff in diffs {
        if let FacetDiff::Splice {
            index,
            remove,
            items,
        } = diff
        {
            let end = index + remove;
            if end > target.len() {
                return Err(StateTreeError::IndexOutOfBounds {
                    index: end,
                    len: target.len(),
                });
            }
            target.splice(*index..end, items.iter().cloned());
        }
    }
    Ok(())
}
