//! Key → value facet with first-touch change tracking.

use indexmap::IndexMap;

use crate::diff::FacetDiff;
use crate::value::{FacetValue, NodeId};

/// What a key held when it was first touched in the current flush window.
#[derive(Debug, Clone, PartialEq)]
enum Prior {
    Removed,
    Value(FacetValue),
}

/// Map-shaped facet.
///
/// Each key touched since the last flush remembers the value it had before
/// the first touch. At collection time that prior value is compared against
/// the live value, so a put followed by a remove of a previously absent key
/// emits nothing, and any number of puts emit a single diff.
#[derive(Debug, Clone, Default)]
pub struct MapFacet {
    values: IndexMap<String, FacetValue>,
    tracker: Option<IndexMap<String, Prior>>,
}

impl MapFacet {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Current value of `key`.
    ///
    /// Reads are not tracked yet; a dependency-tracking layer may hook in
    /// here later without changing callers.
    pub fn get(&self, key: &str) -> Option<&FacetValue> {
        self.values.get(key)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a FacetValue) -> &'a FacetValue {
        self.values.get(key).unwrap_or(default)
    }

    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
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

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FacetValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Child nodes referenced by values of this map.
    pub fn for_each_child(&self, mut f: impl FnMut(NodeId)) {
        for value in self.values.values() {
            if let FacetValue::Node(id) = value {
                f(*id);
            }
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Store `value` under `key`, recording the change. Returns the
    /// previous value.
    pub fn put(&mut self, key: impl Into<String>, value: FacetValue) -> Option<FacetValue> {
        let key = key.into();
        self.set_changed(&key);
        self.values.insert(key, value)
    }

    /// Store `value` without recording a change. The value still shows up in
    /// [`generate_changes_from_empty`](Self::generate_changes_from_empty).
    pub fn put_untracked(&mut self, key: impl Into<String>, value: FacetValue) -> Option<FacetValue> {
        self.values.insert(key.into(), value)
    }

    /// Remove `key`, recording the change. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> Option<FacetValue> {
        if !self.values.contains_key(key) {
            return None;
        }
        self.set_changed(key);
        self.values.shift_remove(key)
    }

    /// Remove every key. Returns the removed values in storage order.
    pub fn clear(&mut self) -> Vec<FacetValue> {
        let keys: Vec<String> = self.values.keys().cloned().collect();
        for key in &keys {
            self.set_changed(key);
        }
        self.values.drain(..).map(|(_, v)| v).collect()
    }

    /// Record that `key` is about to change. Only the first call per key and
    /// flush window has an effect.
    pub fn set_changed(&mut self, key: &str) {
        let tracker = self.tracker.get_or_insert_with(IndexMap::new);
        if tracker.contains_key(key) {
            return;
        }
        let prior = match self.values.get(key) {
            Some(value) => Prior::Value(value.clone()),
            None => Prior::Removed,
        };
        tracker.insert(key.to_owned(), prior);
    }

    // ── Change tracking ───────────────────────────────────────────────────

    /// `true` if any key was touched since the last collection.
    pub fn has_changes(&self) -> bool {
        self.tracker.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Net diffs of the current window, without resetting the tracker.
    pub fn changes(&self) -> Vec<FacetDiff> {
        let mut out = Vec::new();
        if let Some(tracker) = &self.tracker {
            for (key, prior) in tracker {
                if let Some(diff) = self.diff_for(key, prior) {
                    out.push(diff);
                }
            }
        }
        out
    }

    /// Emit the net diffs of the current window and reset the tracker.
    pub fn collect_changes(&mut self, mut emit: impl FnMut(FacetDiff)) {
        let Some(tracker) = self.tracker.take() else {
            return;
        };
        for (key, prior) in &tracker {
            if let Some(diff) = self.diff_for(key, prior) {
                emit(diff);
            }
        }
    }

    pub fn clear_changes(&mut self) {
        self.tracker = None;
    }

    /// Seed the tracker so the next collection emits a put for every live
    /// key, as if the map had been built up from nothing.
    pub fn generate_changes_from_empty(&mut self) {
        debug_assert!(
            !self.has_changes(),
            "generate_changes_from_empty called with pending changes"
        );
        let tracker = self
            .values
            .keys()
            .map(|k| (k.clone(), Prior::Removed))
            .collect();
        self.tracker = Some(tracker);
    }

    fn diff_for(&self, key: &str, prior: &Prior) -> Option<FacetDiff> {
        match (prior, self.values.get(key)) {
            (Prior::Value(_), None) => Some(FacetDiff::Remove {
                key: key.to_owned(),
            }),
            (Prior::Removed, Some(current)) => Some(FacetDiff::Put {
                key: key.to_owned(),
                value: current.clone(),
            }),
            (Prior::Value(previous), Some(current)) if previous != current => Some(FacetDiff::Put {
                key: key.to_owned(),
                value: current.clone(),
            }),
            _ => None,
        }
    }
}
