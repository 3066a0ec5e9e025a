//! Content-addressed constant pool.
//!
//! Large immutable payloads are interned once and referenced from facets by
//! [`ConstantKey`]. Keys are derived from canonical content, so equal
//! payloads share a key no matter where they were built. A tree transmits
//! each referenced constant once, ahead of the first diff that uses it.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use state_tree_util::content_key;

use crate::value::ConstantKey;

/// Pool of interned payloads.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: IndexMap<ConstantKey, Arc<Value>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `payload`, returning its key. A new entry is created only for
    /// content not seen before.
    pub fn intern(&mut self, payload: Value) -> ConstantKey {
        let key = ConstantKey::new(content_key(&payload));
        if !self.entries.contains_key(&key) {
            tracing::trace!(key = key.as_str(), "interned constant");
            self.entries.insert(key.clone(), Arc::new(payload));
        }
        key
    }

    pub fn get(&self, key: &ConstantKey) -> Option<&Arc<Value>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ConstantKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConstantKey, &Arc<Value>)> {
        self.entries.iter()
    }

    /// Drop every payload. Keys handed out earlier resolve to nothing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A pool shared by several trees, e.g. all trees of one process.
///
/// Cloning shares the same pool. The payloads live as long as any clone.
#[derive(Debug, Clone, Default)]
pub struct SharedConstantPool {
    inner: Arc<Mutex<ConstantPool>>,
}

impl SharedConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, payload: Value) -> ConstantKey {
        self.inner.lock().intern(payload)
    }

    pub fn get(&self, key: &ConstantKey) -> Option<Arc<Value>> {
        self.inner.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Where a tree keeps its constants.
#[derive(Debug)]
pub(crate) enum PoolScope {
    Tree(ConstantPool),
    Shared(SharedConstantPool),
}

impl PoolScope {
    pub(crate) fn intern(&mut self, payload: Value) -> ConstantKey {
        match self {
            PoolScope::Tree(pool) => pool.intern(payload),
            PoolScope::Shared(pool) => pool.intern(payload),
        }
    }

    pub(crate) fn get(&self, key: &ConstantKey) -> Option<Arc<Value>> {
        match self {
            PoolScope::Tree(pool) => pool.get(key).cloned(),
            PoolScope::Shared(pool) => pool.get(key),
        }
    }
}
