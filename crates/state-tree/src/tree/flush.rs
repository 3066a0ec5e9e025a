//! Turning pending mutations into change records.
//!
//! A flush runs in four steps:
//!
//! 1. before-flush executions, in passes, for attached nodes only;
//! 2. one visit per dirty node in discovery order, emitting attach or detach
//!    transitions followed by each facet's collected diffs in facet id order;
//!    an inactive node only sends the facets that disallow changes, plus its
//!    always-reported facets on its first collection, and keeps the rest
//!    pending until it becomes active again;
//! 3. clearing the dirty set;
//! 4. running actions deferred during the flush, whose own mutations are
//!    picked up by the next flush.
//!
//! Constants referenced by emitted diffs are handed to the sink once per
//! tree, before the first change that references them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::diff::NodeChange;
use crate::error::Result;
use crate::value::{ConstantKey, NodeId};

use super::StateTree;

/// A unit of work run with the whole tree.
pub type DeferredAction = Box<dyn FnOnce(&mut StateTree) + Send>;

/// Actions to run once the current flush has emitted everything.
#[derive(Default)]
pub struct DeferredQueue {
    actions: VecDeque<DeferredAction>,
}

impl DeferredQueue {
    pub fn push(&mut self, action: impl FnOnce(&mut StateTree) + Send + 'static) {
        self.actions.push_back(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn pop(&mut self) -> Option<DeferredAction> {
        self.actions.pop_front()
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.actions.len())
            .finish()
    }
}

/// Receiver of flushed changes.
pub trait ChangeSink {
    /// Accept one change. Work that must not run while the flush is in
    /// progress can be pushed onto `deferred`.
    fn change(&mut self, change: NodeChange, deferred: &mut DeferredQueue);

    /// Accept a constant payload ahead of the first change referencing it.
    fn constant(&mut self, _key: &ConstantKey, _payload: &Arc<Value>) {}
}

impl ChangeSink for Vec<NodeChange> {
    fn change(&mut self, change: NodeChange, _deferred: &mut DeferredQueue) {
        self.push(change);
    }
}

/// Everything one flush produced, ready to serialize for the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushBatch {
    pub constants: Vec<(ConstantKey, Value)>,
    pub changes: Vec<NodeChange>,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.changes.is_empty()
    }
}

impl ChangeSink for FlushBatch {
    fn change(&mut self, change: NodeChange, _deferred: &mut DeferredQueue) {
        self.changes.push(change);
    }

    fn constant(&mut self, key: &ConstantKey, payload: &Arc<Value>) {
        self.constants.push((key.clone(), payload.as_ref().clone()));
    }
}

/// Counters from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub executions: usize,
    pub nodes: usize,
    pub changes: usize,
    pub constants: usize,
    pub deferred: usize,
}

/// Identifies a registered before-flush execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(u64);

pub(crate) struct Execution {
    pub(crate) id: ExecutionId,
    pub(crate) node: NodeId,
    action: DeferredAction,
}

impl StateTree {
    // ── Before-flush executions ───────────────────────────────────────────

    /// Run `action` at the start of the next flush in which `node` is
    /// attached. Executions run in registration order.
    pub fn before_flush(
        &mut self,
        node: NodeId,
        action: impl FnOnce(&mut StateTree) + Send + 'static,
    ) -> Result<ExecutionId> {
        self.node(node)?;
        let id = ExecutionId(self.next_execution);
        self.next_execution += 1;
        self.executions.push(Execution {
            id,
            node,
            action: Box::new(action),
        });
        Ok(id)
    }

    /// Cancel a pending execution. Returns `false` if it already ran.
    pub fn cancel_execution(&mut self, id: ExecutionId) -> bool {
        if let Some(pos) = self.executions.iter().position(|e| e.id == id) {
            self.executions.remove(pos);
            return true;
        }
        self.running_executions.contains(&id) && self.cancelled_executions.insert(id)
    }

    pub fn pending_executions(&self) -> usize {
        self.executions.len()
    }

    /// Run pending executions whose node is attached.
    ///
    /// Each pass takes the executions that are runnable when it starts.
    /// Executions registered during a pass, and those whose node got
    /// attached during it, run in a later pass. Returns how many ran.
    pub fn run_executions(&mut self) -> usize {
        let mut ran = 0;
        for _ in 0..self.options.max_execution_rounds {
            let pending = std::mem::take(&mut self.executions);
            let (ready, waiting): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|e| self.is_attached(e.node));
            self.executions = waiting;
            if ready.is_empty() {
                return ran;
            }
            self.running_executions.extend(ready.iter().map(|e| e.id));
            for execution in ready {
                self.running_executions.remove(&execution.id);
                if self.cancelled_executions.remove(&execution.id) {
                    continue;
                }
                (execution.action)(self);
                ran += 1;
            }
        }
        if self.executions.iter().any(|e| self.is_attached(e.node)) {
            tracing::warn!(
                rounds = self.options.max_execution_rounds,
                pending = self.executions.len(),
                "before-flush executions still pending after the last round"
            );
        }
        ran
    }

    // ── Deferred actions ──────────────────────────────────────────────────

    /// Run `action` after the next flush has emitted its changes.
    pub fn defer(&mut self, action: impl FnOnce(&mut StateTree) + Send + 'static) {
        self.deferred.push(action);
    }

    // ── Flush ─────────────────────────────────────────────────────────────

    /// Flush into a fresh [`FlushBatch`].
    pub fn flush(&mut self) -> FlushBatch {
        let mut batch = FlushBatch::default();
        self.flush_into(&mut batch);
        batch
    }

    /// Flush into `sink`.
    pub fn flush_into<S: ChangeSink + ?Sized>(&mut self, sink: &mut S) -> FlushReport {
        let mut report = FlushReport {
            executions: self.run_executions(),
            ..FlushReport::default()
        };

        let dirty = std::mem::take(&mut self.dirty);
        report.nodes = dirty.len();
        let mut deferred = std::mem::take(&mut self.deferred);
        let registry = Arc::clone(&self.registry);

        for id in dirty {
            let inactive_self = self.is_inactive_self(id);
            let inactive = inactive_self || self.parent(id).is_some_and(|p| self.is_inactive(p));
            let Some(node) = self.slot_mut(id) else {
                if self.discarded_attached.remove(&id) {
                    self.emit(NodeChange::detach(id), sink, &mut deferred, &mut report);
                }
                continue;
            };

            let mut staged = Vec::new();
            if node.attached != node.reported_attached {
                if node.attached {
                    staged.push(NodeChange::attach(id));
                    node.clear_changes();
                    node.generate_changes_from_empty();
                    node.initial_changes = true;
                } else {
                    staged.push(NodeChange::detach(id));
                }
                node.reported_attached = node.attached;
            }
            let mut shadowed = false;
            if node.attached {
                let initial = std::mem::replace(&mut node.initial_changes, false);
                for (facet, f) in node.facets_mut() {
                    let send = !inactive
                        || registry.spec(facet).is_ok_and(|spec| {
                            !spec.allows_changes(f) || (initial && spec.is_reported())
                        });
                    if send {
                        f.collect_changes(|diff| staged.push(NodeChange::facet(id, facet, diff)));
                    }
                }
                // Active itself but hidden by an ancestor: nothing else marks
                // it dirty once the ancestor becomes active.
                shadowed = inactive && !inactive_self;
            } else {
                // Replayed from scratch on reattach.
                node.clear_changes();
            }

            for change in staged {
                self.emit(change, sink, &mut deferred, &mut report);
            }
            if shadowed {
                self.dirty.insert(id);
            }
        }

        tracing::debug!(
            executions = report.executions,
            nodes = report.nodes,
            changes = report.changes,
            constants = report.constants,
            deferred = deferred.len(),
            "flushed state tree"
        );

        while let Some(action) = deferred.pop() {
            action(self);
            report.deferred += 1;
        }
        report
    }

    fn emit<S: ChangeSink + ?Sized>(
        &mut self,
        change: NodeChange,
        sink: &mut S,
        deferred: &mut DeferredQueue,
        report: &mut FlushReport,
    ) {
        if let Some(diff) = change.diff() {
            for key in diff.values().filter_map(|v| v.as_constant()) {
                if self.transmitted.contains(key) {
                    continue;
                }
                match self.pool.get(key) {
                    Some(payload) => {
                        sink.constant(key, &payload);
                        self.transmitted.insert(key.clone());
                        report.constants += 1;
                    }
                    None => tracing::warn!(key = key.as_str(), "referenced constant is not pooled"),
                }
            }
        }
        sink.change(change, deferred);
        report.changes += 1;
    }
}
