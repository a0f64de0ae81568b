//! Lifecycle tracking
//!
//! A tracker registers nodes for later bulk release, so a whole batch of
//! derived cells can be torn down together regardless of when any single
//! observation is dropped. The default tracker does nothing.

use std::sync::Mutex;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::graph::{NodeId, ReactiveGraph};

/// Registers nodes for later bulk release.
pub trait LifecycleTracker: Send + Sync {
    /// Remember a node so it can be released with the rest of its batch.
    fn mark(&self, node: NodeId);
}

/// Tracker that forgets everything it is given. The default when no
/// explicit tracker is passed.
pub struct NoopTracker;

impl LifecycleTracker for NoopTracker {
    fn mark(&self, _node: NodeId) {}
}

/// Collects marked nodes and releases them all at once.
///
/// Marking is deduplicated; release order is mark order. Releasing goes
/// through [`ReactiveGraph::release`], so former parents prune the stale
/// edges lazily on their next broadcast.
pub struct ReleasePool {
    marked: Mutex<Marked>,
}

#[derive(Default)]
struct Marked {
    order: Vec<NodeId>,
    seen: FxHashSet<NodeId>,
}

impl ReleasePool {
    pub fn new() -> Self {
        Self {
            marked: Mutex::new(Marked::default()),
        }
    }

    /// Number of nodes currently marked.
    pub fn len(&self) -> usize {
        self.marked.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every marked node and clear the pool. Returns how many
    /// nodes were marked; already-dead nodes release as no-ops.
    pub fn release_all(&self, graph: &mut ReactiveGraph) -> usize {
        let order = {
            let mut marked = self.marked.lock().unwrap();
            marked.seen.clear();
            std::mem::take(&mut marked.order)
        };
        trace!(count = order.len(), "release pool");
        for key in &order {
            graph.release_key(*key);
        }
        order.len()
    }
}

impl LifecycleTracker for ReleasePool {
    fn mark(&self, node: NodeId) {
        let mut marked = self.marked.lock().unwrap();
        if marked.seen.insert(node) {
            marked.order.push(node);
        }
    }
}

impl Default for ReleasePool {
    fn default() -> Self {
        Self::new()
    }
}
