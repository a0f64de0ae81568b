//! Reactive dependency graph
//!
//! All nodes live in a single arena owned by [`ReactiveGraph`] and are
//! addressed by generation-checked [`NodeId`] keys. A released node's key
//! stops resolving, so a parent discovers dead subscribers deterministically
//! and prunes them during its next broadcast; there is no collector and no
//! finalization.
//!
//! There is one node shape. Roots (`Var`, `Channel`, vals) have no
//! recomputation closure; bindings carry one and re-run it on every parent
//! broadcast. Statefulness is a flag plus a cached last output, replayed
//! into new subscriptions.
//!
//! Propagation is synchronous and single-threaded: `set`, `emit`, `pull`
//! and `kill` run to completion before returning. A transform that panics
//! aborts the remainder of that broadcast round; faults are not isolated
//! per binding.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::trace;

use crate::runtime::Inbox;
use crate::value::ReactiveValue;

new_key_type! {
    /// Unique identifier for a node in the reactive graph
    pub struct NodeId;
}

/// Type-erased transform: downcasts the incoming value, runs the user
/// closure, and pulls the result into the owning node.
type RerunFn = Box<dyn FnMut(&mut ReactiveGraph, NodeId, &(dyn Any + Send)) + Send>;

/// Type-erased pass-through for a pulled live upstream: downcasts and
/// re-broadcasts the value as the target's own output.
type ForwardFn = Box<dyn FnMut(&mut ReactiveGraph, &(dyn Any + Send)) + Send>;

/// A downstream observation. Non-owning: the target may have been released
/// since the edge was attached, in which case the edge is pruned during the
/// next broadcast over it.
enum Edge {
    /// Parent -> binding: re-run the target's transform with the value.
    Rerun(NodeId),
    /// Pulled upstream -> binding: forward the value without transforming.
    Forward { target: NodeId, deliver: ForwardFn },
}

impl Edge {
    fn target(&self) -> NodeId {
        match self {
            Edge::Rerun(target) => *target,
            Edge::Forward { target, .. } => *target,
        }
    }
}

/// One graph node. Roots and bindings share this shape; a binding is a node
/// with a `rerun` closure and a parent.
struct Node {
    /// The node whose broadcasts re-run this node's transform.
    parent: Option<NodeId>,
    /// Downstream observations, in attachment order.
    edges: Vec<Edge>,
    /// Nodes this node currently owns a subscription to. Killed on every
    /// re-run and on kill.
    upstreams: SmallVec<[NodeId; 2]>,
    rerun: Option<RerunFn>,
    /// Last produced value, for stateful nodes.
    cached: Option<Box<dyn Any + Send>>,
    stateful: bool,
}

/// Typed handle to a live node.
///
/// Handles are plain copyable keys; holding one does not keep the node
/// alive, and using one after [`ReactiveGraph::kill`] or
/// [`ReactiveGraph::release`] is a silent no-op.
pub struct Source<T> {
    key: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Source<T> {
    pub(crate) fn new(key: NodeId) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// The underlying arena key.
    pub fn id(&self) -> NodeId {
        self.key
    }
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Source<T> {}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Source").field(&self.key).finish()
    }
}

impl<T> PartialEq for Source<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Source<T> {}

/// A mutable stateful root cell. `set` mutates the stored scalar and then
/// broadcasts; subscribers attached through `flat_map` replay the current
/// scalar immediately.
pub struct Var<T>(Source<T>);

impl<T> Var<T> {
    /// View this var as a plain source.
    pub fn source(&self) -> Source<T> {
        self.0
    }

    pub fn id(&self) -> NodeId {
        self.0.key
    }

    /// Handle that resolves to no slot. Reads return `None` and writes are
    /// silent no-ops, like any released cell.
    pub(crate) fn dead() -> Self {
        Var(Source::new(NodeId::default()))
    }
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Var<T> {}

impl<T> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Var").field(&self.0.key).finish()
    }
}

impl<T> From<Var<T>> for Source<T> {
    fn from(var: Var<T>) -> Self {
        var.0
    }
}

/// A stateless broadcast root. Subscribers see nothing until the next
/// `emit`; there is no replay.
pub struct Channel<T>(Source<T>);

impl<T> Channel<T> {
    /// View this channel as a plain source.
    pub fn source(&self) -> Source<T> {
        self.0
    }

    pub fn id(&self) -> NodeId {
        self.0.key
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Channel<T> {}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Channel").field(&self.0.key).finish()
    }
}

impl<T> From<Channel<T>> for Source<T> {
    fn from(chan: Channel<T>) -> Self {
        chan.0
    }
}

/// Arena of reactive nodes plus the propagation machinery.
pub struct ReactiveGraph {
    nodes: SlotMap<NodeId, Node>,
    inbox: Inbox,
}

impl ReactiveGraph {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            inbox: Inbox::new(),
        }
    }

    /// Create a mutable root cell holding an initial scalar.
    pub fn create_var<T: Clone + Send + 'static>(&mut self, initial: T) -> Var<T> {
        let key = self.nodes.insert(Node {
            parent: None,
            edges: Vec::new(),
            upstreams: SmallVec::new(),
            rerun: None,
            cached: Some(Box::new(initial)),
            stateful: true,
        });
        Var(Source::new(key))
    }

    /// Create a stateless broadcast root.
    pub fn create_channel<T: Clone + Send + 'static>(&mut self) -> Channel<T> {
        let key = self.nodes.insert(Node {
            parent: None,
            edges: Vec::new(),
            upstreams: SmallVec::new(),
            rerun: None,
            cached: None,
            stateful: false,
        });
        Channel(Source::new(key))
    }

    /// Create an immutable stateful root: replays its value to every new
    /// subscription and never changes.
    pub fn create_val<T: Clone + Send + 'static>(&mut self, value: T) -> Source<T> {
        self.create_var(value).source()
    }

    /// Current value of a stateful node. `None` for stateless nodes, for
    /// stateful bindings that have not produced yet, and for released nodes.
    pub fn get<T: Clone + 'static>(&self, src: impl Into<Source<T>>) -> Option<T> {
        self.nodes
            .get(src.into().key)?
            .cached
            .as_ref()?
            .downcast_ref::<T>()
            .cloned()
    }

    /// Mutate a var's scalar, then broadcast it. No-op on a killed var.
    pub fn set<T: Clone + Send + 'static>(&mut self, var: Var<T>, value: T) {
        self.broadcast(var.0.key, value);
    }

    /// Update a var's scalar with a function of the current value.
    pub fn update<T, F>(&mut self, var: Var<T>, f: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(T) -> T,
    {
        if let Some(current) = self.get(var) {
            self.set(var, f(current));
        }
    }

    /// Broadcast a value on a channel. No replay for later subscribers.
    pub fn emit<T: Clone + Send + 'static>(&mut self, chan: Channel<T>, value: T) {
        self.broadcast(chan.0.key, value);
    }

    /// The single primitive of the combinator algebra: derive a binding
    /// that re-runs `transform` on every broadcast of `src` and wires the
    /// returned [`ReactiveValue`] via [`pull`](Self::pull).
    ///
    /// A stateful parent (var, val, stateful binding) with a current value
    /// runs the transform immediately once, seeding the new binding.
    pub fn flat_map<A, B, F>(&mut self, src: impl Into<Source<A>>, mut transform: F) -> Source<B>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
        F: FnMut(&mut ReactiveGraph, A) -> ReactiveValue<B> + Send + 'static,
    {
        let parent = src.into().key;
        let stateful = self
            .nodes
            .get(parent)
            .map(|node| node.stateful)
            .unwrap_or(false);

        let rerun: RerunFn = Box::new(move |graph, key, value| {
            if let Some(value) = value.downcast_ref::<A>() {
                let out = transform(graph, value.clone());
                graph.pull(Source::<B>::new(key), out);
            }
        });

        let key = self.nodes.insert(Node {
            parent: Some(parent),
            edges: Vec::new(),
            upstreams: SmallVec::new(),
            rerun: Some(rerun),
            cached: None,
            stateful,
        });

        let Some(parent_node) = self.nodes.get_mut(parent) else {
            // Parent already dead: the binding is born orphaned but remains
            // a valid handle.
            return Source::new(key);
        };
        parent_node.edges.push(Edge::Rerun(key));

        // Stateful parents replay their current value into the new binding.
        // The cached value is cloned for the seed run, so the parent keeps
        // resolving while the transform executes.
        let seed = if stateful {
            parent_node
                .cached
                .as_ref()
                .and_then(|cached| cached.downcast_ref::<A>())
                .cloned()
        } else {
            None
        };
        if let Some(value) = seed {
            self.rerun(key, &value);
        }

        Source::new(key)
    }

    /// Wire a produced value into `into`, four-way dispatch:
    ///
    /// - `Constant(x)`: broadcast `x` once immediately; no subscription.
    /// - `Terminate`: kill `into`.
    /// - `Skip`: no-op.
    /// - `Live(src)`: subscribe `into` to every future broadcast of `src`
    ///   and record `src` as an owned upstream, torn down on the next
    ///   re-run or kill of `into`.
    pub fn pull<T: Clone + Send + 'static>(
        &mut self,
        into: impl Into<Source<T>>,
        value: ReactiveValue<T>,
    ) {
        let key = into.into().key;
        match value {
            ReactiveValue::Constant(value) => self.broadcast(key, value),
            ReactiveValue::Skip => {}
            ReactiveValue::Terminate => self.kill_key(key),
            ReactiveValue::Live(src) => {
                let upstream = src.key;
                if !self.nodes.contains_key(key) {
                    return;
                }
                let deliver: ForwardFn = Box::new(move |graph, value| {
                    if let Some(value) = value.downcast_ref::<T>() {
                        graph.broadcast(key, value.clone());
                    }
                });
                let Some(upstream_node) = self.nodes.get_mut(upstream) else {
                    return;
                };
                upstream_node.edges.push(Edge::Forward {
                    target: key,
                    deliver,
                });
                if let Some(node) = self.nodes.get_mut(key) {
                    node.upstreams.push(upstream);
                }
            }
        }
    }

    /// Tear a node down: detach from its parent's edge list, drop its own
    /// edges without notifying, then kill its owned upstreams (teardown
    /// cascades leaf to root). Idempotent; a dead handle is a no-op.
    ///
    /// Downstream bindings are never killed implicitly; they are orphaned
    /// and pruned lazily, or stay reachable through their own handles.
    pub fn kill<T>(&mut self, src: impl Into<Source<T>>) {
        self.kill_key(src.into().key);
    }

    pub(crate) fn kill_key(&mut self, key: NodeId) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        trace!(?key, "kill");
        // A binding detaches from its parent before anything else.
        if let Some(parent) = node.parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.edges.retain(|edge| edge.target() != key);
            }
        }
        for upstream in node.upstreams {
            self.kill_key(upstream);
        }
    }

    /// Drop ownership of a node without the explicit kill protocol: the
    /// slot is vacated and owned upstreams are killed, but the former
    /// parent keeps its stale edge until its next broadcast prunes it.
    pub fn release<T>(&mut self, src: impl Into<Source<T>>) {
        self.release_key(src.into().key);
    }

    pub(crate) fn release_key(&mut self, key: NodeId) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        trace!(?key, "release");
        for upstream in node.upstreams {
            self.kill_key(upstream);
        }
    }

    /// Whether the handle still resolves to a live node.
    pub fn is_live<T>(&self, src: impl Into<Source<T>>) -> bool {
        self.nodes.contains_key(src.into().key)
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of downstream observations currently attached to a node.
    /// Stale entries count until the next broadcast prunes them.
    pub fn binding_count<T>(&self, src: impl Into<Source<T>>) -> usize {
        self.nodes
            .get(src.into().key)
            .map(|node| node.edges.len())
            .unwrap_or(0)
    }

    /// Handle to the cross-thread propagation queue.
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Cache (for stateful nodes) and fan out a value.
    pub(crate) fn broadcast<T: Clone + Send + 'static>(&mut self, key: NodeId, value: T) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        if node.stateful {
            node.cached = Some(Box::new(value.clone()));
        }
        self.broadcast_erased(key, &value);
    }

    fn broadcast_erased(&mut self, key: NodeId, value: &(dyn Any + Send)) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        if node.edges.is_empty() {
            return;
        }
        // Snapshot before iterating: edges attached during this round land
        // in the fresh list and are excluded from the round.
        let mut round = std::mem::take(&mut node.edges);
        trace!(?key, edges = round.len(), "broadcast");
        for edge in round.iter_mut() {
            // Re-checked per entry so a node killed mid-round is not
            // double-processed.
            if !self.nodes.contains_key(edge.target()) {
                continue;
            }
            match edge {
                Edge::Rerun(target) => {
                    let target = *target;
                    self.rerun(target, value);
                }
                Edge::Forward { deliver, .. } => deliver(self, value),
            }
        }
        // Compact: dead targets are dropped here, amortized into the
        // broadcast rather than a separate pass.
        round.retain(|edge| self.nodes.contains_key(edge.target()));
        if let Some(node) = self.nodes.get_mut(key) {
            let attached = std::mem::replace(&mut node.edges, round);
            node.edges.extend(attached);
        }
    }

    /// Re-run a binding's transform with a new parent value.
    pub(crate) fn rerun(&mut self, key: NodeId, value: &(dyn Any + Send)) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let Some(mut transform) = node.rerun.take() else {
            return;
        };
        // Subscriptions from the previous evaluation are transient: torn
        // down before the transform runs again.
        let upstreams = std::mem::take(&mut node.upstreams);
        for upstream in upstreams {
            self.kill_key(upstream);
        }
        transform(self, key, value);
        // The transform may have terminated its own node.
        if let Some(node) = self.nodes.get_mut(key) {
            node.rerun.get_or_insert(transform);
        }
    }

    /// Whether a node currently holds a cached output. The cache reflects
    /// the most recent output even with zero downstream edges.
    #[cfg(test)]
    pub(crate) fn cached_raw(&self, key: NodeId) -> bool {
        self.nodes
            .get(key)
            .map(|node| node.cached.is_some())
            .unwrap_or(false)
    }
}

impl Default for ReactiveGraph {
    fn default() -> Self {
        Self::new()
    }
}
