//! Synchronous derived cells
//!
//! `State<T>` wraps a root cell behind a shared graph and exposes its
//! current value synchronously, without the caller holding the graph lock.
//! `map`, `zip` and `observe` construct new root cells recomputed
//! synchronously on every upstream notification, and register every node
//! they create with a [`LifecycleTracker`] so a whole batch of derived
//! cells can be released together via a [`ReleasePool`](crate::ReleasePool).
//!
//! Derivation callbacks run with the graph lock held and receive the graph
//! by `&mut`: they must mutate through that handle, never by re-locking
//! the shared graph.

use std::sync::{Arc, Mutex};

use crate::graph::{ReactiveGraph, Source, Var};
use crate::lifecycle::{LifecycleTracker, NoopTracker};

/// Graph shared across owners and threads.
pub type SharedGraph = Arc<Mutex<ReactiveGraph>>;

/// A root cell with synchronous access and tracker-managed derivations.
pub struct State<T> {
    cell: Var<T>,
    graph: SharedGraph,
    tracker: Arc<dyn LifecycleTracker>,
}

impl<T: Clone + Send + 'static> State<T> {
    /// Create a state cell with the default no-op tracker.
    pub fn new(initial: T, graph: SharedGraph) -> Self {
        Self::with_tracker(initial, graph, Arc::new(NoopTracker))
    }

    /// Create a state cell whose derived nodes register with `tracker`.
    pub fn with_tracker(
        initial: T,
        graph: SharedGraph,
        tracker: Arc<dyn LifecycleTracker>,
    ) -> Self {
        let cell = graph.lock().unwrap().create_var(initial);
        tracker.mark(cell.id());
        Self {
            cell,
            graph,
            tracker,
        }
    }

    /// The underlying cell handle.
    pub fn cell(&self) -> Var<T> {
        self.cell
    }

    /// Current value, read synchronously. `None` once the cell has been
    /// released.
    pub fn get(&self) -> Option<T> {
        self.graph.lock().unwrap().get(self.cell)
    }

    /// Set the cell's value, propagating to all derived cells.
    pub fn set(&self, value: T) {
        self.graph.lock().unwrap().set(self.cell, value);
    }

    /// Derive a state cell recomputed as `f` of this cell on every
    /// notification. If this cell has already been released, the derived
    /// state is born dead: it never resolves and never runs `f`.
    pub fn map<U, F>(&self, mut f: F) -> State<U>
    where
        U: Clone + Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let mut graph = self.graph.lock().unwrap();
        let Some(current) = graph.get(self.cell) else {
            return self.derivation(Var::dead());
        };
        let derived = graph.create_var(f(current));
        self.tracker.mark(derived.id());

        // `f` already ran on the current value; the attach replay must not
        // run it a second time.
        let updates = graph.drop_first(self.cell, 1);
        self.tracker.mark(updates.id());
        let binding = graph.foreach(updates, move |g, value| {
            let next = f(value);
            g.set(derived, next);
        });
        self.tracker.mark(binding.id());

        drop(graph);
        self.derivation(derived)
    }

    /// Derive a pair cell recomputed whenever either side changes. Both
    /// states must share the same graph. If either side has been released,
    /// the derived state is born dead.
    pub fn zip<U>(&self, other: &State<U>) -> State<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        let mut graph = self.graph.lock().unwrap();
        let (Some(left), Some(right)) = (graph.get(self.cell), graph.get(other.cell)) else {
            return self.derivation(Var::dead());
        };
        let derived = graph.create_var((left, right));
        self.tracker.mark(derived.id());

        let binding = graph.foreach(self.cell, move |g, value: T| {
            if let Some((_, current)) = g.get(derived) {
                g.set(derived, (value, current));
            }
        });
        self.tracker.mark(binding.id());

        let binding = graph.foreach(other.cell, move |g, value: U| {
            if let Some((current, _)) = g.get(derived) {
                g.set(derived, (current, value));
            }
        });
        self.tracker.mark(binding.id());

        drop(graph);
        self.derivation(derived)
    }

    /// Run `f` on the current value and on every subsequent notification.
    /// The returned handle is the unsubscribe token; the observation is
    /// also registered with the tracker.
    pub fn observe<F>(&self, mut f: F) -> Source<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        let mut graph = self.graph.lock().unwrap();
        let binding = graph.foreach(self.cell, move |_, value| f(value));
        self.tracker.mark(binding.id());
        binding
    }

    fn derivation<U>(&self, cell: Var<U>) -> State<U> {
        State {
            cell,
            graph: Arc::clone(&self.graph),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell,
            graph: Arc::clone(&self.graph),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ReleasePool;

    fn shared() -> SharedGraph {
        Arc::new(Mutex::new(ReactiveGraph::new()))
    }

    #[test]
    fn test_state_get_set() {
        let state = State::new(1i32, shared());
        assert_eq!(state.get(), Some(1));
        state.set(5);
        assert_eq!(state.get(), Some(5));
    }

    #[test]
    fn test_map_recomputes_synchronously() {
        let state = State::new(2i32, shared());
        let doubled = state.map(|x| x * 2);

        assert_eq!(doubled.get(), Some(4));
        state.set(10);
        assert_eq!(doubled.get(), Some(20));
    }

    #[test]
    fn test_zip_tracks_both_sides() {
        let graph = shared();
        let left = State::new(1i32, graph.clone());
        let right = State::new("a", graph);
        let pair = left.zip(&right);

        assert_eq!(pair.get(), Some((1, "a")));
        left.set(2);
        assert_eq!(pair.get(), Some((2, "a")));
        right.set("b");
        assert_eq!(pair.get(), Some((2, "b")));
    }

    #[test]
    fn test_observe_replays_then_follows() {
        let state = State::new(1i32, shared());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        state.observe(move |value| sink.lock().unwrap().push(value));

        state.set(2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_map_runs_transform_once_per_update() {
        let graph = shared();
        let state = State::new(1i32, graph);
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let doubled = state.map(move |x| {
            *calls_clone.lock().unwrap() += 1;
            x * 2
        });
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(doubled.get(), Some(2));

        state.set(5);
        assert_eq!(*calls.lock().unwrap(), 2);
        assert_eq!(doubled.get(), Some(10));
    }

    #[test]
    fn test_map_on_released_cell_is_noop() {
        let graph = shared();
        let pool = Arc::new(ReleasePool::new());
        let state = State::with_tracker(1i32, graph.clone(), pool.clone());
        pool.release_all(&mut graph.lock().unwrap());

        // The derivation is born dead instead of faulting.
        let doubled = state.map(|x| x * 2);
        assert_eq!(doubled.get(), None);
        state.set(5);
        doubled.set(9);
        assert_eq!(doubled.get(), None);
    }

    #[test]
    fn test_zip_on_released_cell_is_noop() {
        let graph = shared();
        let pool = Arc::new(ReleasePool::new());
        let left = State::with_tracker(1i32, graph.clone(), pool.clone());
        let right = State::new("a", graph.clone());
        pool.release_all(&mut graph.lock().unwrap());

        let pair = left.zip(&right);
        assert_eq!(pair.get(), None);
        right.set("b");
        assert_eq!(pair.get(), None);
    }

    #[test]
    fn test_release_pool_tears_down_batch() {
        let graph = shared();
        let pool = Arc::new(ReleasePool::new());
        let state = State::with_tracker(1i32, graph.clone(), pool.clone());
        let doubled = state.map(|x| x * 2);

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        doubled.observe(move |value| sink.lock().unwrap().push(value));
        state.set(2);
        assert_eq!(*log.lock().unwrap(), vec![2, 4]);

        pool.release_all(&mut graph.lock().unwrap());
        state.set(3);
        assert_eq!(*log.lock().unwrap(), vec![2, 4]);
        assert_eq!(state.get(), None);
        assert_eq!(doubled.get(), None);
    }
}
