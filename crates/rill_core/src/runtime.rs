//! Cross-thread propagation queue and the future adapter
//!
//! The graph's internal lists are not designed for concurrent access, so
//! nothing off the graph thread mutates it directly. Completions arriving
//! from other threads are funneled through a single serialization point,
//! the [`Inbox`], and applied when the owning thread calls
//! [`ReactiveGraph::pump`].

use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::graph::{ReactiveGraph, Var};

type InboxFn = Box<dyn FnOnce(&mut ReactiveGraph) + Send>;

/// Queue of deferred graph mutations, shared across threads.
#[derive(Clone)]
pub struct Inbox {
    queue: Arc<Mutex<Vec<InboxFn>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueue a mutation to run on the graph thread. Callable from any
    /// thread.
    pub fn push(&self, job: impl FnOnce(&mut ReactiveGraph) + Send + 'static) {
        self.queue.lock().unwrap().push(Box::new(job));
    }

    /// Number of mutations waiting to be pumped.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_all(&self) -> Vec<InboxFn> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveGraph {
    /// Drain the inbox and apply queued mutations, in enqueue order.
    /// Returns how many were applied. Jobs run outside the queue lock, so
    /// they may themselves enqueue further work for the next pump.
    pub fn pump(&mut self) -> usize {
        let jobs = self.inbox().take_all();
        let count = jobs.len();
        for job in jobs {
            job(self);
        }
        if count > 0 {
            trace!(count, "pumped inbox");
        }
        count
    }
}

/// One-shot completion hook for a pending cell. May be invoked from any
/// thread and any execution context; the result reaches the graph only
/// through the inbox.
pub struct Completer<T> {
    cell: Var<Option<T>>,
    inbox: Inbox,
}

impl<T: Clone + Send + 'static> Completer<T> {
    /// Resolve the pending cell to `Some(value)` on the next pump.
    pub fn complete(self, value: T) {
        let cell = self.cell;
        self.inbox.push(move |graph| graph.set(cell, Some(value)));
    }
}

/// Create a cell seeded `None` plus the completer that resolves it.
pub fn pending<T: Clone + Send + 'static>(
    graph: &mut ReactiveGraph,
) -> (Var<Option<T>>, Completer<T>) {
    let cell = graph.create_var(None::<T>);
    let completer = Completer {
        cell,
        inbox: graph.inbox(),
    };
    (cell, completer)
}

/// Wrap a one-shot asynchronous computation into an optional-wrapped
/// reactive cell: `None` until the future resolves, then `Some(output)`
/// after the next pump. The tokio handle is the execution context the
/// future runs on.
pub fn from_future<T, F>(
    graph: &mut ReactiveGraph,
    handle: &tokio::runtime::Handle,
    future: F,
) -> Var<Option<T>>
where
    T: Clone + Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let (cell, completer) = pending(graph);
    handle.spawn(async move {
        completer.complete(future.await);
    });
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_applies_in_enqueue_order() {
        let mut graph = ReactiveGraph::new();
        let log = graph.create_var(Vec::<i32>::new());
        let inbox = graph.inbox();

        inbox.push(move |g| g.update(log, |mut v| {
            v.push(1);
            v
        }));
        inbox.push(move |g| g.update(log, |mut v| {
            v.push(2);
            v
        }));

        assert_eq!(graph.get(log), Some(vec![]));
        assert_eq!(graph.pump(), 2);
        assert_eq!(graph.get(log), Some(vec![1, 2]));
        assert_eq!(graph.pump(), 0);
    }

    #[test]
    fn test_pending_completes_through_inbox() {
        let mut graph = ReactiveGraph::new();
        let (cell, completer) = pending::<i32>(&mut graph);

        assert_eq!(graph.get(cell), Some(None));
        let worker = std::thread::spawn(move || completer.complete(7));
        worker.join().unwrap();

        // Nothing reaches the graph until it pumps.
        assert_eq!(graph.get(cell), Some(None));
        assert_eq!(graph.pump(), 1);
        assert_eq!(graph.get(cell), Some(Some(7)));
    }

    #[test]
    fn test_pending_cell_propagates_like_any_var() {
        let mut graph = ReactiveGraph::new();
        let (cell, completer) = pending::<i32>(&mut graph);
        let resolved = graph.filter(cell, |value| value.is_some());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        graph.foreach(resolved, move |_, value| {
            sink.lock().unwrap().push(value);
        });

        completer.complete(9);
        graph.pump();
        assert_eq!(*log.lock().unwrap(), vec![Some(9)]);
    }
}
