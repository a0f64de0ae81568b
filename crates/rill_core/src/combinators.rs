//! Combinator algebra
//!
//! Every combinator is a transform function over the single `flat_map`
//! primitive, returning one of the four sentinel outcomes. Per-combinator
//! state (counters, buffers, latest-pair slots, accumulators) is closed
//! over at the call site, never stored in the graph node itself.

use std::sync::{Arc, Mutex};

use crate::graph::{ReactiveGraph, Source};
use crate::value::{Either, ReactiveValue};

impl ReactiveGraph {
    /// Derive a node carrying `f` of every upstream value.
    pub fn map<A, B, F>(&mut self, src: impl Into<Source<A>>, mut f: F) -> Source<B>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
        F: FnMut(A) -> B + Send + 'static,
    {
        self.flat_map(src, move |_, value| ReactiveValue::Constant(f(value)))
    }

    /// Derive a node passing through only the values matching `pred`.
    pub fn filter<A, F>(&mut self, src: impl Into<Source<A>>, mut pred: F) -> Source<A>
    where
        A: Clone + Send + 'static,
        F: FnMut(&A) -> bool + Send + 'static,
    {
        self.flat_map(src, move |_, value| {
            if pred(&value) {
                ReactiveValue::Constant(value)
            } else {
                ReactiveValue::Skip
            }
        })
    }

    /// Run `f` on every upstream value. The returned node never itself
    /// broadcasts; its handle is the unsubscribe token.
    pub fn foreach<A, F>(&mut self, src: impl Into<Source<A>>, mut f: F) -> Source<()>
    where
        A: Clone + Send + 'static,
        F: FnMut(&mut ReactiveGraph, A) + Send + 'static,
    {
        self.flat_map(src, move |graph, value| {
            f(graph, value);
            ReactiveValue::Skip
        })
    }

    /// Run `f` on the first upstream value, then kill the binding.
    pub fn once<A, F>(&mut self, src: impl Into<Source<A>>, mut f: F) -> Source<()>
    where
        A: Clone + Send + 'static,
        F: FnMut(&mut ReactiveGraph, A) + Send + 'static,
    {
        self.flat_map(src, move |graph, value| {
            f(graph, value);
            ReactiveValue::Terminate
        })
    }

    /// Watch the upstream and kill the binding as soon as `pred` fails.
    /// Never broadcasts.
    pub fn until<A, F>(&mut self, src: impl Into<Source<A>>, mut pred: F) -> Source<A>
    where
        A: Clone + Send + 'static,
        F: FnMut(&A) -> bool + Send + 'static,
    {
        self.flat_map(src, move |_, value| {
            if pred(&value) {
                ReactiveValue::Skip
            } else {
                ReactiveValue::Terminate
            }
        })
    }

    /// Skip the first `count` broadcasts, then pass through.
    pub fn drop_first<A>(&mut self, src: impl Into<Source<A>>, count: usize) -> Source<A>
    where
        A: Clone + Send + 'static,
    {
        let mut seen = 0usize;
        self.flat_map(src, move |_, value| {
            if seen < count {
                seen += 1;
                ReactiveValue::Skip
            } else {
                ReactiveValue::Constant(value)
            }
        })
    }

    /// Buffer upstream values; every `count` arrivals, broadcast the
    /// buffered sequence in arrival order and clear the buffer. No element
    /// is ever repeated across batches.
    pub fn take<A>(&mut self, src: impl Into<Source<A>>, count: usize) -> Source<Vec<A>>
    where
        A: Clone + Send + 'static,
    {
        let out = self.create_channel::<Vec<A>>();
        let mut buffer: Vec<A> = Vec::with_capacity(count);
        self.foreach(src, move |graph, value| {
            buffer.push(value);
            if buffer.len() >= count {
                let batch = std::mem::take(&mut buffer);
                graph.emit(out, batch);
            }
        });
        out.source()
    }

    /// Accumulate upstream values into a stateful cell seeded at `init`.
    ///
    /// The accumulator lives in its own root cell updated by a side
    /// subscription, so subscribers replay the current accumulator and
    /// there is no self-subscription anywhere in the wiring.
    pub fn fold<A, B, F>(&mut self, src: impl Into<Source<A>>, init: B, mut op: F) -> Source<B>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
        F: FnMut(B, A) -> B + Send + 'static,
    {
        let acc = self.create_var(init);
        self.foreach(src, move |graph, value| {
            if let Some(current) = graph.get(acc) {
                let next = op(current, value);
                graph.set(acc, next);
            }
        });
        acc.source()
    }

    /// Combine two nodes into a pair stream: whenever either side fires,
    /// emit that value paired with the other side's latest, once both
    /// sides have fired at least once.
    pub fn zip<A, B>(
        &mut self,
        left: impl Into<Source<A>>,
        right: impl Into<Source<B>>,
    ) -> Source<(A, B)>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
    {
        let out = self.create_channel::<(A, B)>();
        let latest: Arc<Mutex<(Option<A>, Option<B>)>> = Arc::new(Mutex::new((None, None)));

        let slot = Arc::clone(&latest);
        self.foreach(left, move |graph, value| {
            let pair = {
                let mut slot = slot.lock().unwrap();
                slot.0 = Some(value);
                match &*slot {
                    (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                    _ => None,
                }
            };
            if let Some(pair) = pair {
                graph.emit(out, pair);
            }
        });

        let slot = Arc::clone(&latest);
        self.foreach(right, move |graph, value| {
            let pair = {
                let mut slot = slot.lock().unwrap();
                slot.1 = Some(value);
                match &*slot {
                    (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                    _ => None,
                }
            };
            if let Some(pair) = pair {
                graph.emit(out, pair);
            }
        });

        out.source()
    }

    /// Fan two nodes into one stream, tagging values [`Either::Left`] for
    /// `left` and [`Either::Right`] for `right`, preserving arrival order
    /// across both sources.
    pub fn or<A, B>(
        &mut self,
        left: impl Into<Source<A>>,
        right: impl Into<Source<B>>,
    ) -> Source<Either<A, B>>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
    {
        let out = self.create_channel::<Either<A, B>>();
        self.foreach(left, move |graph, value| {
            graph.emit(out, Either::Left(value));
        });
        self.foreach(right, move |graph, value| {
            graph.emit(out, Either::Right(value));
        });
        out.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + Send + 'static>(
        graph: &mut ReactiveGraph,
        src: impl Into<Source<T>>,
    ) -> Arc<Mutex<Vec<T>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        graph.foreach(src, move |_, value| {
            sink.lock().unwrap().push(value);
        });
        log
    }

    #[test]
    fn test_map_over_channel() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let doubled = graph.map(chan, |x| x * 2);
        let log = recorder(&mut graph, doubled);

        graph.emit(chan, 1);
        graph.emit(chan, 2);
        assert_eq!(*log.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_filter() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let even = graph.filter(chan, |x| x % 2 == 0);
        let log = recorder(&mut graph, even);

        for value in 1..=6 {
            graph.emit(chan, value);
        }
        assert_eq!(*log.lock().unwrap(), vec![2, 4, 6]);
    }

    #[test]
    fn test_once_runs_exactly_once_and_detaches() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        let handle = graph.once(chan, move |_, _| {
            *count_clone.lock().unwrap() += 1;
        });

        graph.emit(chan, 1);
        graph.emit(chan, 2);
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!graph.is_live(handle));
        assert_eq!(graph.binding_count(chan), 0);
    }

    #[test]
    fn test_until_kills_on_failing_predicate() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let watch = graph.until(chan, |x| *x < 3);

        graph.emit(chan, 1);
        graph.emit(chan, 2);
        assert!(graph.is_live(watch));
        graph.emit(chan, 3);
        assert!(!graph.is_live(watch));
    }

    #[test]
    fn test_drop_first() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let tail = graph.drop_first(chan, 2);
        let log = recorder(&mut graph, tail);

        for value in 1..=4 {
            graph.emit(chan, value);
        }
        assert_eq!(*log.lock().unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_take_flushes_full_batches() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let batches = graph.take(chan, 3);
        let log = recorder(&mut graph, batches);

        for value in 1..=7 {
            graph.emit(chan, value);
        }
        assert_eq!(*log.lock().unwrap(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_fold_accumulates_and_replays() {
        let mut graph = ReactiveGraph::new();
        let chan = graph.create_channel::<i32>();
        let sum = graph.fold(chan, 0, |acc, x| acc + x);

        graph.emit(chan, 1);
        graph.emit(chan, 2);
        graph.emit(chan, 3);
        assert_eq!(graph.get(sum), Some(6));

        // Late subscribers replay the current accumulator.
        let log = recorder(&mut graph, sum);
        assert_eq!(*log.lock().unwrap(), vec![6]);
        graph.emit(chan, 4);
        assert_eq!(*log.lock().unwrap(), vec![6, 10]);
    }

    #[test]
    fn test_fold_seeds_from_stateful_source() {
        let mut graph = ReactiveGraph::new();
        let count = graph.create_var(5i32);
        // Stateful sources replay their current value into the fold.
        let sum = graph.fold(count, 0, |acc, x| acc + x);
        assert_eq!(graph.get(sum), Some(5));

        graph.set(count, 2);
        assert_eq!(graph.get(sum), Some(7));
    }

    #[test]
    fn test_zip_emits_latest_pairs() {
        let mut graph = ReactiveGraph::new();
        let left = graph.create_channel::<i32>();
        let right = graph.create_channel::<&'static str>();
        let pairs = graph.zip(left, right);
        let log = recorder(&mut graph, pairs);

        graph.emit(left, 1);
        assert!(log.lock().unwrap().is_empty());
        graph.emit(right, "a");
        graph.emit(left, 2);
        assert_eq!(*log.lock().unwrap(), vec![(1, "a"), (2, "a")]);
    }

    #[test]
    fn test_or_tags_and_preserves_arrival_order() {
        let mut graph = ReactiveGraph::new();
        let left = graph.create_channel::<i32>();
        let right = graph.create_channel::<i32>();
        let merged = graph.or(left, right);
        let log = recorder(&mut graph, merged);

        graph.emit(left, 1);
        graph.emit(right, 2);
        graph.emit(left, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec![Either::Left(1), Either::Right(2), Either::Left(3)]
        );
    }
}
