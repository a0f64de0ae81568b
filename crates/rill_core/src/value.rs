//! Sentinel values
//!
//! A transform function returns a `ReactiveValue` to control graph wiring
//! instead of carrying data: `Constant` broadcasts once, `Skip` stays
//! silent, `Terminate` kills the binding, and `Live` subscribes the binding
//! to another node's future broadcasts.

use crate::graph::Source;

/// Result of a transform function.
///
/// `flat_map` performs a four-way dispatch on this value (see
/// [`ReactiveGraph::pull`](crate::ReactiveGraph::pull)); every other
/// combinator is a transform returning one of these four outcomes.
#[derive(Debug)]
pub enum ReactiveValue<T> {
    /// Broadcast the value once, immediately. No subscription is created.
    Constant(T),
    /// Produce nothing for this input.
    Skip,
    /// Kill the binding that produced this result.
    Terminate,
    /// Subscribe the binding to every future broadcast of the given node.
    Live(Source<T>),
}

/// A value tagged with the side of a fan-in it arrived from.
///
/// Produced by [`ReactiveGraph::or`](crate::ReactiveGraph::or): `Left` for
/// the first source, `Right` for the second, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}
