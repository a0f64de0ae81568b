//! Rill Core Runtime
//!
//! A minimal functional-reactive runtime: a graph of reactive cells
//! connected by transformation bindings, with automatic update propagation
//! and deterministic, handle-driven cleanup of dead subscribers.
//!
//! - **Roots**: mutable cells ([`Var`]), broadcast channels ([`Channel`]),
//!   immutable vals
//! - **Bindings**: derived nodes re-run on every upstream broadcast, all
//!   built from the single [`ReactiveGraph::flat_map`] primitive
//! - **Lifecycle**: explicit `kill`/`release`, lazy pruning of dead
//!   subscribers, batch teardown via [`ReleasePool`]
//!
//! # Example
//!
//! ```rust
//! use rill_core::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//!
//! // Create a mutable root cell
//! let count = graph.create_var(1i32);
//!
//! // Derive a value that stays consistent with the root
//! let doubled = graph.map(count, |x| x * 2);
//! assert_eq!(graph.get(doubled), Some(2));
//!
//! // Update the root; the derived cell follows
//! graph.set(count, 5);
//! assert_eq!(graph.get(doubled), Some(10));
//!
//! // Tear the derivation down explicitly
//! graph.kill(doubled);
//! graph.set(count, 7);
//! assert_eq!(graph.get(doubled), None);
//! ```
//!
//! Propagation is synchronous and single-threaded. The one asynchronous
//! boundary is the future adapter ([`from_future`] / [`pending`]), whose
//! completions reach the graph only through the [`Inbox`] when the owning
//! thread calls [`ReactiveGraph::pump`].
//!
//! A transform that panics aborts the remainder of that broadcast round;
//! faults are not isolated per binding.

pub mod combinators;
pub mod graph;
pub mod lifecycle;
pub mod runtime;
pub mod state;
pub mod value;

pub use graph::{Channel, NodeId, ReactiveGraph, Source, Var};
pub use lifecycle::{LifecycleTracker, NoopTracker, ReleasePool};
pub use runtime::{from_future, pending, Completer, Inbox};
pub use state::{SharedGraph, State};
pub use value::{Either, ReactiveValue};
