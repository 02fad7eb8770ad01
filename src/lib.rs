//!
//! # bigrad
//!
//! Scalar automatic differentiation over a dynamic computation graph, in
//! both tangent (forward) and adjoint (reverse) mode.
//!
//! Every operation on a [`Var`] appends a node to its [`Graph`] holding the
//! value and the local derivative towards each operand. A sweep anchored at
//! any node then fills the gradient slots it reaches:
//!
//! - [`Var::backward`] leaves `d(anchor)/d(node)` on every ancestor,
//! - [`Var::forward`] leaves `d(node)/d(anchor)` on every descendant.
//!
//! ```
//! use bigrad::Graph;
//!
//! # fn main() -> bigrad::Result<()> {
//! let graph = Graph::new();
//! let x = graph.leaf(2.0);
//! let y = x.mul(x)?;
//! y.backward()?;
//! assert_eq!(x.grad(), Some(4.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Invariants
//!
//! 1. Graphs are append only. A node's value and local derivatives never
//!    change after it is created, and an operator that fails its domain check
//!    creates nothing.
//! 2. Handles borrow their graph, so no node outlives the arena it lives in.
//! 3. Sweeps accumulate. Gradient slots are cleared only by
//!    [`Graph::reset_grads`].
//!

mod error;
mod graph;
mod op;
mod sweep;
mod topo;

pub mod gradcheck;
pub mod trace;

pub use error::{Error, Result};
pub use graph::{Edge, Graph, NodeIndex, Var};
pub use op::{Op, Operand};
pub use topo::Direction;
pub use trace::{LogObserver, Observer, Recorder, Term, TraceEvent};
