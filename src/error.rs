//! Error types shared by graph construction and propagation.

use thiserror::Error;

use crate::graph::NodeIndex;
use crate::op::Op;

/// Everything that can go wrong while building or differentiating a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
  /// An operand lies outside the domain of the operator; no node was created.
  #[error("{op} is undefined for operand {value}: {reason}")]
  Domain {
    op: Op,
    value: f64,
    reason: &'static str,
  },

  /// A gradient slot was read before any sweep wrote to it.
  #[error("gradient of node {node} is unset; run forward or backward first")]
  UnsetGradient { node: NodeIndex },

  /// The orderer reached a node that is still on the traversal path.
  ///
  /// Edges only ever point at freshly created nodes, so this means the graph
  /// invariants were broken and the graph cannot be trusted any more.
  #[error("cycle detected through node {node}")]
  Cycle { node: NodeIndex },

  /// A node handle that belongs to a different graph was used.
  #[error("node {node} belongs to another graph")]
  ForeignNode { node: NodeIndex },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
