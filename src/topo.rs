//!
//! Topological ordering of the part of the graph reachable from an anchor.
//!

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeIndex, Var};

/// Which edges the orderer follows away from the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  /// Towards the operands: the anchor's ancestors.
  Parents,
  /// Towards the consumers: the anchor's descendants.
  Children,
}

fn neighbours(node: &Node, direction: Direction) -> SmallVec<[NodeIndex; 4]> {
  match direction {
    Direction::Parents => node.edges.iter().map(|edge| edge.parent).collect(),
    Direction::Children => node.children.iter().copied().collect(),
  }
}

/// Depth first post-order from `anchor`, each reachable node exactly once.
///
/// The traversal keeps an explicit stack, so long chains cannot overflow the
/// call stack. A neighbour that is still on the current path means a cycle.
pub(crate) fn postorder(
  nodes: &[Node],
  anchor: NodeIndex,
  direction: Direction,
) -> Result<Vec<NodeIndex>> {
  // preallocating a little bit of room for the common small graph...
  let mut stack = Vec::with_capacity(64);
  let mut result = Vec::with_capacity(64);
  let mut finished = FxHashSet::default();
  let mut on_path = FxHashSet::default();

  stack.push((anchor, false));

  while let Some((node, expanded)) = stack.pop() {
    if expanded {
      on_path.remove(&node);
      finished.insert(node);
      result.push(node);
      continue;
    }
    if finished.contains(&node) {
      // reached twice through a diamond before its first visit completed
      continue;
    }
    if !on_path.insert(node) {
      return Err(Error::Cycle { node });
    }
    // marker to emit the node after its neighbours
    stack.push((node, true));
    // reversed so the first operand (or oldest child) is expanded first
    for next in neighbours(&nodes[node.get()], direction).into_iter().rev() {
      if on_path.contains(&next) {
        return Err(Error::Cycle { node: next });
      }
      if !finished.contains(&next) {
        stack.push((next, false));
      }
    }
  }

  Ok(result)
}

/// Reachable nodes in dependency order: every node comes after each of its
/// reachable parents.
///
/// Following children, that is the reversed post-order and the anchor comes
/// first. Following parents, that is the post-order itself and the anchor
/// comes last.
pub(crate) fn dependency_order(
  nodes: &[Node],
  anchor: NodeIndex,
  direction: Direction,
) -> Result<Vec<NodeIndex>> {
  let mut order = postorder(nodes, anchor, direction)?;
  if direction == Direction::Children {
    order.reverse();
  }
  Ok(order)
}

impl Graph {
  /// Every node reachable from `anchor` in `direction`, ordered so that each
  /// node appears after all of its parents within the returned set.
  ///
  /// The forward sweep walks the [`Direction::Children`] order front to back;
  /// the reverse sweep walks the [`Direction::Parents`] order back to front.
  pub fn topological_order<'g>(
    &'g self,
    anchor: Var<'g>,
    direction: Direction,
  ) -> Result<Vec<Var<'g>>> {
    self.owns(&anchor)?;
    let order = dependency_order(&self.nodes(), anchor.index(), direction)?;
    Ok(order.into_iter().map(|node| self.var(node)).collect())
  }
}
