//!
//! Forward (tangent) and reverse (adjoint) propagation.
//!
//! Both sweeps seed the anchor's slot with 1 and accumulate into the other
//! slots they reach. Slots are never cleared by a sweep: running a second
//! sweep without [`Graph::reset_grads`] compounds the first one's results.
//!

use log::trace;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::Result;
use crate::graph::{Graph, NodeIndex, Var};
use crate::topo::{dependency_order, Direction};
use crate::trace::{Term, TraceEvent};

impl Graph {
  /// Tangent mode: afterwards every descendant of `anchor` holds
  /// `d(node)/d(anchor)`.
  ///
  /// A node is fed only by parents that are themselves descendants of the
  /// anchor; any other parent does not depend on the anchor and contributes
  /// zero.
  pub fn forward<'g>(&'g self, anchor: Var<'g>) -> Result<()> {
    self.owns(&anchor)?;
    let anchor = anchor.index();
    let order = dependency_order(&self.nodes(), anchor, Direction::Children)?;
    let reached: FxHashSet<NodeIndex> = order.iter().copied().collect();
    trace!("forward sweep from node {anchor} over {} nodes", order.len());

    self.nodes_mut()[anchor.get()].grad = Some(1.0);
    self.emit(|| TraceEvent::Tangent {
      anchor,
      node: anchor,
      grad: 1.0,
      terms: SmallVec::new(),
    });

    for node in order.into_iter().filter(|&node| node != anchor) {
      let (grad, terms) = {
        let mut nodes = self.nodes_mut();
        let mut terms: SmallVec<[Term; 2]> = SmallVec::new();
        for edge in &nodes[node.get()].edges {
          if !reached.contains(&edge.parent) {
            continue;
          }
          // reached parents precede `node` in the order, so their slot is set
          if let Some(parent_grad) = nodes[edge.parent.get()].grad {
            terms.push(Term {
              parent: edge.parent,
              local: edge.local,
              parent_grad,
            });
          }
        }
        let sum: f64 = terms.iter().map(|term| term.local * term.parent_grad).sum();
        let slot = &mut nodes[node.get()].grad;
        let grad = slot.unwrap_or(0.0) + sum;
        *slot = Some(grad);
        (grad, terms)
      };

      self.emit(|| TraceEvent::Tangent {
        anchor,
        node,
        grad,
        terms,
      });
    }

    Ok(())
  }

  /// Adjoint mode: afterwards every ancestor of `anchor` holds
  /// `d(anchor)/d(node)`.
  pub fn backward<'g>(&'g self, anchor: Var<'g>) -> Result<()> {
    self.owns(&anchor)?;
    let anchor = anchor.index();
    let order = dependency_order(&self.nodes(), anchor, Direction::Parents)?;
    trace!("backward sweep from node {anchor} over {} nodes", order.len());

    self.nodes_mut()[anchor.get()].grad = Some(1.0);

    // anchor first, every node after all of its reachable children
    for node in order.into_iter().rev() {
      let grad = {
        let mut nodes = self.nodes_mut();
        // read phase, skip if no child reached this node
        let Some(grad) = nodes[node.get()].grad else {
          continue;
        };
        // write phase, push the upstream gradient through each edge
        let edges = nodes[node.get()].edges.clone();
        for edge in edges {
          let slot = &mut nodes[edge.parent.get()].grad;
          *slot = Some(slot.unwrap_or(0.0) + grad * edge.local);
        }
        grad
      };

      self.emit(|| TraceEvent::Adjoint { anchor, node, grad });
    }

    Ok(())
  }
}

impl<'g> Var<'g> {
  /// Run a forward sweep anchored at this node.
  #[inline]
  pub fn forward(self) -> Result<()> {
    self.graph().forward(self)
  }

  /// Run a reverse sweep anchored at this node.
  #[inline]
  pub fn backward(self) -> Result<()> {
    self.graph().backward(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use approx::assert_relative_eq;

  mod backward {
    use super::*;

    #[test]
    fn square() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = x.mul(x).unwrap();
      y.backward().unwrap();
      assert_eq!(y.grad(), Some(1.0));
      // d(x^2)/dx = 2x
      assert_eq!(x.grad(), Some(4.0));
    }

    #[test]
    fn log() {
      let graph = Graph::new();
      let x = graph.leaf(1.0);
      let y = x.log().unwrap();
      y.backward().unwrap();
      assert_eq!(x.grad(), Some(1.0));
    }

    #[test]
    fn sin() {
      let graph = Graph::new();
      let a = graph.leaf(0.0);
      let b = a.sin().unwrap();
      b.backward().unwrap();
      assert_eq!(a.grad(), Some(f64::cos(0.0)));
      assert_eq!(a.grad(), Some(1.0));
    }

    #[test]
    fn diamond_sums_both_paths() {
      let graph = Graph::new();
      let x = graph.leaf(3.0);
      let y = x.add(x).unwrap();
      let z = y.mul(y).unwrap();
      z.backward().unwrap();
      // z = 4x^2, dz/dx = 8x
      assert_eq!(x.grad(), Some(8.0 * 3.0));
      assert_eq!(y.grad(), Some(2.0 * 6.0));
    }

    #[test]
    fn composite() {
      let graph = Graph::new();
      let a = graph.leaf(5.0);
      let b = graph.leaf(2.0);
      let c = graph.leaf(1.0);
      // a^b - sin(c)/2 + cos(1)
      let res = a
        .pow(b)
        .unwrap()
        .sub(c.sin().unwrap().div(2.0).unwrap())
        .unwrap()
        .add(graph.cos(1.0).unwrap())
        .unwrap();
      assert_eq!(
        res.value(),
        f64::powf(5.0, 2.0) - f64::sin(1.0) / 2.0 + f64::cos(1.0)
      );
      res.backward().unwrap();
      assert_relative_eq!(a.grad().unwrap(), 2.0 * 5.0, epsilon = 1e-12);
      assert_relative_eq!(b.grad().unwrap(), 25.0 * 5.0f64.ln(), epsilon = 1e-12);
      assert_relative_eq!(c.grad().unwrap(), -f64::cos(1.0) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn unrelated_nodes_stay_unset() {
      let graph = Graph::new();
      let x = graph.leaf(1.0);
      let y = graph.leaf(2.0);
      let s = x.add(1.0).unwrap();
      let t = y.mul(x).unwrap();
      s.backward().unwrap();
      assert_eq!(x.grad(), Some(1.0));
      assert_eq!(y.grad(), None);
      assert_eq!(t.grad(), None);
      assert_eq!(y.try_grad(), Err(Error::UnsetGradient { node: y.index() }));
    }

    #[test]
    fn rerun_without_reset_compounds() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = x.mul(3.0).unwrap();
      y.backward().unwrap();
      assert_eq!(x.grad(), Some(3.0));
      y.backward().unwrap();
      assert_eq!(x.grad(), Some(6.0));
      graph.reset_grads();
      y.backward().unwrap();
      assert_eq!(x.grad(), Some(3.0));
    }
  }

  mod forward {
    use super::*;

    #[test]
    fn square() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = x.mul(x).unwrap();
      x.forward().unwrap();
      assert_eq!(x.grad(), Some(1.0));
      assert_eq!(y.grad(), Some(4.0));
    }

    #[test]
    fn diamond_sums_both_paths() {
      let graph = Graph::new();
      let x = graph.leaf(3.0);
      let y = x.add(x).unwrap();
      let z = y.mul(y).unwrap();
      x.forward().unwrap();
      assert_eq!(y.grad(), Some(2.0));
      assert_eq!(z.grad(), Some(8.0 * 3.0));
    }

    #[test]
    fn parents_outside_the_sweep_contribute_nothing() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = graph.leaf(5.0);
      let z = x.mul(y).unwrap();
      x.forward().unwrap();
      // dz/dx = y, y itself is not a descendant of x
      assert_eq!(z.grad(), Some(5.0));
      assert_eq!(y.grad(), None);
    }

    #[test]
    fn ancestors_stay_unset() {
      let graph = Graph::new();
      let x = graph.leaf(0.3);
      let y = x.sin().unwrap();
      let z = y.cos().unwrap();
      y.forward().unwrap();
      assert_eq!(x.grad(), None);
      assert_relative_eq!(z.grad().unwrap(), -f64::sin(f64::sin(0.3)), epsilon = 1e-15);
    }

    #[test]
    fn rerun_without_reset_compounds() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = x.mul(3.0).unwrap();
      x.forward().unwrap();
      assert_eq!(y.grad(), Some(3.0));
      x.forward().unwrap();
      assert_eq!(y.grad(), Some(6.0));
      graph.reset_grads();
      x.forward().unwrap();
      assert_eq!(y.grad(), Some(3.0));
    }
  }

  #[test]
  fn modes_agree() {
    let graph = Graph::new();
    let x = graph.leaf(0.8);
    let y = graph.leaf(1.7);
    let u = x.mul(y).unwrap().sin().unwrap();
    let v = x.pow(y).unwrap().div(y.add(1.0).unwrap()).unwrap();
    let out = u.sub(v).unwrap().mul(x.log().unwrap()).unwrap();

    x.forward().unwrap();
    let tangent = out.grad().unwrap();

    graph.reset_grads();
    out.backward().unwrap();
    let adjoint = x.grad().unwrap();

    assert_relative_eq!(tangent, adjoint, max_relative = 1e-12);
  }

  #[test]
  fn foreign_anchor() {
    let g1 = Graph::new();
    let g2 = Graph::new();
    let x = g2.leaf(1.0);
    assert_eq!(g1.backward(x), Err(Error::ForeignNode { node: x.index() }));
    assert_eq!(g1.forward(x), Err(Error::ForeignNode { node: x.index() }));
    assert_eq!(x.grad(), None);
  }
}
