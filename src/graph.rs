//!
//! The node arena and the handles that point into it.
//!
//! Nodes never own each other; every edge is a [`NodeIndex`] into the arena
//! held by [`Graph`], so shared subexpressions and diamonds need no reference
//! counting and the whole graph is dropped at once.
//!

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::ptr;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::op::Op;
use crate::trace::{Observer, TraceEvent};

/// Stable position of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
  #[inline(always)]
  pub fn get(self) -> usize {
    self.0
  }
}

impl fmt::Display for NodeIndex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A parent edge together with the local derivative `d(node)/d(parent)`,
/// evaluated once when the node was created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
  pub parent: NodeIndex,
  pub local: f64,
}

/// Operators take at most two operands, so edges always fit inline.
pub(crate) type Edges = SmallVec<[Edge; 2]>;

#[derive(Debug)]
pub(crate) struct Node {
  pub(crate) value: f64,
  pub(crate) op: Op,
  pub(crate) edges: Edges,
  pub(crate) children: Vec<NodeIndex>,
  pub(crate) grad: Option<f64>,
}

impl Node {
  fn new(value: f64, op: Op, edges: Edges) -> Self {
    Self {
      value,
      op,
      edges,
      children: Vec::new(),
      grad: None,
    }
  }
}

/// Owner of every node created through it.
///
/// All operations take `&self`; the arena lives behind a `RefCell` so node
/// handles can keep a shared borrow of the graph while new nodes are added.
#[derive(Default)]
pub struct Graph {
  nodes: RefCell<Vec<Node>>,
  observer: Option<Box<dyn Observer>>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// A graph that reports every node construction and gradient update to
  /// `observer`. Observation never changes the numbers that are computed.
  pub fn with_observer<O>(observer: O) -> Self
  where
    O: Observer + 'static,
  {
    Self {
      nodes: RefCell::default(),
      observer: Some(Box::new(observer)),
    }
  }

  /// Wrap a constant into an input node.
  pub fn leaf(&self, value: f64) -> Var<'_> {
    self.attach(value, Op::Input, Edges::new())
  }

  pub fn len(&self) -> usize {
    self.nodes.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.borrow().is_empty()
  }

  /// Return every gradient slot to the unset state.
  ///
  /// Sweeps accumulate into whatever the slots already hold, so independent
  /// sweeps over the same graph need a reset in between.
  pub fn reset_grads(&self) {
    for node in self.nodes.borrow_mut().iter_mut() {
      node.grad = None;
    }
  }

  #[inline]
  pub(crate) fn nodes(&self) -> Ref<'_, Vec<Node>> {
    self.nodes.borrow()
  }

  #[inline]
  pub(crate) fn nodes_mut(&self) -> RefMut<'_, Vec<Node>> {
    self.nodes.borrow_mut()
  }

  /// Fail unless `var` was created by this graph.
  #[inline]
  pub(crate) fn owns(&self, var: &Var<'_>) -> Result<()> {
    if ptr::eq(self, var.graph) {
      Ok(())
    } else {
      Err(Error::ForeignNode { node: var.node })
    }
  }

  /// Push a node and hook it under each of its parents.
  pub(crate) fn attach(&self, value: f64, op: Op, edges: Edges) -> Var<'_> {
    let parents: SmallVec<[NodeIndex; 2]> = edges.iter().map(|edge| edge.parent).collect();
    let node = {
      let mut nodes = self.nodes.borrow_mut();
      let node = NodeIndex(nodes.len());
      for parent in &parents {
        nodes[parent.0].children.push(node);
      }
      nodes.push(Node::new(value, op, edges));
      node
    };

    self.emit(|| TraceEvent::NodeCreated {
      node,
      op,
      parents,
      value,
    });

    Var {
      value,
      node,
      graph: self,
    }
  }

  /// Hand an event to the observer, if any; the event is only built when
  /// somebody listens. Callers must not hold an arena borrow.
  #[inline]
  pub(crate) fn emit<G>(&self, event: G)
  where
    G: FnOnce() -> TraceEvent,
  {
    if let Some(observer) = &self.observer {
      observer.observe(&event());
    }
  }

  #[inline]
  pub(crate) fn var(&self, node: NodeIndex) -> Var<'_> {
    Var {
      value: self.nodes.borrow()[node.0].value,
      node,
      graph: self,
    }
  }
}

impl fmt::Debug for Graph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Graph")
      .field("nodes", &self.len())
      .field("observed", &self.observer.is_some())
      .finish()
  }
}

/// Handle to a node of a [`Graph`].
///
/// Handles are `Copy` and borrow the graph, so they cannot outlive it.
#[derive(Clone, Copy)]
pub struct Var<'g> {
  value: f64,
  node: NodeIndex,
  graph: &'g Graph,
}

impl<'g> Var<'g> {
  #[inline]
  pub fn value(&self) -> f64 {
    self.value
  }

  #[inline]
  pub fn index(&self) -> NodeIndex {
    self.node
  }

  #[inline]
  pub fn graph(&self) -> &'g Graph {
    self.graph
  }

  /// Accumulated derivative from the most recent sweep(s) that reached this
  /// node, or `None` if no sweep has touched it since the last reset.
  pub fn grad(&self) -> Option<f64> {
    self.graph.nodes()[self.node.0].grad
  }

  /// Like [`Var::grad`], but an unset slot is an error.
  pub fn try_grad(&self) -> Result<f64> {
    self.grad().ok_or(Error::UnsetGradient { node: self.node })
  }

  pub fn op(&self) -> Op {
    self.graph.nodes()[self.node.0].op
  }

  pub fn is_leaf(&self) -> bool {
    self.op() == Op::Input
  }

  /// Operands that produced this node, in operand order.
  pub fn parents(&self) -> Vec<Var<'g>> {
    self
      .local_derivatives()
      .into_iter()
      .map(|(parent, _)| parent)
      .collect()
  }

  /// Nodes built from this one, in creation order; a node that uses this one
  /// twice appears twice.
  pub fn children(&self) -> Vec<Var<'g>> {
    let children = self.graph.nodes()[self.node.0].children.clone();
    children.into_iter().map(|child| self.graph.var(child)).collect()
  }

  /// `(parent, d(self)/d(parent))` for each parent edge.
  pub fn local_derivatives(&self) -> Vec<(Var<'g>, f64)> {
    let edges = self.graph.nodes()[self.node.0].edges.clone();
    edges
      .into_iter()
      .map(|Edge { parent, local }| (self.graph.var(parent), local))
      .collect()
  }
}

impl PartialEq for Var<'_> {
  fn eq(&self, other: &Self) -> bool {
    self.node == other.node && ptr::eq(self.graph, other.graph)
  }
}

impl fmt::Debug for Var<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Var")
      .field("value", &self.value)
      .field("index", &self.node.0)
      .finish()
  }
}

impl fmt::Display for Var<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.grad() {
      Some(grad) => write!(f, "Node(value={:.2}, grad={:.3})", self.value, grad),
      None => write!(f, "Node(value={:.2}, grad=(unset))", self.value),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod graph {
    use super::*;

    #[test]
    fn leaf() {
      let graph = Graph::new();
      let x = graph.leaf(1.3);
      assert_eq!(x.value(), 1.3);
      assert_eq!(x.op(), Op::Input);
      assert!(x.is_leaf());
      assert!(x.parents().is_empty());
      assert!(x.local_derivatives().is_empty());
      assert_eq!(x.grad(), None);
      assert_eq!(graph.len(), 1);
    }

    #[test]
    fn indices_follow_creation_order() {
      let graph = Graph::new();
      let a = graph.leaf(1.0);
      let b = graph.leaf(2.0);
      assert_eq!(a.index().get(), 0);
      assert_eq!(b.index().get(), 1);
      assert_ne!(a, b);
      assert_eq!(graph.var(a.index()), a);
    }

    #[test]
    fn edges_are_consistent() {
      let graph = Graph::new();
      let x = graph.leaf(3.0);
      let y = graph.leaf(4.0);
      let z = x.mul(y).unwrap();
      let w = z.add(x).unwrap();

      assert_eq!(z.parents(), vec![x, y]);
      assert_eq!(x.children(), vec![z, w]);
      assert_eq!(y.children(), vec![z]);
      assert_eq!(z.children(), vec![w]);

      for node in [x, y, z, w] {
        for parent in node.parents() {
          assert!(parent.children().contains(&node));
        }
        for child in node.children() {
          assert!(child.parents().contains(&node));
        }
      }
    }

    #[test]
    fn repeated_operand_keeps_both_edges() {
      let graph = Graph::new();
      let x = graph.leaf(5.0);
      let y = x.mul(x).unwrap();
      assert_eq!(y.parents(), vec![x, x]);
      assert_eq!(x.children(), vec![y, y]);
      assert_eq!(y.local_derivatives(), vec![(x, 5.0), (x, 5.0)]);
    }

    #[test]
    fn reset_grads() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      let y = x.mul(x).unwrap();
      y.backward().unwrap();
      assert!(x.grad().is_some());
      graph.reset_grads();
      assert_eq!(x.grad(), None);
      assert_eq!(y.grad(), None);
    }

    #[test]
    fn foreign_node() {
      let g1 = Graph::new();
      let g2 = Graph::new();
      let a = g1.leaf(1.0);
      let b = g2.leaf(2.0);
      assert_eq!(a.add(b), Err(Error::ForeignNode { node: b.index() }));
      assert_eq!(g1.len(), 1);
      assert!(g1.owns(&a).is_ok());
    }
  }

  mod var {
    use super::*;

    #[test]
    fn try_grad_unset() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      assert_eq!(x.try_grad(), Err(Error::UnsetGradient { node: x.index() }));
    }

    #[test]
    fn display() {
      let graph = Graph::new();
      let x = graph.leaf(2.0);
      assert_eq!(x.to_string(), "Node(value=2.00, grad=(unset))");
      let y = x.mul(x).unwrap();
      y.backward().unwrap();
      assert_eq!(x.to_string(), "Node(value=2.00, grad=4.000)");
    }

    #[test]
    fn debug() {
      let graph = Graph::new();
      let x = graph.leaf(0.5);
      assert_eq!(format!("{x:?}"), "Var { value: 0.5, index: 0 }");
      assert_eq!(format!("{graph:?}"), "Graph { nodes: 1, observed: false }");
    }
  }
}
