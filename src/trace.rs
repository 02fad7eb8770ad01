//!
//! Observation of graph construction and gradient sweeps.
//!
//! A [`Graph`](crate::Graph) built with an [`Observer`] reports a
//! [`TraceEvent`] for every node it creates and every gradient slot a sweep
//! finalizes. Observers see copies of the numbers and cannot influence them.
//!

use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::graph::NodeIndex;
use crate::op::Op;

/// One summand `local * parent_grad` of a forward chain rule step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
  pub parent: NodeIndex,
  /// `d(node)/d(parent)`
  pub local: f64,
  /// `d(parent)/d(anchor)`
  pub parent_grad: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
  NodeCreated {
    node: NodeIndex,
    op: Op,
    parents: SmallVec<[NodeIndex; 2]>,
    value: f64,
  },
  /// A forward sweep finished `node`; `grad` is `d(node)/d(anchor)`.
  Tangent {
    anchor: NodeIndex,
    node: NodeIndex,
    grad: f64,
    terms: SmallVec<[Term; 2]>,
  },
  /// A reverse sweep finished `node`; `grad` is `d(anchor)/d(node)`.
  Adjoint {
    anchor: NodeIndex,
    node: NodeIndex,
    grad: f64,
  },
}

/// Sink for trace events.
pub trait Observer {
  fn observe(&self, event: &TraceEvent);
}

impl<T: Observer + ?Sized> Observer for Rc<T> {
  fn observe(&self, event: &TraceEvent) {
    (**self).observe(event)
  }
}

/// Keeps every event in memory.
///
/// Install it behind an `Rc` to read the events back while the graph lives.
#[derive(Debug, Default)]
pub struct Recorder {
  events: RefCell<Vec<TraceEvent>>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<TraceEvent> {
    self.events.borrow().clone()
  }

  pub fn clear(&self) {
    self.events.borrow_mut().clear();
  }
}

impl Observer for Recorder {
  fn observe(&self, event: &TraceEvent) {
    self.events.borrow_mut().push(event.clone());
  }
}

/// Display names for nodes: `x1, x2, ...` for inputs and `v1, v2, ...` for
/// everything else, numbered across the whole process.
pub mod labels {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use crate::op::Op;

  static INPUTS: AtomicUsize = AtomicUsize::new(0);
  static INTERMEDIATES: AtomicUsize = AtomicUsize::new(0);

  pub fn next(op: Op) -> String {
    if op == Op::Input {
      format!("x{}", INPUTS.fetch_add(1, Ordering::Relaxed) + 1)
    } else {
      format!("v{}", INTERMEDIATES.fetch_add(1, Ordering::Relaxed) + 1)
    }
  }

  /// Restart both sequences at 1.
  pub fn reset() {
    INPUTS.store(0, Ordering::Relaxed);
    INTERMEDIATES.store(0, Ordering::Relaxed);
  }
}

/// Renders events as human readable lines on the `bigrad::trace` log target.
#[derive(Debug, Default)]
pub struct LogObserver {
  names: RefCell<FxHashMap<NodeIndex, String>>,
}

impl LogObserver {
  pub const TARGET: &'static str = "bigrad::trace";

  pub fn new() -> Self {
    Self::default()
  }

  /// Display name of `node`, or its index when it was created unobserved.
  pub fn name(&self, node: NodeIndex) -> String {
    self
      .names
      .borrow()
      .get(&node)
      .cloned()
      .unwrap_or_else(|| format!("#{node}"))
  }

  /// The line that [`Observer::observe`] logs for `event`.
  pub fn render(&self, event: &TraceEvent) -> String {
    match event {
      TraceEvent::NodeCreated {
        node,
        op,
        parents,
        value,
      } => {
        let parents: Vec<String> = parents.iter().map(|p| self.name(*p)).collect();
        format!(
          "{:<2} = {:>5}{:<12} = {:<8}",
          self.name(*node),
          op.name(),
          format!("{parents:?}"),
          round3(*value)
        )
      }
      TraceEvent::Tangent {
        anchor,
        node,
        grad,
        terms,
      } => {
        let (node, anchor) = (self.name(*node), self.name(*anchor));
        if terms.is_empty() {
          return format!("d{node}/d{anchor} = {}", round3(*grad));
        }
        let mut symbolic = String::new();
        let mut numeric = String::new();
        for (i, term) in terms.iter().enumerate() {
          let sep = if i == 0 { "" } else { " + " };
          let parent = self.name(term.parent);
          let _ = write!(symbolic, "{sep}(d{node}/d{parent})(d{parent}/d{anchor})");
          let _ = write!(
            numeric,
            "{sep}({})({})",
            round3(term.local),
            round3(term.parent_grad)
          );
        }
        format!(
          "d{node}/d{anchor} = {symbolic}\n\t= {numeric} = {}",
          round3(*grad)
        )
      }
      TraceEvent::Adjoint { anchor, node, grad } => format!(
        "d{}/d{} = {}",
        self.name(*anchor),
        self.name(*node),
        round3(*grad)
      ),
    }
  }
}

impl Observer for LogObserver {
  fn observe(&self, event: &TraceEvent) {
    if let TraceEvent::NodeCreated { node, op, .. } = event {
      self.names.borrow_mut().insert(*node, labels::next(*op));
    }
    debug!(target: Self::TARGET, "{}", self.render(event));
  }
}

fn round3(value: f64) -> f64 {
  (value * 1000.0).round() / 1000.0
}
