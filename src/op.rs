//!
//! The operator registry.
//!
//! Every operator evaluates its value and the local derivative with respect
//! to each operand at construction time, so the sweeps never need to know
//! which operator produced a node.
//!

use std::fmt;

use smallvec::smallvec;

use crate::error::{Error, Result};
use crate::graph::{Edge, Graph, NodeIndex, Var};

/// Operator tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
  Input,
  Add,
  Sub,
  Mul,
  Div,
  Pow,
  Log,
  Sin,
  Cos,
  Neg,
}

impl Op {
  pub fn name(self) -> &'static str {
    match self {
      Op::Input => "input",
      Op::Add => "add",
      Op::Sub => "sub",
      Op::Mul => "mul",
      Op::Div => "div",
      Op::Pow => "pow",
      Op::Log => "log",
      Op::Sin => "sin",
      Op::Cos => "cos",
      Op::Neg => "neg",
    }
  }

  /// Number of operands, zero for inputs.
  pub fn arity(self) -> usize {
    match self {
      Op::Input => 0,
      Op::Log | Op::Sin | Op::Cos | Op::Neg => 1,
      Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => 2,
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Either an existing node or a bare number that becomes a fresh input node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'g> {
  Var(Var<'g>),
  Const(f64),
}

impl Operand<'_> {
  #[inline]
  pub fn value(&self) -> f64 {
    match self {
      Operand::Var(var) => var.value(),
      Operand::Const(value) => *value,
    }
  }
}

impl<'g> From<Var<'g>> for Operand<'g> {
  fn from(var: Var<'g>) -> Self {
    Operand::Var(var)
  }
}

impl<'g> From<&Var<'g>> for Operand<'g> {
  fn from(var: &Var<'g>) -> Self {
    Operand::Var(*var)
  }
}

impl From<f64> for Operand<'_> {
  fn from(value: f64) -> Self {
    Operand::Const(value)
  }
}

fn domain(op: Op, value: f64, reason: &'static str) -> Error {
  Error::Domain { op, value, reason }
}

/// Value and `[d/da, d/db]` of a binary operator at `(a, b)`.
fn eval_binary(op: Op, a: f64, b: f64) -> Result<(f64, [f64; 2])> {
  match op {
    Op::Add => Ok((a + b, [1.0, 1.0])),
    Op::Sub => Ok((a - b, [1.0, -1.0])),
    Op::Mul => Ok((a * b, [b, a])),
    Op::Div => {
      if b == 0.0 {
        return Err(domain(op, b, "division by zero"));
      }
      Ok((a / b, [1.0 / b, -a / (b * b)]))
    }
    Op::Pow => {
      if a <= 0.0 && b.fract() != 0.0 {
        return Err(domain(op, a, "non-positive base needs an integer exponent"));
      }
      if a == 0.0 && b < 0.0 {
        return Err(domain(op, a, "zero base needs a non-negative exponent"));
      }
      let value = a.powf(b);
      let da = if b == 0.0 { 0.0 } else { b * a.powf(b - 1.0) };
      // ln(a) only exists for a > 0; integer exponents on a non-positive base
      // are isolated points, so the exponent edge carries no sensitivity there
      let db = if a > 0.0 { value * a.ln() } else { 0.0 };
      Ok((value, [da, db]))
    }
    _ => unreachable!("{op} is not a binary operator"),
  }
}

/// Value and `d/da` of a unary operator at `a`.
fn eval_unary(op: Op, a: f64) -> Result<(f64, f64)> {
  match op {
    Op::Log => {
      if a.is_nan() || a <= 0.0 {
        return Err(domain(op, a, "logarithm needs a positive operand"));
      }
      Ok((a.ln(), 1.0 / a))
    }
    Op::Sin => Ok((a.sin(), a.cos())),
    Op::Cos => Ok((a.cos(), -a.sin())),
    Op::Neg => Ok((-a, -1.0)),
    _ => unreachable!("{op} is not a unary operator"),
  }
}

impl Graph {
  /// Reject handles from other graphs before anything is evaluated.
  #[inline]
  fn check(&self, operand: &Operand<'_>) -> Result<()> {
    match operand {
      Operand::Var(var) => self.owns(var),
      Operand::Const(_) => Ok(()),
    }
  }

  /// Turn an operand into a node index, creating a leaf for a constant.
  #[inline]
  fn promote(&self, operand: Operand<'_>) -> NodeIndex {
    match operand {
      Operand::Var(var) => var.index(),
      Operand::Const(value) => self.leaf(value).index(),
    }
  }

  /// Evaluation and validation happen before promotion, so a failing call
  /// leaves the graph exactly as it was.
  fn binary<'g>(&'g self, op: Op, a: Operand<'g>, b: Operand<'g>) -> Result<Var<'g>> {
    self.check(&a)?;
    self.check(&b)?;
    let (value, [da, db]) = eval_binary(op, a.value(), b.value())?;
    let a = self.promote(a);
    let b = self.promote(b);
    let edges = smallvec![Edge { parent: a, local: da }, Edge { parent: b, local: db }];
    Ok(self.attach(value, op, edges))
  }

  fn unary<'g>(&'g self, op: Op, a: Operand<'g>) -> Result<Var<'g>> {
    self.check(&a)?;
    let (value, da) = eval_unary(op, a.value())?;
    let a = self.promote(a);
    Ok(self.attach(value, op, smallvec![Edge { parent: a, local: da }]))
  }

  pub fn add<'g>(&'g self, a: impl Into<Operand<'g>>, b: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.binary(Op::Add, a.into(), b.into())
  }

  pub fn sub<'g>(&'g self, a: impl Into<Operand<'g>>, b: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.binary(Op::Sub, a.into(), b.into())
  }

  pub fn mul<'g>(&'g self, a: impl Into<Operand<'g>>, b: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.binary(Op::Mul, a.into(), b.into())
  }

  /// Fails with [`Error::Domain`] when `b` is zero.
  pub fn div<'g>(&'g self, a: impl Into<Operand<'g>>, b: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.binary(Op::Div, a.into(), b.into())
  }

  /// Fails with [`Error::Domain`] for a non-positive base with a non-integer
  /// exponent, or a zero base with a negative exponent.
  pub fn pow<'g>(&'g self, a: impl Into<Operand<'g>>, b: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.binary(Op::Pow, a.into(), b.into())
  }

  /// Natural logarithm; fails with [`Error::Domain`] unless `a > 0`.
  pub fn log<'g>(&'g self, a: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.unary(Op::Log, a.into())
  }

  pub fn sin<'g>(&'g self, a: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.unary(Op::Sin, a.into())
  }

  pub fn cos<'g>(&'g self, a: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.unary(Op::Cos, a.into())
  }

  pub fn neg<'g>(&'g self, a: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.unary(Op::Neg, a.into())
  }
}

/// Method forms of the registry, with `self` as the first operand.
impl<'g> Var<'g> {
  #[inline]
  pub fn add(self, rhs: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.graph().add(self, rhs)
  }

  #[inline]
  pub fn sub(self, rhs: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.graph().sub(self, rhs)
  }

  #[inline]
  pub fn mul(self, rhs: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.graph().mul(self, rhs)
  }

  #[inline]
  pub fn div(self, rhs: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.graph().div(self, rhs)
  }

  #[inline]
  pub fn pow(self, exponent: impl Into<Operand<'g>>) -> Result<Var<'g>> {
    self.graph().pow(self, exponent)
  }

  #[inline]
  pub fn log(self) -> Result<Var<'g>> {
    self.graph().log(self)
  }

  #[inline]
  pub fn sin(self) -> Result<Var<'g>> {
    self.graph().sin(self)
  }

  #[inline]
  pub fn cos(self) -> Result<Var<'g>> {
    self.graph().cos(self)
  }

  #[inline]
  pub fn neg(self) -> Result<Var<'g>> {
    self.graph().neg(self)
  }
}
