//!
//! Numerical verification of reverse-mode gradients.
//!
//! The function under test is a closure that builds its expression on a
//! fresh graph from a slice of input leaves, so it can be evaluated at
//! perturbed points as often as needed.
//!

use crate::error::Result;
use crate::graph::{Graph, Var};

/// Central difference step used by [`check_gradient`].
pub const DEFAULT_STEP: f64 = 1e-6;

/// Analytic and numerical gradients of a function at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheck {
  pub analytic: Vec<f64>,
  pub numeric: Vec<f64>,
  /// Largest `|analytic - numeric| / max(|analytic|, |numeric|, 1)` over all
  /// inputs.
  pub max_error: f64,
}

impl GradCheck {
  pub fn passes(&self, tolerance: f64) -> bool {
    self.max_error <= tolerance
  }
}

fn relative_error(a: f64, b: f64) -> f64 {
  (a - b).abs() / a.abs().max(b.abs()).max(1.0)
}

/// Value of `f` at `at`.
pub fn evaluate<F>(f: &F, at: &[f64]) -> Result<f64>
where
  F: for<'g> Fn(&'g Graph, &[Var<'g>]) -> Result<Var<'g>>,
{
  let graph = Graph::new();
  let inputs: Vec<Var<'_>> = at.iter().map(|&value| graph.leaf(value)).collect();
  Ok(f(&graph, &inputs)?.value())
}

/// Gradient of `f` at `at` from a single reverse sweep.
///
/// An input the output does not depend on is never reached by the sweep;
/// its derivative is exactly zero.
pub fn analytic_gradient<F>(f: &F, at: &[f64]) -> Result<Vec<f64>>
where
  F: for<'g> Fn(&'g Graph, &[Var<'g>]) -> Result<Var<'g>>,
{
  let graph = Graph::new();
  let inputs: Vec<Var<'_>> = at.iter().map(|&value| graph.leaf(value)).collect();
  f(&graph, &inputs)?.backward()?;
  Ok(inputs.iter().map(|input| input.grad().unwrap_or(0.0)).collect())
}

/// Gradient of `f` at `at` from central differences with the given step.
pub fn numerical_gradient<F>(f: &F, at: &[f64], step: f64) -> Result<Vec<f64>>
where
  F: for<'g> Fn(&'g Graph, &[Var<'g>]) -> Result<Var<'g>>,
{
  let mut point = at.to_vec();
  let mut gradient = Vec::with_capacity(at.len());
  for i in 0..at.len() {
    point[i] = at[i] + step;
    let plus = evaluate(f, &point)?;
    point[i] = at[i] - step;
    let minus = evaluate(f, &point)?;
    point[i] = at[i];
    gradient.push((plus - minus) / (2.0 * step));
  }
  Ok(gradient)
}

/// Compare the reverse sweep of `f` against central differences at `at`.
pub fn check_gradient<F>(f: &F, at: &[f64]) -> Result<GradCheck>
where
  F: for<'g> Fn(&'g Graph, &[Var<'g>]) -> Result<Var<'g>>,
{
  let analytic = analytic_gradient(f, at)?;
  let numeric = numerical_gradient(f, at, DEFAULT_STEP)?;
  let max_error = analytic
    .iter()
    .zip(&numeric)
    .map(|(&a, &n)| relative_error(a, n))
    .fold(0.0, f64::max);
  Ok(GradCheck {
    analytic,
    numeric,
    max_error,
  })
}
