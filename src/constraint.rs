//! Constraint front door: a predicate paired with a solver.
//!
//! Solver and predicate capabilities are checked once at construction, so an
//! evaluation can only fail on data problems (shapes, limits), never on a
//! predicate/solver mismatch discovered mid-training.

use scirs2_core::ndarray::{Array1, ArrayD, ArrayViewD, Ix2};
use serde::{Deserialize, Serialize};

use crate::brute_force::BruteForceSolver;
use crate::error::{ConstraintError, ConstraintResult};
use crate::lazy::LazyTNormSolver;
use crate::predicate::Predicate;
use crate::sampling::{SamplingSolver, WeightedSamplingSolver};
use crate::tnorm::TNormSolver;

/// Result of one constraint evaluation: a scalar loss and its gradient with
/// respect to the input probabilities (same shape as the input).
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// Scalar loss value.
    pub loss: f64,
    /// ∂loss/∂probs, matching the input tensor's shape.
    pub grad: ArrayD<f64>,
    /// Per-example losses, present only for batched structured evaluation.
    pub per_example: Option<Array1<f64>>,
}

impl Evaluation {
    pub(crate) fn scalar(loss: f64, grad: ArrayD<f64>) -> Self {
        Self {
            loss,
            grad,
            per_example: None,
        }
    }

    pub(crate) fn batched(loss: f64, grad: ArrayD<f64>, per_example: Array1<f64>) -> Self {
        Self {
            loss,
            grad,
            per_example: Some(per_example),
        }
    }
}

/// The strategy used to turn a predicate into a differentiable loss.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Solver {
    /// Exact enumeration of the assignment space.
    BruteForce(BruteForceSolver),
    /// Monte Carlo estimate without an analytic gradient.
    Sampling(SamplingSolver),
    /// Monte Carlo estimate with a REINFORCE gradient.
    WeightedSampling(WeightedSamplingSolver),
    /// Continuous t-norm relaxation of a symbolic expression.
    TNorm(TNormSolver),
    /// Structured lazy-graph evaluation under a t-norm algebra.
    LazyTNorm(LazyTNormSolver),
}

impl Solver {
    fn name(&self) -> &'static str {
        match self {
            Solver::BruteForce(_) => "brute-force",
            Solver::Sampling(_) => "sampling",
            Solver::WeightedSampling(_) => "weighted-sampling",
            Solver::TNorm(_) => "t-norm",
            Solver::LazyTNorm(_) => "lazy-t-norm",
        }
    }

    fn accepts(&self, predicate: &Predicate) -> bool {
        match self {
            Solver::BruteForce(_) | Solver::Sampling(_) | Solver::WeightedSampling(_) => {
                predicate.supports_discrete()
            }
            Solver::TNorm(_) => predicate.as_symbolic().is_some(),
            Solver::LazyTNorm(_) => predicate.as_lazy().is_some(),
        }
    }
}

/// A predicate bound to the solver that evaluates it.
#[derive(Clone, Debug)]
pub struct Constraint {
    predicate: Predicate,
    solver: Solver,
}

impl Constraint {
    /// Bind a predicate to a solver, rejecting unsupported pairings.
    pub fn new(predicate: Predicate, solver: Solver) -> ConstraintResult<Self> {
        if !solver.accepts(&predicate) {
            return Err(ConstraintError::UnsupportedPredicate {
                solver: solver.name(),
            });
        }
        Ok(Self { predicate, solver })
    }

    /// The bound predicate.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// The bound solver.
    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// Evaluate the constraint against a probability tensor.
    ///
    /// Unstructured solvers expect a `(positions, labels)` matrix; the lazy
    /// structured solver expects a `(batch, positions, labels)` tensor.
    pub fn evaluate(&self, probs: &ArrayViewD<'_, f64>) -> ConstraintResult<Evaluation> {
        match &self.solver {
            Solver::BruteForce(s) => s.evaluate(&self.predicate, &as_matrix(probs)?),
            Solver::Sampling(s) => s.evaluate(&self.predicate, &as_matrix(probs)?),
            Solver::WeightedSampling(s) => s.evaluate(&self.predicate, &as_matrix(probs)?),
            Solver::TNorm(s) => {
                let expr = self.predicate.as_symbolic().ok_or_else(|| {
                    ConstraintError::UnsupportedPredicate {
                        solver: self.solver.name(),
                    }
                })?;
                s.evaluate(expr, &as_matrix(probs)?)
            }
            Solver::LazyTNorm(s) => {
                let graph = self.predicate.as_lazy().ok_or_else(|| {
                    ConstraintError::UnsupportedPredicate {
                        solver: self.solver.name(),
                    }
                })?;
                s.evaluate(graph, probs)
            }
        }
    }
}

fn as_matrix<'a>(
    probs: &ArrayViewD<'a, f64>,
) -> ConstraintResult<scirs2_core::ndarray::ArrayView2<'a, f64>> {
    probs.clone().into_dimensionality::<Ix2>().map_err(|_| {
        ConstraintError::Shape(format!(
            "solver expects a (positions, labels) matrix, got {}-d",
            probs.ndim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::TruthExpr;
    use crate::lazy::LazyGraph;
    use crate::norm::TNorm;
    use scirs2_core::ndarray::array;

    fn xor_expr() -> TruthExpr {
        TruthExpr::xor(TruthExpr::is(0, 1), TruthExpr::is(1, 1))
    }

    #[test]
    fn test_capability_mismatch_rejected() {
        // An opaque closure has no logical structure to relax.
        let pred = Predicate::from_fn(|y| y[0] == 0);
        let err = Constraint::new(pred, Solver::TNorm(TNormSolver::new(TNorm::Product)))
            .unwrap_err();
        assert!(matches!(err, ConstraintError::UnsupportedPredicate { .. }));

        // A lazy graph has no discrete calling convention.
        let pred = Predicate::lazy(LazyGraph::new());
        let err = Constraint::new(pred, Solver::BruteForce(BruteForceSolver::violation()))
            .unwrap_err();
        assert!(matches!(err, ConstraintError::UnsupportedPredicate { .. }));

        // A symbolic predicate is not a structured graph.
        let pred = Predicate::symbolic(xor_expr());
        let err = Constraint::new(
            pred,
            Solver::LazyTNorm(LazyTNormSolver::new(TNorm::Product)),
        )
        .unwrap_err();
        assert!(matches!(err, ConstraintError::UnsupportedPredicate { .. }));
    }

    #[test]
    fn test_symbolic_works_with_all_unstructured_solvers() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]].into_dyn();
        let solvers = [
            Solver::BruteForce(BruteForceSolver::violation()),
            Solver::Sampling(SamplingSolver::new(100).unwrap()),
            Solver::WeightedSampling(WeightedSamplingSolver::new(100).unwrap()),
            Solver::TNorm(TNormSolver::new(TNorm::Product)),
        ];
        for solver in solvers {
            let c = Constraint::new(Predicate::symbolic(xor_expr()), solver).unwrap();
            let eval = c.evaluate(&probs.view()).unwrap();
            assert!(eval.loss.is_finite());
            assert_eq!(eval.grad.shape(), probs.shape());
        }
    }

    #[test]
    fn test_wrong_rank_is_shape_error() {
        let c = Constraint::new(
            Predicate::symbolic(xor_expr()),
            Solver::BruteForce(BruteForceSolver::violation()),
        )
        .unwrap();
        let probs = array![[[0.5, 0.5], [0.5, 0.5]]].into_dyn();
        let err = c.evaluate(&probs.view()).unwrap_err();
        assert!(matches!(err, ConstraintError::Shape(_)));
    }

    #[test]
    fn test_lazy_constraint_end_to_end() {
        let mut g = LazyGraph::new();
        let uniq = g.unique_label(1);
        g.set_output(uniq);
        let c = Constraint::new(
            Predicate::lazy(g),
            Solver::LazyTNorm(LazyTNormSolver::new(TNorm::Product)),
        )
        .unwrap();
        let probs = array![[[0.9, 0.1], [0.1, 0.9], [0.8, 0.2]]].into_dyn();
        let eval = c.evaluate(&probs.view()).unwrap();
        assert!(eval.loss >= 0.0 && eval.loss < 0.5);
        assert_eq!(eval.grad.shape(), probs.shape());
        assert_eq!(eval.per_example.as_ref().map(|p| p.len()), Some(1));
    }
}
