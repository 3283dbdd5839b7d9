//! T-norm relaxation solver.
//!
//! Compiles nothing and enumerates nothing: the predicate's logical structure
//! is evaluated directly on probabilities as a continuous truth degree, so the
//! cost is linear in expression size and tensor size regardless of label
//! cardinality. The tradeoff is approximation error against the exact
//! brute-force probability semantics.

use serde::{Deserialize, Serialize};

use scirs2_core::ndarray::{Array2, ArrayView2};

use crate::constraint::Evaluation;
use crate::error::ConstraintResult;
use crate::expr::TruthExpr;
use crate::norm::TNorm;
use crate::numeric::EPSILON;

/// How a truth degree τ ∈ \[0,1\] is turned into a loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossForm {
    /// `1 − τ`. Bounded in \[0,1\]; the default.
    Linear,
    /// `−ln(τ + ε)`. Unbounded, with a sharper gradient while τ is small.
    LogBarrier,
}

impl LossForm {
    /// Loss value and its derivative with respect to τ.
    pub(crate) fn apply(&self, truth: f64) -> (f64, f64) {
        match self {
            LossForm::Linear => (1.0 - truth, -1.0),
            LossForm::LogBarrier => (-(truth + EPSILON).ln(), -1.0 / (truth + EPSILON)),
        }
    }
}

/// Solver that relaxes a symbolic predicate into a differentiable truth degree.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TNormSolver {
    /// The t-norm algebra interpreting the logical connectives.
    pub norm: TNorm,
    /// Conversion from truth degree to loss.
    pub loss_form: LossForm,
}

impl TNormSolver {
    /// Create a solver with the default linear loss form.
    pub fn new(norm: TNorm) -> Self {
        Self {
            norm,
            loss_form: LossForm::Linear,
        }
    }

    /// Create a solver with an explicit loss form.
    pub fn with_loss_form(norm: TNorm, loss_form: LossForm) -> Self {
        Self { norm, loss_form }
    }

    /// Evaluate the predicate against a `(positions, labels)` distribution.
    pub fn evaluate(
        &self,
        expr: &TruthExpr,
        probs: &ArrayView2<'_, f64>,
    ) -> ConstraintResult<Evaluation> {
        expr.validate(probs.nrows(), probs.ncols())?;

        let truth = expr.eval(probs, self.norm);
        let (loss, upstream) = self.loss_form.apply(truth);
        tracing::trace!(truth, loss, "t-norm relaxation evaluated");

        let mut grad = Array2::zeros((probs.nrows(), probs.ncols()));
        expr.backprop(probs, self.norm, upstream, &mut grad);

        Ok(Evaluation::scalar(loss, grad.into_dyn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray::array;

    fn xor() -> TruthExpr {
        TruthExpr::xor(TruthExpr::is(0, 1), TruthExpr::is(1, 1))
    }

    #[test]
    fn test_constant_true_zero_loss() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        for norm in [TNorm::Product, TNorm::Godel, TNorm::Lukasiewicz] {
            let solver = TNormSolver::new(norm);
            let eval = solver
                .evaluate(&TruthExpr::Const(true), &probs.view())
                .unwrap();
            assert_eq!(eval.loss, 0.0);
            assert!(eval.grad.iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    fn test_constant_false_maximal_loss() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        let solver = TNormSolver::new(TNorm::Product);
        let eval = solver
            .evaluate(&TruthExpr::Const(false), &probs.view())
            .unwrap();
        assert_eq!(eval.loss, 1.0);
    }

    #[test]
    fn test_satisfying_one_hot_zero_loss() {
        let probs = array![[1.0, 0.0], [0.0, 1.0]];
        let solver = TNormSolver::new(TNorm::Product);
        let eval = solver.evaluate(&xor(), &probs.view()).unwrap();
        assert!(eval.loss.abs() < 1e-9);
    }

    #[test]
    fn test_gradient_pushes_toward_satisfaction() {
        // Uniform start: increasing p(0,1) or p(1,1) alone raises the truth
        // degree of XOR only through the asymmetric terms; the sign of the
        // loss gradient must favor the satisfying directions once the other
        // position commits.
        let probs = array![[0.9, 0.1], [0.5, 0.5]];
        let solver = TNormSolver::new(TNorm::Product);
        let eval = solver.evaluate(&xor(), &probs.view()).unwrap();
        // Position 0 leans to label 0, so XOR wants position 1 at label 1:
        // descending the loss must raise p(1,1) and push p(0,1) further down.
        assert!(eval.grad[[1, 1]] < 0.0);
        assert!(eval.grad[[0, 1]] > 0.0);
        // The tree never references label 0, so that entry carries no signal.
        assert_eq!(eval.grad[[1, 0]], 0.0);
    }

    #[test]
    fn test_log_barrier_sharper_than_linear() {
        let probs = array![[0.05, 0.95], [0.05, 0.95]];
        let linear = TNormSolver::new(TNorm::Product)
            .evaluate(&xor(), &probs.view())
            .unwrap();
        let log = TNormSolver::with_loss_form(TNorm::Product, LossForm::LogBarrier)
            .evaluate(&xor(), &probs.view())
            .unwrap();
        // Truth degree is low here, so the log form amplifies both the loss
        // and the gradient magnitude.
        assert!(log.loss > linear.loss);
        let lin_norm: f64 = linear.grad.iter().map(|g| g.abs()).sum();
        let log_norm: f64 = log.grad.iter().map(|g| g.abs()).sum();
        assert!(log_norm > lin_norm);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let expr = xor();
        let probs = array![[0.6, 0.4], [0.3, 0.7]];
        let solver = TNormSolver::new(TNorm::Product);
        let eval = solver.evaluate(&expr, &probs.view()).unwrap();

        let h = 1e-6;
        for i in 0..2 {
            for j in 0..2 {
                let mut plus = probs.clone();
                plus[[i, j]] += h;
                let mut minus = probs.clone();
                minus[[i, j]] -= h;
                let lp = solver.evaluate(&expr, &plus.view()).unwrap().loss;
                let lm = solver.evaluate(&expr, &minus.view()).unwrap().loss;
                let fd = (lp - lm) / (2.0 * h);
                assert!((eval.grad[[i, j]] - fd).abs() < 1e-6);
            }
        }
    }
}
