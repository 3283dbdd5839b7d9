//! Monte Carlo sampling solvers.
//!
//! Both solvers draw `num_samples` assignments by sampling every position
//! independently from its categorical row, and use the violating fraction as
//! the loss estimate. They differ in the gradient path:
//!
//! - [`SamplingSolver`] carries no analytic gradient: the violating count is
//!   piecewise constant in the probabilities. It is only useful when an
//!   external relaxed or reparameterized sampling op supplies the gradient.
//! - [`WeightedSamplingSolver`] weights each violating sample by the gradient
//!   of its own joint log-probability (a REINFORCE-style estimator), so signal
//!   keeps flowing even when sampling diverges from the true distribution.
//!   Its gradient converges to the brute-force violation gradient as the
//!   sample count grows.
//!
//! Sampling is reseeded per invocation from the configured seed: evaluation is
//! a pure function of (predicate, distribution, seed) and holds no cross-call
//! state. Very small sample counts yield high-variance, possibly zero,
//! gradient signal; that is a documented tradeoff, not a bug.

use serde::{Deserialize, Serialize};

use scirs2_core::ndarray::{Array2, ArrayView2};
use scirs2_core::random::{Rng, SeedableRng, StdRng};

use crate::constraint::Evaluation;
use crate::error::{ConstraintError, ConstraintResult};
use crate::numeric::EPSILON;
use crate::predicate::Predicate;

const DEFAULT_SEED: u64 = 42;

fn check_num_samples(num_samples: usize) -> ConstraintResult<()> {
    if num_samples == 0 {
        return Err(ConstraintError::Config(
            "num_samples must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Draw one assignment, one categorical draw per position.
fn sample_assignment(probs: &ArrayView2<'_, f64>, rng: &mut StdRng, out: &mut [usize]) {
    for i in 0..probs.nrows() {
        let u: f64 = rng.random();
        let mut cum = 0.0;
        // Rounding can leave u above the final cumulative sum; the last
        // label absorbs the remainder.
        out[i] = probs.ncols() - 1;
        for l in 0..probs.ncols() {
            cum += probs[[i, l]];
            if u < cum {
                out[i] = l;
                break;
            }
        }
    }
}

fn validate(predicate: &Predicate, probs: &ArrayView2<'_, f64>) -> ConstraintResult<()> {
    if probs.ncols() == 0 {
        return Err(ConstraintError::Shape(
            "distribution has zero labels".to_string(),
        ));
    }
    if let Some(expr) = predicate.as_symbolic() {
        expr.validate(probs.nrows(), probs.ncols())?;
    }
    Ok(())
}

/// Plain Monte Carlo estimator of the violating probability mass.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SamplingSolver {
    /// Number of assignments drawn per evaluation.
    pub num_samples: usize,
    seed: u64,
}

impl SamplingSolver {
    /// Create an estimator with the default seed.
    pub fn new(num_samples: usize) -> ConstraintResult<Self> {
        Self::with_seed(num_samples, DEFAULT_SEED)
    }

    /// Create an estimator with an explicit seed.
    pub fn with_seed(num_samples: usize, seed: u64) -> ConstraintResult<Self> {
        check_num_samples(num_samples)?;
        Ok(Self { num_samples, seed })
    }

    /// Estimate the violating fraction. The gradient is identically zero.
    pub fn evaluate(
        &self,
        predicate: &Predicate,
        probs: &ArrayView2<'_, f64>,
    ) -> ConstraintResult<Evaluation> {
        validate(predicate, probs)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut assignment = vec![0usize; probs.nrows()];

        let mut violations = 0usize;
        for _ in 0..self.num_samples {
            sample_assignment(probs, &mut rng, &mut assignment);
            if !predicate.holds(&assignment)? {
                violations += 1;
            }
        }
        let loss = violations as f64 / self.num_samples as f64;
        tracing::trace!(violations, samples = self.num_samples, "sampling estimate");

        let grad = Array2::<f64>::zeros((probs.nrows(), probs.ncols()));
        Ok(Evaluation::scalar(loss, grad.into_dyn()))
    }
}

/// Importance-weighted Monte Carlo estimator with a REINFORCE gradient.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WeightedSamplingSolver {
    /// Number of assignments drawn per evaluation.
    pub num_samples: usize,
    seed: u64,
}

impl WeightedSamplingSolver {
    /// Create an estimator with the default seed.
    pub fn new(num_samples: usize) -> ConstraintResult<Self> {
        Self::with_seed(num_samples, DEFAULT_SEED)
    }

    /// Create an estimator with an explicit seed.
    pub fn with_seed(num_samples: usize, seed: u64) -> ConstraintResult<Self> {
        check_num_samples(num_samples)?;
        Ok(Self { num_samples, seed })
    }

    /// Estimate the violating fraction; the gradient averages
    /// `∇ log p(sample)` over violating samples, which is an unbiased
    /// estimator of the brute-force violation gradient.
    pub fn evaluate(
        &self,
        predicate: &Predicate,
        probs: &ArrayView2<'_, f64>,
    ) -> ConstraintResult<Evaluation> {
        validate(predicate, probs)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut assignment = vec![0usize; probs.nrows()];

        let mut violations = 0usize;
        let mut grad = Array2::<f64>::zeros((probs.nrows(), probs.ncols()));
        for _ in 0..self.num_samples {
            sample_assignment(probs, &mut rng, &mut assignment);
            if !predicate.holds(&assignment)? {
                violations += 1;
                for (i, &label) in assignment.iter().enumerate() {
                    grad[[i, label]] += 1.0 / (probs[[i, label]] + EPSILON);
                }
            }
        }
        let n = self.num_samples as f64;
        let loss = violations as f64 / n;
        grad.mapv_inplace(|g| g / n);

        Ok(Evaluation::scalar(loss, grad.into_dyn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force::BruteForceSolver;
    use crate::expr::TruthExpr;
    use scirs2_core::ndarray::array;

    fn xor_pred() -> Predicate {
        Predicate::symbolic(TruthExpr::xor(TruthExpr::is(0, 1), TruthExpr::is(1, 1)))
    }

    #[test]
    fn test_zero_samples_rejected() {
        assert!(SamplingSolver::new(0).is_err());
        assert!(WeightedSamplingSolver::new(0).is_err());
    }

    #[test]
    fn test_constant_predicates() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        let always = Predicate::from_fn(|_| true);
        let never = Predicate::from_fn(|_| false);

        let solver = SamplingSolver::new(100).unwrap();
        assert_eq!(solver.evaluate(&always, &probs.view()).unwrap().loss, 0.0);
        assert_eq!(solver.evaluate(&never, &probs.view()).unwrap().loss, 1.0);

        let solver = WeightedSamplingSolver::new(100).unwrap();
        assert_eq!(solver.evaluate(&always, &probs.view()).unwrap().loss, 0.0);
        assert_eq!(solver.evaluate(&never, &probs.view()).unwrap().loss, 1.0);
    }

    #[test]
    fn test_basic_gradient_is_zero() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        let eval = SamplingSolver::new(50)
            .unwrap()
            .evaluate(&xor_pred(), &probs.view())
            .unwrap();
        assert!(eval.grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_deterministic_per_seed() {
        let probs = array![[0.5, 0.5], [0.3, 0.7]];
        let a = SamplingSolver::with_seed(200, 7).unwrap();
        let l1 = a.evaluate(&xor_pred(), &probs.view()).unwrap().loss;
        let l2 = a.evaluate(&xor_pred(), &probs.view()).unwrap().loss;
        assert_eq!(l1, l2);
    }

    #[test]
    fn test_loss_converges_to_violating_mass() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        let exact = BruteForceSolver::violation()
            .evaluate(&xor_pred(), &probs.view())
            .unwrap()
            .loss;
        let mut total = 0.0;
        let seeds = [3, 11, 29];
        for seed in seeds {
            let solver = WeightedSamplingSolver::with_seed(20_000, seed).unwrap();
            total += solver.evaluate(&xor_pred(), &probs.view()).unwrap().loss;
        }
        let mean = total / seeds.len() as f64;
        assert!((mean - exact).abs() < 0.02, "mean {mean} vs exact {exact}");
    }

    #[test]
    fn test_weighted_gradient_converges_to_brute_force() {
        let probs = array![[0.7, 0.3], [0.4, 0.6]];
        let exact = BruteForceSolver::violation()
            .evaluate(&xor_pred(), &probs.view())
            .unwrap();
        let solver = WeightedSamplingSolver::with_seed(50_000, 13).unwrap();
        let est = solver.evaluate(&xor_pred(), &probs.view()).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!(
                    (est.grad[[i, j]] - exact.grad[[i, j]]).abs() < 0.05,
                    "grad mismatch at ({i},{j}): {} vs {}",
                    est.grad[[i, j]],
                    exact.grad[[i, j]]
                );
            }
        }
    }
}
