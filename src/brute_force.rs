//! Exhaustive enumeration solver.
//!
//! Enumerates every assignment of L labels to k free positions, evaluates the
//! predicate on each, and aggregates joint probability mass (positions are
//! treated as independent categoricals) into satisfying and violating totals.
//! Cost is O(L^k) predicate evaluations; the assignment space is bounded by an
//! explicit limit and exceeding it is an error, not a silent degradation.

use serde::{Deserialize, Serialize};

use scirs2_core::ndarray::{Array2, ArrayView2};

use crate::constraint::Evaluation;
use crate::error::{ConstraintError, ConstraintResult};
use crate::numeric::EPSILON;
use crate::predicate::Predicate;

/// Default bound on the enumerated assignment count.
pub const DEFAULT_MAX_ASSIGNMENTS: usize = 1 << 20;

/// Which side of the predicate the loss drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BruteForceMode {
    /// Loss = −ln(Σ satisfying mass): drives satisfying mass toward 1.
    Satisfaction,
    /// Loss = Σ violating mass: drives violating mass toward 0.
    Violation,
}

/// Exact solver over the full assignment space.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BruteForceSolver {
    /// Aggregation mode.
    pub mode: BruteForceMode,
    max_assignments: usize,
}

impl BruteForceSolver {
    /// Satisfaction-mode solver with the default enumeration limit.
    pub fn satisfaction() -> Self {
        Self {
            mode: BruteForceMode::Satisfaction,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
        }
    }

    /// Violation-mode solver with the default enumeration limit.
    pub fn violation() -> Self {
        Self {
            mode: BruteForceMode::Violation,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
        }
    }

    /// Solver with an explicit enumeration limit.
    pub fn with_limit(mode: BruteForceMode, max_assignments: usize) -> ConstraintResult<Self> {
        if max_assignments == 0 {
            return Err(ConstraintError::Config(
                "max_assignments must be positive".to_string(),
            ));
        }
        Ok(Self {
            mode,
            max_assignments,
        })
    }

    /// Number of assignments for a `(positions, labels)` distribution, or a
    /// scalability error when it exceeds the configured limit.
    fn assignment_count(&self, positions: usize, labels: usize) -> ConstraintResult<usize> {
        let exceeded = || ConstraintError::Scalability {
            positions,
            labels,
            limit: self.max_assignments,
        };
        let exp = u32::try_from(positions).map_err(|_| exceeded())?;
        let total = labels.checked_pow(exp).ok_or_else(exceeded)?;
        if total > self.max_assignments {
            return Err(exceeded());
        }
        Ok(total)
    }

    /// Enumerate the assignment space and compute loss and gradient.
    pub fn evaluate(
        &self,
        predicate: &Predicate,
        probs: &ArrayView2<'_, f64>,
    ) -> ConstraintResult<Evaluation> {
        let (positions, labels) = (probs.nrows(), probs.ncols());
        if labels == 0 {
            return Err(ConstraintError::Shape(
                "distribution has zero labels".to_string(),
            ));
        }
        if let Some(expr) = predicate.as_symbolic() {
            expr.validate(positions, labels)?;
        }
        let total = self.assignment_count(positions, labels)?;
        tracing::debug!(positions, labels, total, "enumerating assignment space");

        let mut sat_mass = 0.0;
        let mut viol_mass = 0.0;
        let mut sat_acc: Array2<f64> = Array2::zeros((positions, labels));
        let mut viol_acc: Array2<f64> = Array2::zeros((positions, labels));

        let mut assignment = vec![0usize; positions];
        let mut prefix = vec![1.0; positions + 1];
        let mut suffix = vec![1.0; positions + 1];
        for _ in 0..total {
            // Joint probability and leave-one-out products for the gradient.
            for i in 0..positions {
                prefix[i + 1] = prefix[i] * probs[[i, assignment[i]]];
            }
            for i in (0..positions).rev() {
                suffix[i] = suffix[i + 1] * probs[[i, assignment[i]]];
            }
            let joint = prefix[positions];

            let satisfied = predicate.holds(&assignment)?;
            let (mass, acc) = if satisfied {
                (&mut sat_mass, &mut sat_acc)
            } else {
                (&mut viol_mass, &mut viol_acc)
            };
            *mass += joint;
            for i in 0..positions {
                acc[[i, assignment[i]]] += prefix[i] * suffix[i + 1];
            }

            // Mixed-radix increment over the label alphabet.
            for digit in assignment.iter_mut().rev() {
                *digit += 1;
                if *digit < labels {
                    break;
                }
                *digit = 0;
            }
        }

        match self.mode {
            BruteForceMode::Satisfaction => {
                let denom = sat_mass + EPSILON;
                let loss = -denom.ln();
                let grad = sat_acc.mapv(|g| -g / denom);
                Ok(Evaluation::scalar(loss, grad.into_dyn()))
            }
            BruteForceMode::Violation => Ok(Evaluation::scalar(viol_mass, viol_acc.into_dyn())),
        }
    }
}
