//! Differentiable logical constraints over tensor-based predictors.
//!
//! Declarative predicates over discrete label assignments are translated into
//! loss terms with analytic gradients, so domain knowledge ("exactly one of
//! these labels", "these two positions must differ") can train a model
//! alongside ordinary supervised losses:
//! - Predicates as opaque closures, symbolic expressions, or lazy graphs
//! - Exact brute-force enumeration with satisfaction and violation losses
//! - Monte Carlo sampling estimators, plain and REINFORCE-weighted
//! - T-norm fuzzy relaxations (Product, Gödel, Łukasiewicz)
//! - Lazy structured evaluation for batched sequence constraints
//!
//! # Examples
//!
//! ```
//! use scirs2_core::ndarray::array;
//! use tensor_constraints::{
//!     BruteForceSolver, Constraint, Predicate, Solver, TruthExpr,
//! };
//!
//! // Exactly one of two positions carries label 1.
//! let xor = TruthExpr::xor(TruthExpr::is(0, 1), TruthExpr::is(1, 1));
//! let constraint = Constraint::new(
//!     Predicate::symbolic(xor),
//!     Solver::BruteForce(BruteForceSolver::violation()),
//! )?;
//!
//! let probs = array![[0.9, 0.1], [0.5, 0.5]].into_dyn();
//! let eval = constraint.evaluate(&probs.view())?;
//! assert!(eval.loss > 0.0);
//! # Ok::<(), tensor_constraints::ConstraintError>(())
//! ```

mod brute_force;
mod constraint;
mod error;
mod expr;
mod lazy;
mod norm;
mod numeric;
mod predicate;
mod sampling;
mod tnorm;

#[cfg(feature = "structured-logging")]
pub mod structured_logging;

pub use brute_force::{BruteForceMode, BruteForceSolver, DEFAULT_MAX_ASSIGNMENTS};
pub use constraint::{Constraint, Evaluation, Solver};
pub use error::{ConstraintError, ConstraintResult};
pub use expr::TruthExpr;
pub use lazy::{LazyGraph, LazyTNormSolver, NodeId};
pub use norm::TNorm;
pub use numeric::{softmax, softmax_backward, EPSILON};
pub use predicate::Predicate;
pub use sampling::{SamplingSolver, WeightedSamplingSolver};
pub use tnorm::{LossForm, TNormSolver};
