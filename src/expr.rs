//! Symbolic predicate expressions over discrete label assignments.
//!
//! A [`TruthExpr`] states a constraint compositionally from primitive label
//! relations and logical connectives. The same tree supports two evaluation
//! modes:
//!
//! - **Discrete** ([`TruthExpr::holds`]): classical boolean evaluation against
//!   a concrete assignment, used by the enumeration and sampling solvers.
//! - **Relaxed** ([`TruthExpr::eval`]): a continuous truth degree in \[0,1\]
//!   computed directly from per-position probability vectors under a chosen
//!   [`TNorm`], without enumerating assignments. The truth degree of
//!   "position i holds label ℓ" is the probability mass at ℓ.

use serde::{Deserialize, Serialize};

use scirs2_core::ndarray::{Array2, ArrayView2};

use crate::error::{ConstraintError, ConstraintResult};
use crate::norm::TNorm;

/// A boolean-valued expression over the free output positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TruthExpr {
    /// Position `position` is assigned label `label`.
    Holds {
        /// Free position index.
        position: usize,
        /// Label index.
        label: usize,
    },
    /// Two positions hold the same label.
    Eq(usize, usize),
    /// Constant truth value.
    Const(bool),
    /// Conjunction.
    And(Box<TruthExpr>, Box<TruthExpr>),
    /// Disjunction.
    Or(Box<TruthExpr>, Box<TruthExpr>),
    /// Negation.
    Not(Box<TruthExpr>),
}

impl TruthExpr {
    /// Primitive: position `position` holds `label`.
    pub fn is(position: usize, label: usize) -> Self {
        TruthExpr::Holds { position, label }
    }

    /// Primitive: positions `a` and `b` hold the same label.
    pub fn eq(a: usize, b: usize) -> Self {
        TruthExpr::Eq(a, b)
    }

    /// Positions `a` and `b` hold different labels.
    pub fn ne(a: usize, b: usize) -> Self {
        Self::negate(Self::eq(a, b))
    }

    /// Conjunction of two expressions.
    pub fn and(left: TruthExpr, right: TruthExpr) -> Self {
        TruthExpr::And(Box::new(left), Box::new(right))
    }

    /// Disjunction of two expressions.
    pub fn or(left: TruthExpr, right: TruthExpr) -> Self {
        TruthExpr::Or(Box::new(left), Box::new(right))
    }

    /// Negation of an expression.
    pub fn negate(expr: TruthExpr) -> Self {
        TruthExpr::Not(Box::new(expr))
    }

    /// Material implication `premise → conclusion`, i.e. `¬premise ∨ conclusion`.
    pub fn implies(premise: TruthExpr, conclusion: TruthExpr) -> Self {
        Self::or(Self::negate(premise.clone()), conclusion)
    }

    /// Exclusive or: `(a ∧ ¬b) ∨ (¬a ∧ b)`.
    pub fn xor(a: TruthExpr, b: TruthExpr) -> Self {
        Self::or(
            Self::and(a.clone(), Self::negate(b.clone())),
            Self::and(Self::negate(a), b),
        )
    }

    /// Classical boolean evaluation against a concrete assignment.
    ///
    /// `assignment[i]` is the label of position `i`. Positions referenced by
    /// the expression must be in range; use [`TruthExpr::validate`] first.
    pub fn holds(&self, assignment: &[usize]) -> bool {
        match self {
            TruthExpr::Holds { position, label } => assignment[*position] == *label,
            TruthExpr::Eq(a, b) => assignment[*a] == assignment[*b],
            TruthExpr::Const(v) => *v,
            TruthExpr::And(l, r) => l.holds(assignment) && r.holds(assignment),
            TruthExpr::Or(l, r) => l.holds(assignment) || r.holds(assignment),
            TruthExpr::Not(e) => !e.holds(assignment),
        }
    }

    /// Check every referenced position and label against a distribution of
    /// shape `(positions, labels)`.
    pub fn validate(&self, positions: usize, labels: usize) -> ConstraintResult<()> {
        match self {
            TruthExpr::Holds { position, label } => {
                if *position >= positions {
                    return Err(ConstraintError::Shape(format!(
                        "predicate references position {position} but the distribution has {positions} positions"
                    )));
                }
                if *label >= labels {
                    return Err(ConstraintError::Shape(format!(
                        "predicate references label {label} but the distribution has {labels} labels"
                    )));
                }
                Ok(())
            }
            TruthExpr::Eq(a, b) => {
                for p in [a, b] {
                    if *p >= positions {
                        return Err(ConstraintError::Shape(format!(
                            "predicate references position {p} but the distribution has {positions} positions"
                        )));
                    }
                }
                Ok(())
            }
            TruthExpr::Const(_) => Ok(()),
            TruthExpr::And(l, r) | TruthExpr::Or(l, r) => {
                l.validate(positions, labels)?;
                r.validate(positions, labels)
            }
            TruthExpr::Not(e) => e.validate(positions, labels),
        }
    }

    /// Continuous truth degree under `norm`, given per-position probability
    /// rows of shape `(positions, labels)`.
    pub fn eval(&self, probs: &ArrayView2<'_, f64>, norm: TNorm) -> f64 {
        match self {
            TruthExpr::Holds { position, label } => probs[[*position, *label]],
            TruthExpr::Eq(a, b) => {
                // Fold OR over per-label conjunctions: ∨_ℓ (a=ℓ ∧ b=ℓ).
                let mut acc = 0.0;
                for l in 0..probs.ncols() {
                    let t = norm.and(probs[[*a, l]], probs[[*b, l]]);
                    acc = norm.or(acc, t);
                }
                acc
            }
            TruthExpr::Const(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            TruthExpr::And(l, r) => norm.and(l.eval(probs, norm), r.eval(probs, norm)),
            TruthExpr::Or(l, r) => norm.or(l.eval(probs, norm), r.eval(probs, norm)),
            TruthExpr::Not(e) => norm.not(e.eval(probs, norm)),
        }
    }

    /// Accumulate `upstream * d(truth)/d(probs)` into `grad`.
    ///
    /// Child values are recomputed on the way down; predicate trees are small
    /// so the quadratic recomputation is cheaper than caching machinery.
    pub fn backprop(
        &self,
        probs: &ArrayView2<'_, f64>,
        norm: TNorm,
        upstream: f64,
        grad: &mut Array2<f64>,
    ) {
        if upstream == 0.0 {
            return;
        }
        match self {
            TruthExpr::Holds { position, label } => {
                grad[[*position, *label]] += upstream;
            }
            TruthExpr::Eq(a, b) => {
                // Replay the OR fold, then walk it backwards.
                let labels = probs.ncols();
                let mut accs = Vec::with_capacity(labels + 1);
                accs.push(0.0);
                for l in 0..labels {
                    let t = norm.and(probs[[*a, l]], probs[[*b, l]]);
                    accs.push(norm.or(accs[l], t));
                }
                let mut d_acc = upstream;
                for l in (0..labels).rev() {
                    let pa = probs[[*a, l]];
                    let pb = probs[[*b, l]];
                    let t = norm.and(pa, pb);
                    let (d_prev, d_t) = norm.or_grad(accs[l], t);
                    let (d_pa, d_pb) = norm.and_grad(pa, pb);
                    grad[[*a, l]] += d_acc * d_t * d_pa;
                    grad[[*b, l]] += d_acc * d_t * d_pb;
                    d_acc *= d_prev;
                    if d_acc == 0.0 {
                        break;
                    }
                }
            }
            TruthExpr::Const(_) => {}
            TruthExpr::And(l, r) => {
                let lv = l.eval(probs, norm);
                let rv = r.eval(probs, norm);
                let (dl, dr) = norm.and_grad(lv, rv);
                l.backprop(probs, norm, upstream * dl, grad);
                r.backprop(probs, norm, upstream * dr, grad);
            }
            TruthExpr::Or(l, r) => {
                let lv = l.eval(probs, norm);
                let rv = r.eval(probs, norm);
                let (dl, dr) = norm.or_grad(lv, rv);
                l.backprop(probs, norm, upstream * dl, grad);
                r.backprop(probs, norm, upstream * dr, grad);
            }
            TruthExpr::Not(e) => {
                e.backprop(probs, norm, -upstream, grad);
            }
        }
    }
}
