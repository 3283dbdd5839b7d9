//! T-norm algebras for continuous truth degrees.
//!
//! A t-norm generalizes boolean conjunction to truth degrees in \[0,1\]. Each
//! variant here carries the matching t-conorm (fuzzy OR) and the standard
//! negation `1 - a`, together with the partial derivatives the solvers need
//! for analytic backpropagation. At the boundary values {0,1} every variant
//! reduces to the classical boolean truth tables; they differ only in the
//! continuous interior.

use serde::{Deserialize, Serialize};

/// Selectable t-norm algebra.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TNorm {
    /// Product t-norm: AND(a,b) = a·b, OR(a,b) = a + b − a·b.
    /// Probabilistic interpretation under independence.
    Product,
    /// Gödel (minimum) t-norm: AND(a,b) = min(a,b), OR(a,b) = max(a,b).
    Godel,
    /// Łukasiewicz t-norm: AND(a,b) = max(0, a+b−1), OR(a,b) = min(1, a+b).
    Lukasiewicz,
}

impl TNorm {
    /// Fuzzy conjunction of two truth degrees.
    pub fn and(&self, a: f64, b: f64) -> f64 {
        match self {
            TNorm::Product => a * b,
            TNorm::Godel => a.min(b),
            TNorm::Lukasiewicz => (a + b - 1.0).max(0.0),
        }
    }

    /// Fuzzy disjunction of two truth degrees.
    pub fn or(&self, a: f64, b: f64) -> f64 {
        match self {
            TNorm::Product => a + b - a * b,
            TNorm::Godel => a.max(b),
            TNorm::Lukasiewicz => (a + b).min(1.0),
        }
    }

    /// Fuzzy negation. Identical across the three algebras.
    pub fn not(&self, a: f64) -> f64 {
        1.0 - a
    }

    /// Partial derivatives of `and(a, b)` with respect to `(a, b)`.
    ///
    /// Gödel and Łukasiewicz are piecewise linear; at their kinks this
    /// returns a subgradient (ties route to the first operand).
    pub fn and_grad(&self, a: f64, b: f64) -> (f64, f64) {
        match self {
            TNorm::Product => (b, a),
            TNorm::Godel => {
                if a <= b {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            }
            TNorm::Lukasiewicz => {
                if a + b > 1.0 {
                    (1.0, 1.0)
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }

    /// Partial derivatives of `or(a, b)` with respect to `(a, b)`.
    pub fn or_grad(&self, a: f64, b: f64) -> (f64, f64) {
        match self {
            TNorm::Product => (1.0 - b, 1.0 - a),
            TNorm::Godel => {
                if a >= b {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            }
            TNorm::Lukasiewicz => {
                if a + b < 1.0 {
                    (1.0, 1.0)
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }
}
