//! Predicate adapter: one constraint definition, several calling conventions.
//!
//! A predicate declares the calling conventions it supports at construction
//! time; solvers never introspect it structurally at call time. Opaque
//! closures only support discrete-assignment evaluation, symbolic expressions
//! support both discrete and relaxed evaluation, and lazy graphs support only
//! the structured lazy solver.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConstraintError, ConstraintResult};
use crate::expr::TruthExpr;
use crate::lazy::LazyGraph;

/// A user-supplied constraint over discrete label assignments.
#[derive(Clone)]
pub enum Predicate {
    /// Opaque boolean callable over a concrete assignment. `assignment[i]`
    /// is the label drawn for position `i`; the callable indexes it under
    /// its own arity contract.
    Discrete(Arc<dyn Fn(&[usize]) -> bool + Send + Sync>),
    /// Compositional logical expression; usable discretely or relaxed.
    Symbolic(TruthExpr),
    /// Deferred broadcasting expression graph over structured outputs.
    Lazy(LazyGraph),
}

impl Predicate {
    /// Wrap an opaque boolean function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[usize]) -> bool + Send + Sync + 'static,
    {
        Predicate::Discrete(Arc::new(f))
    }

    /// Wrap a symbolic expression.
    pub fn symbolic(expr: TruthExpr) -> Self {
        Predicate::Symbolic(expr)
    }

    /// Wrap a lazy expression graph.
    pub fn lazy(graph: LazyGraph) -> Self {
        Predicate::Lazy(graph)
    }

    /// Evaluate against a concrete assignment.
    ///
    /// Fails for lazy predicates, which have no discrete calling convention.
    pub fn holds(&self, assignment: &[usize]) -> ConstraintResult<bool> {
        match self {
            Predicate::Discrete(f) => Ok(f(assignment)),
            Predicate::Symbolic(expr) => Ok(expr.holds(assignment)),
            Predicate::Lazy(_) => Err(ConstraintError::UnsupportedPredicate {
                solver: "discrete-assignment",
            }),
        }
    }

    /// The symbolic expression, if this predicate carries one.
    pub fn as_symbolic(&self) -> Option<&TruthExpr> {
        match self {
            Predicate::Symbolic(expr) => Some(expr),
            _ => None,
        }
    }

    /// The lazy graph, if this predicate carries one.
    pub fn as_lazy(&self) -> Option<&LazyGraph> {
        match self {
            Predicate::Lazy(graph) => Some(graph),
            _ => None,
        }
    }

    /// True if the predicate can be called with a discrete assignment.
    pub fn supports_discrete(&self) -> bool {
        !matches!(self, Predicate::Lazy(_))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Discrete(_) => f.write_str("Predicate::Discrete(<fn>)"),
            Predicate::Symbolic(expr) => f.debug_tuple("Predicate::Symbolic").field(expr).finish(),
            Predicate::Lazy(graph) => f.debug_tuple("Predicate::Lazy").field(graph).finish(),
        }
    }
}
