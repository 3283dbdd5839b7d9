//! Lazy structured evaluator for constraints over sequence outputs.
//!
//! Predicates that compare every position against every other position (the
//! "no two positions may both hold label ℓ" family) would materialize a
//! quadratic tensor if written eagerly against a generic runtime. Here the
//! binary and comparison operators are deferred into an explicit expression
//! graph: an arena of operator nodes referenced by index, built eagerly
//! through builder methods, then evaluated in one deterministic bottom-up pass
//! with shape propagation and differentiated in one reverse pass. Broadcasting
//! is shape-aware, so the pairwise structure stays implicit until the single
//! expansion node that needs it.
//!
//! The pairwise expansion masks the diagonal of the self-comparison in log
//! space: probabilities get an epsilon floor before the log, a large negative
//! offset on the diagonal, and are exponentiated back, so every position
//! compares against all *other* positions with self-comparisons contributing
//! truth degree ≈ 0.

use serde::{Deserialize, Serialize};

use scirs2_core::ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, ArrayViewMut1, Axis, IxDyn, Zip};

use crate::constraint::Evaluation;
use crate::error::{ConstraintError, ConstraintResult};
use crate::norm::TNorm;
use crate::numeric::{stable_exp, stable_ln};
use crate::tnorm::LossForm;

/// Log-space offset that suppresses diagonal self-comparisons.
const DIAG_MASK: f64 = -1e6;

/// Index of a node in a [`LazyGraph`] arena.
pub type NodeId = usize;

#[derive(Clone, Debug, Serialize, Deserialize)]
enum LazyOp {
    /// The probability tensor supplied at evaluation time.
    Input,
    /// Slice of the last axis: `x[..., label]`.
    Select { src: NodeId, label: usize },
    /// `(batch, seq, labels)` → `(batch, seq, seq, labels)` where entry
    /// `[b, i, j, l]` is the probability of position `j` holding `l`,
    /// with the `i == j` diagonal masked out.
    PairwiseExpand { src: NodeId },
    /// Fuzzy negation, elementwise.
    Not { src: NodeId },
    /// Fuzzy conjunction, broadcasting.
    And { lhs: NodeId, rhs: NodeId },
    /// Fuzzy disjunction, broadcasting.
    Or { lhs: NodeId, rhs: NodeId },
    /// S-implication `¬premise ∨ conclusion`, broadcasting.
    Implies { premise: NodeId, conclusion: NodeId },
    /// Universal fold of the t-norm AND along one axis.
    All { src: NodeId, axis: usize },
    /// Existential fold of the t-norm OR along one axis.
    Any { src: NodeId, axis: usize },
}

/// Deferred truth-degree expression graph over a structured output tensor.
///
/// Node ids are arena indices; children always precede parents, so a single
/// forward sweep is topologically ordered by construction. Builder methods
/// only accept ids handed out by the same graph's builders and panic on any
/// other id; ids never cross graphs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LazyGraph {
    nodes: Vec<LazyOp>,
    output: Option<NodeId>,
}

impl Default for LazyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyGraph {
    /// Create a graph holding only the input node.
    pub fn new() -> Self {
        Self {
            nodes: vec![LazyOp::Input],
            output: None,
        }
    }

    /// Id of the input tensor node.
    pub fn input(&self) -> NodeId {
        0
    }

    fn push(&mut self, op: LazyOp) -> NodeId {
        self.nodes.push(op);
        self.nodes.len() - 1
    }

    fn check(&self, id: NodeId) {
        assert!(id < self.nodes.len(), "unknown node id {id}");
    }

    /// Slice out one label along the last axis.
    pub fn select(&mut self, src: NodeId, label: usize) -> NodeId {
        self.check(src);
        self.push(LazyOp::Select { src, label })
    }

    /// Expand a `(batch, seq, labels)` tensor to its diagonal-masked
    /// `(batch, seq, seq, labels)` compare-to-all form.
    pub fn pairwise(&mut self, src: NodeId) -> NodeId {
        self.check(src);
        self.push(LazyOp::PairwiseExpand { src })
    }

    /// Fuzzy negation.
    pub fn not(&mut self, src: NodeId) -> NodeId {
        self.check(src);
        self.push(LazyOp::Not { src })
    }

    /// Fuzzy conjunction with broadcasting.
    pub fn and(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.check(lhs);
        self.check(rhs);
        self.push(LazyOp::And { lhs, rhs })
    }

    /// Fuzzy disjunction with broadcasting.
    pub fn or(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.check(lhs);
        self.check(rhs);
        self.push(LazyOp::Or { lhs, rhs })
    }

    /// S-implication `premise → conclusion`.
    pub fn implies(&mut self, premise: NodeId, conclusion: NodeId) -> NodeId {
        self.check(premise);
        self.check(conclusion);
        self.push(LazyOp::Implies {
            premise,
            conclusion,
        })
    }

    /// Universal quantification along `axis`.
    pub fn all(&mut self, src: NodeId, axis: usize) -> NodeId {
        self.check(src);
        self.push(LazyOp::All { src, axis })
    }

    /// Existential quantification along `axis`.
    pub fn any(&mut self, src: NodeId, axis: usize) -> NodeId {
        self.check(src);
        self.push(LazyOp::Any { src, axis })
    }

    /// Mark the node whose value is the predicate's truth degree. Must be a
    /// per-batch vector once evaluated.
    pub fn set_output(&mut self, id: NodeId) {
        self.check(id);
        self.output = Some(id);
    }

    /// The designated output node, if one was set.
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Exclusivity builder: truth degree of "at most one position holds
    /// `label`", reduced to a per-batch vector. For each position i the
    /// implication `P(i = label) → ¬∃ j≠i. P(j = label)` is folded over all
    /// positions.
    pub fn unique_label(&mut self, label: usize) -> NodeId {
        let y = self.input();
        let holder = self.select(y, label);
        let ext = self.pairwise(y);
        let others = self.select(ext, label);
        let not_others = self.not(others);
        let none_other = self.all(not_others, 2);
        let unique = self.implies(holder, none_other);
        self.all(unique, 1)
    }

    /// Evaluate every node bottom-up, returning the per-node values.
    pub(crate) fn forward(
        &self,
        probs: &ArrayViewD<'_, f64>,
        norm: TNorm,
    ) -> ConstraintResult<Vec<ArrayD<f64>>> {
        let mut values: Vec<ArrayD<f64>> = Vec::with_capacity(self.nodes.len());
        for op in &self.nodes {
            let value = match op {
                LazyOp::Input => probs.to_owned(),
                LazyOp::Select { src, label } => {
                    let v = &values[*src];
                    if v.ndim() == 0 {
                        return Err(ConstraintError::Shape(
                            "cannot select a label from a scalar node".to_string(),
                        ));
                    }
                    let last = v.ndim() - 1;
                    if *label >= v.shape()[last] {
                        return Err(ConstraintError::Shape(format!(
                            "label {label} out of range for axis of length {}",
                            v.shape()[last]
                        )));
                    }
                    v.index_axis(Axis(last), *label).to_owned()
                }
                LazyOp::PairwiseExpand { src } => pairwise_forward(&values[*src])?,
                LazyOp::Not { src } => values[*src].mapv(|x| norm.not(x)),
                LazyOp::And { lhs, rhs } | LazyOp::Or { lhs, rhs } => {
                    binary_forward(op, norm, &values[*lhs], &values[*rhs])?
                }
                LazyOp::Implies {
                    premise,
                    conclusion,
                } => binary_forward(op, norm, &values[*premise], &values[*conclusion])?,
                LazyOp::All { src, axis } => {
                    let v = &values[*src];
                    check_axis(v, *axis)?;
                    v.map_axis(Axis(*axis), |lane| all_value(norm, &lane))
                }
                LazyOp::Any { src, axis } => {
                    let v = &values[*src];
                    check_axis(v, *axis)?;
                    v.map_axis(Axis(*axis), |lane| any_value(norm, &lane))
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Reverse pass: distribute the output adjoint down to the input tensor.
    pub(crate) fn backward(
        &self,
        values: &[ArrayD<f64>],
        norm: TNorm,
        output: NodeId,
        seed: ArrayD<f64>,
    ) -> ConstraintResult<ArrayD<f64>> {
        let mut adjoints: Vec<Option<ArrayD<f64>>> = vec![None; self.nodes.len()];
        adjoints[output] = Some(seed);

        for id in (1..self.nodes.len()).rev() {
            let adj = match adjoints[id].take() {
                Some(a) => a,
                None => continue,
            };
            match &self.nodes[id] {
                LazyOp::Input => unreachable!("input is node 0"),
                LazyOp::Select { src, label } => {
                    let v = &values[*src];
                    let last = v.ndim() - 1;
                    let mut g = ArrayD::zeros(v.raw_dim());
                    g.index_axis_mut(Axis(last), *label).assign(&adj);
                    accumulate(&mut adjoints, *src, g);
                }
                LazyOp::PairwiseExpand { src } => {
                    accumulate(&mut adjoints, *src, pairwise_backward(&values[*src], &adj));
                }
                LazyOp::Not { src } => {
                    accumulate(&mut adjoints, *src, adj.mapv(|a| -a));
                }
                op @ (LazyOp::And { lhs, rhs } | LazyOp::Or { lhs, rhs }) => {
                    let (ga, gb) = binary_backward(op, norm, &values[*lhs], &values[*rhs], &adj)?;
                    accumulate(&mut adjoints, *lhs, ga);
                    accumulate(&mut adjoints, *rhs, gb);
                }
                op @ LazyOp::Implies {
                    premise,
                    conclusion,
                } => {
                    let (ga, gb) =
                        binary_backward(op, norm, &values[*premise], &values[*conclusion], &adj)?;
                    accumulate(&mut adjoints, *premise, ga);
                    accumulate(&mut adjoints, *conclusion, gb);
                }
                LazyOp::All { src, axis } => {
                    let v = &values[*src];
                    let mut g = ArrayD::zeros(v.raw_dim());
                    Zip::from(v.lanes(Axis(*axis)))
                        .and(g.lanes_mut(Axis(*axis)))
                        .and(&adj)
                        .for_each(|lane, glane, &a| all_backward(norm, &lane, glane, a));
                    accumulate(&mut adjoints, *src, g);
                }
                LazyOp::Any { src, axis } => {
                    let v = &values[*src];
                    let mut g = ArrayD::zeros(v.raw_dim());
                    Zip::from(v.lanes(Axis(*axis)))
                        .and(g.lanes_mut(Axis(*axis)))
                        .and(&adj)
                        .for_each(|lane, glane, &a| any_backward(norm, &lane, glane, a));
                    accumulate(&mut adjoints, *src, g);
                }
            }
        }

        Ok(adjoints[0]
            .take()
            .unwrap_or_else(|| ArrayD::zeros(values[0].raw_dim())))
    }

    /// Convenience: truth degree of the output node for a given input.
    pub fn truth(&self, probs: &ArrayViewD<'_, f64>, norm: TNorm) -> ConstraintResult<ArrayD<f64>> {
        let output = self.output.ok_or_else(|| {
            ConstraintError::Config("lazy predicate graph has no output node".to_string())
        })?;
        let mut values = self.forward(probs, norm)?;
        Ok(values.swap_remove(output))
    }
}

fn accumulate(adjoints: &mut [Option<ArrayD<f64>>], id: NodeId, contrib: ArrayD<f64>) {
    match &mut adjoints[id] {
        Some(a) => *a += &contrib,
        slot => *slot = Some(contrib),
    }
}

fn check_axis(v: &ArrayD<f64>, axis: usize) -> ConstraintResult<()> {
    if axis >= v.ndim() {
        return Err(ConstraintError::Shape(format!(
            "fold axis {axis} out of range for a {}-d tensor",
            v.ndim()
        )));
    }
    Ok(())
}

fn pairwise_forward(v: &ArrayD<f64>) -> ConstraintResult<ArrayD<f64>> {
    if v.ndim() != 3 {
        return Err(ConstraintError::Shape(format!(
            "pairwise expansion expects a (batch, positions, labels) tensor, got {}-d",
            v.ndim()
        )));
    }
    let (b, s, l) = (v.shape()[0], v.shape()[1], v.shape()[2]);
    let mut out = ArrayD::zeros(IxDyn(&[b, s, s, l]));
    for bi in 0..b {
        for i in 0..s {
            for j in 0..s {
                let mask = if i == j { DIAG_MASK } else { 0.0 };
                for li in 0..l {
                    out[[bi, i, j, li]] = stable_exp(stable_ln(v[[bi, j, li]]) + mask);
                }
            }
        }
    }
    Ok(out)
}

fn pairwise_backward(v: &ArrayD<f64>, adj: &ArrayD<f64>) -> ArrayD<f64> {
    let (b, s, l) = (v.shape()[0], v.shape()[1], v.shape()[2]);
    let mut g = ArrayD::zeros(v.raw_dim());
    for bi in 0..b {
        for i in 0..s {
            for j in 0..s {
                // The diagonal's contribution is exp(DIAG_MASK) ≈ 0.
                if i == j {
                    continue;
                }
                for li in 0..l {
                    g[[bi, j, li]] += adj[[bi, i, j, li]];
                }
            }
        }
    }
    g
}

fn broadcast_dims(a: &[usize], b: &[usize]) -> ConstraintResult<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0usize; ndim];
    for k in 0..ndim {
        let da = if k < ndim - a.len() { 1 } else { a[k - (ndim - a.len())] };
        let db = if k < ndim - b.len() { 1 } else { b[k - (ndim - b.len())] };
        out[k] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(ConstraintError::Shape(format!(
                    "cannot broadcast shapes {a:?} and {b:?}"
                )))
            }
        };
    }
    Ok(out)
}

fn binary_scalar(op: &LazyOp, norm: TNorm, x: f64, y: f64) -> f64 {
    match op {
        LazyOp::And { .. } => norm.and(x, y),
        LazyOp::Or { .. } => norm.or(x, y),
        LazyOp::Implies { .. } => norm.or(norm.not(x), y),
        _ => unreachable!("not a binary op"),
    }
}

fn binary_scalar_grads(op: &LazyOp, norm: TNorm, x: f64, y: f64) -> (f64, f64) {
    match op {
        LazyOp::And { .. } => norm.and_grad(x, y),
        LazyOp::Or { .. } => norm.or_grad(x, y),
        LazyOp::Implies { .. } => {
            let (dn, dy) = norm.or_grad(norm.not(x), y);
            (-dn, dy)
        }
        _ => unreachable!("not a binary op"),
    }
}

fn binary_forward(
    op: &LazyOp,
    norm: TNorm,
    a: &ArrayD<f64>,
    b: &ArrayD<f64>,
) -> ConstraintResult<ArrayD<f64>> {
    let shape = broadcast_dims(a.shape(), b.shape())?;
    let dim = IxDyn(&shape);
    let av = a.broadcast(dim.clone()).ok_or_else(|| {
        ConstraintError::Shape(format!("cannot broadcast {:?} to {shape:?}", a.shape()))
    })?;
    let bv = b.broadcast(dim.clone()).ok_or_else(|| {
        ConstraintError::Shape(format!("cannot broadcast {:?} to {shape:?}", b.shape()))
    })?;
    let mut out = ArrayD::zeros(dim);
    Zip::from(&mut out)
        .and(&av)
        .and(&bv)
        .for_each(|o, &x, &y| *o = binary_scalar(op, norm, x, y));
    Ok(out)
}

fn binary_backward(
    op: &LazyOp,
    norm: TNorm,
    a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    adj: &ArrayD<f64>,
) -> ConstraintResult<(ArrayD<f64>, ArrayD<f64>)> {
    let dim = adj.raw_dim();
    let av = a.broadcast(dim.clone()).ok_or_else(|| {
        ConstraintError::Shape(format!("cannot broadcast {:?} in backward pass", a.shape()))
    })?;
    let bv = b.broadcast(dim.clone()).ok_or_else(|| {
        ConstraintError::Shape(format!("cannot broadcast {:?} in backward pass", b.shape()))
    })?;
    let mut ga = ArrayD::zeros(dim.clone());
    let mut gb = ArrayD::zeros(dim);
    Zip::from(&mut ga)
        .and(&mut gb)
        .and(&av)
        .and(&bv)
        .and(adj)
        .for_each(|ga, gb, &x, &y, &a| {
            let (dx, dy) = binary_scalar_grads(op, norm, x, y);
            *ga = a * dx;
            *gb = a * dy;
        });
    Ok((
        reduce_to_shape(ga, a.shape()),
        reduce_to_shape(gb, b.shape()),
    ))
}

/// Sum a broadcast adjoint back down to an operand's shape.
fn reduce_to_shape(mut adj: ArrayD<f64>, shape: &[usize]) -> ArrayD<f64> {
    while adj.ndim() > shape.len() {
        adj = adj.sum_axis(Axis(0));
    }
    for ax in 0..shape.len() {
        if shape[ax] == 1 && adj.shape()[ax] != 1 {
            adj = adj.sum_axis(Axis(ax)).insert_axis(Axis(ax));
        }
    }
    adj
}

fn all_value(norm: TNorm, lane: &ArrayView1<'_, f64>) -> f64 {
    match norm {
        TNorm::Product => lane.iter().product(),
        TNorm::Godel => lane.iter().cloned().fold(1.0, f64::min),
        TNorm::Lukasiewicz => {
            let n = lane.len() as f64;
            (lane.sum() - (n - 1.0)).max(0.0)
        }
    }
}

fn all_backward(norm: TNorm, lane: &ArrayView1<'_, f64>, mut glane: ArrayViewMut1<'_, f64>, a: f64) {
    let n = lane.len();
    match norm {
        TNorm::Product => {
            // Leave-one-out products via prefix and suffix scans.
            let mut prefix = 1.0;
            let mut suffixes = vec![1.0; n + 1];
            for i in (0..n).rev() {
                suffixes[i] = suffixes[i + 1] * lane[i];
            }
            for i in 0..n {
                glane[i] = a * prefix * suffixes[i + 1];
                prefix *= lane[i];
            }
        }
        TNorm::Godel => {
            if let Some(idx) = argmin(lane) {
                glane[idx] = a;
            }
        }
        TNorm::Lukasiewicz => {
            if lane.sum() - (n as f64 - 1.0) > 0.0 {
                glane.fill(a);
            }
        }
    }
}

fn any_value(norm: TNorm, lane: &ArrayView1<'_, f64>) -> f64 {
    match norm {
        TNorm::Product => 1.0 - lane.iter().map(|&x| 1.0 - x).product::<f64>(),
        TNorm::Godel => lane.iter().cloned().fold(0.0, f64::max),
        TNorm::Lukasiewicz => lane.sum().min(1.0),
    }
}

fn any_backward(norm: TNorm, lane: &ArrayView1<'_, f64>, mut glane: ArrayViewMut1<'_, f64>, a: f64) {
    let n = lane.len();
    match norm {
        TNorm::Product => {
            let mut prefix = 1.0;
            let mut suffixes = vec![1.0; n + 1];
            for i in (0..n).rev() {
                suffixes[i] = suffixes[i + 1] * (1.0 - lane[i]);
            }
            for i in 0..n {
                glane[i] = a * prefix * suffixes[i + 1];
                prefix *= 1.0 - lane[i];
            }
        }
        TNorm::Godel => {
            if let Some(idx) = argmax(lane) {
                glane[idx] = a;
            }
        }
        TNorm::Lukasiewicz => {
            if lane.sum() < 1.0 {
                glane.fill(a);
            }
        }
    }
}

fn argmin(lane: &ArrayView1<'_, f64>) -> Option<usize> {
    lane.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

fn argmax(lane: &ArrayView1<'_, f64>) -> Option<usize> {
    lane.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Solver that evaluates a lazy predicate graph under a t-norm algebra.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LazyTNormSolver {
    /// The t-norm algebra interpreting the graph's connectives.
    pub norm: TNorm,
    /// Conversion from per-example truth degree to loss.
    pub loss_form: LossForm,
}

impl LazyTNormSolver {
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

    /// Evaluate against a `(batch, positions, labels)` distribution.
    ///
    /// The graph's output must evaluate to a per-batch truth vector; the
    /// scalar loss is the batch mean and per-example losses are reported
    /// alongside it.
    pub fn evaluate(
        &self,
        graph: &LazyGraph,
        probs: &ArrayViewD<'_, f64>,
    ) -> ConstraintResult<Evaluation> {
        if probs.ndim() != 3 {
            return Err(ConstraintError::Shape(format!(
                "lazy solver expects a (batch, positions, labels) tensor, got {}-d",
                probs.ndim()
            )));
        }
        let output = graph.output().ok_or_else(|| {
            ConstraintError::Config("lazy predicate graph has no output node".to_string())
        })?;

        let values = graph.forward(probs, self.norm)?;
        let truth = &values[output];
        let batch = probs.shape()[0];
        if truth.ndim() != 1 || truth.shape()[0] != batch {
            return Err(ConstraintError::Shape(format!(
                "predicate output must be a truth vector of length {batch}, got shape {:?}",
                truth.shape()
            )));
        }

        let mut per_example = Array1::zeros(batch);
        let mut seed = ArrayD::zeros(truth.raw_dim());
        for b in 0..batch {
            let (loss_b, d_truth) = self.loss_form.apply(truth[[b]]);
            per_example[b] = loss_b;
            seed[[b]] = d_truth / batch as f64;
        }
        let loss = per_example.sum() / batch as f64;
        tracing::trace!(loss, batch, "lazy t-norm evaluation");

        let grad = graph.backward(&values, self.norm, output, seed)?;
        Ok(Evaluation::batched(loss, grad, per_example))
    }
}
