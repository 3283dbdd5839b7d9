//! Shared numerical-stability utilities.
//!
//! Every solver that round-trips through the log domain uses these helpers so
//! that the epsilon floor behaves identically across components.

use scirs2_core::ndarray::{ArrayD, ArrayViewD, Axis, Zip};

/// Floor added before logarithms and divisions of near-zero probabilities.
pub const EPSILON: f64 = 1e-8;

/// Largest magnitude fed to `exp` before clamping.
const MAX_EXP: f64 = 700.0;

/// Natural log with an epsilon floor: `ln(x + EPSILON)`.
///
/// Keeps the loss finite when a probability mass degenerates to zero.
pub fn stable_ln(x: f64) -> f64 {
    (x + EPSILON).ln()
}

/// Exponential with the argument clamped to avoid overflow to infinity.
pub fn stable_exp(x: f64) -> f64 {
    x.clamp(-MAX_EXP, MAX_EXP).exp()
}

/// Softmax along the last axis.
///
/// Converts raw logits of shape `(..., labels)` into per-position categorical
/// probabilities. The maximum is subtracted per lane before exponentiation.
pub fn softmax(logits: &ArrayViewD<'_, f64>) -> ArrayD<f64> {
    let last = Axis(logits.ndim() - 1);
    let mut out = logits.to_owned();
    for mut lane in out.lanes_mut(last) {
        let max = lane.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in lane.iter_mut() {
            *v = stable_exp(*v - max);
            sum += *v;
        }
        for v in lane.iter_mut() {
            *v /= sum;
        }
    }
    out
}

/// Backward pass of the last-axis softmax.
///
/// Given probabilities `p = softmax(z)` and the gradient `g = dL/dp`, returns
/// `dL/dz = p * (g - <g, p>)` per lane. Callers that optimize logits directly
/// chain a solver's probability-space gradient through this.
pub fn softmax_backward(probs: &ArrayViewD<'_, f64>, grad: &ArrayViewD<'_, f64>) -> ArrayD<f64> {
    let last = Axis(probs.ndim() - 1);
    let mut out = ArrayD::zeros(probs.raw_dim());
    Zip::from(out.lanes_mut(last))
        .and(probs.lanes(last))
        .and(grad.lanes(last))
        .for_each(|mut o, p, g| {
            let dot: f64 = p.iter().zip(g.iter()).map(|(&pi, &gi)| pi * gi).sum();
            for ((oi, &pi), &gi) in o.iter_mut().zip(p.iter()).zip(g.iter()) {
                *oi = pi * (gi - dot);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray::array;

    #[test]
    fn test_stable_ln_floor() {
        assert!(stable_ln(0.0).is_finite());
        assert!((stable_ln(1.0) - 0.0).abs() < 1e-7);
    }

    #[test]
    fn test_stable_exp_clamp() {
        assert!(stable_exp(1e9).is_finite());
        assert!(stable_exp(-1e9) >= 0.0);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let logits = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]].into_dyn();
        let probs = softmax(&logits.view());
        for row in probs.lanes(Axis(1)) {
            let sum: f64 = row.sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        // Uniform logits give uniform probabilities.
        assert!((probs[[1, 0]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_backward_matches_finite_difference() {
        let logits = array![[0.3, -0.2, 0.5]].into_dyn();
        let grad_p = array![[0.7, -0.1, 0.4]].into_dyn();

        let probs = softmax(&logits.view());
        let grad_z = softmax_backward(&probs.view(), &grad_p.view());

        // L(z) = <g, softmax(z)> so dL/dz_k should match central differences.
        let h = 1e-6;
        for k in 0..3 {
            let mut plus = logits.clone();
            plus[[0, k]] += h;
            let mut minus = logits.clone();
            minus[[0, k]] -= h;
            let lp: f64 = (softmax(&plus.view()) * &grad_p).sum();
            let lm: f64 = (softmax(&minus.view()) * &grad_p).sum();
            let fd = (lp - lm) / (2.0 * h);
            assert!((grad_z[[0, k]] - fd).abs() < 1e-6);
        }
    }
}
