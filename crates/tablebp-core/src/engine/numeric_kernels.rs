//! Numeric kernels for message vectors.
//!
//! Probability messages normalize by dividing by their sum. Cost messages
//! normalize by subtracting their minimum. Damping is a convex blend with the
//! previous message, applied after normalization.

/// Equivalence epsilon for optimized-vs-reference numerical checks.
pub const KERNEL_EQUIVALENCE_EPSILON: f64 = 1e-12;

/// Sum of a message.
#[inline]
pub fn message_sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Minimum of a cost message, `+inf` when empty.
#[inline]
pub fn message_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Divides every entry by `sum`.
#[inline]
pub fn scale_by_sum(values: &mut [f64], sum: f64) {
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// Normalizes a probability message in place. Returns false, leaving the
/// values untouched, when the sum is zero.
pub fn normalize_probabilities(values: &mut [f64]) -> bool {
    let sum = message_sum(values);
    if sum == 0.0 {
        return false;
    }
    scale_by_sum(values, sum);
    true
}

/// Subtracts the minimum from a cost message. Returns false, leaving the values
/// untouched, when the minimum is not finite.
pub fn normalize_costs(values: &mut [f64]) -> bool {
    let min = message_min(values);
    if !min.is_finite() {
        return false;
    }
    for v in values.iter_mut() {
        *v -= min;
    }
    true
}

/// Blends `fresh` toward `previous`: `fresh = (1 - damping) * fresh + damping * previous`.
#[inline]
pub fn damp_in_place(fresh: &mut [f64], previous: &[f64], damping: f64) {
    let keep = 1.0 - damping;
    for (f, &p) in fresh.iter_mut().zip(previous) {
        *f = keep * *f + damping * p;
    }
}

/// Indices of the `k` largest values, in no particular order.
///
/// Uses partial selection rather than a full sort. Returns every index when
/// `k >= values.len()`.
pub fn top_k_indices(values: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    if k >= values.len() {
        return indices;
    }
    if k == 0 {
        return Vec::new();
    }
    indices.select_nth_unstable_by(k - 1, |&a, &b| values[b].total_cmp(&values[a]));
    indices.truncate(k);
    indices
}

/// Converts probabilities to costs (`-ln p`).
pub fn costs_from_probabilities(probabilities: &[f64]) -> Vec<f64> {
    probabilities.iter().map(|&p| -p.ln()).collect()
}

/// Converts costs to normalized probabilities (`exp(-(c - min c))`, then divided by the sum).
pub fn probabilities_from_costs(costs: &[f64]) -> Vec<f64> {
    let min = message_min(costs);
    let shift = if min.is_finite() { min } else { 0.0 };
    let mut out: Vec<f64> = costs.iter().map(|&c| (-(c - shift)).exp()).collect();
    normalize_probabilities(&mut out);
    out
}
