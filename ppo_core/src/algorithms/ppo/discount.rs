//! Discounted cumulative sums and batch statistics shared by advantage and
//! return computation.

/// Reverse-scan discounted cumulative sum.
///
/// Entry `i` of the result is `Σ_{k≥i} decay^(k-i) · values[k]`.
pub fn discounted_cumulative_sum(values: &[f32], decay: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; values.len()];
    let mut running = 0.0f32;
    for (i, &v) in values.iter().enumerate().rev() {
        running = v + decay * running;
        out[i] = running;
    }
    out
}

/// Sample mean and population standard deviation (ddof = 0).
///
/// Returns `(0.0, 0.0)` for an empty slice.
pub fn mean_and_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean as f32, variance.sqrt() as f32)
}
