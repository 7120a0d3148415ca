//! Categorical policy helpers operating on raw logits.

use rand::Rng;

/// Numerically stable `log(softmax(logits))`.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let lse = logits.iter().map(|&l| (l - max).exp()).sum::<f32>().ln();
    logits.iter().map(|&l| l - max - lse).collect()
}

/// Log-probability of `action` under the softmax of `logits`.
pub fn log_probability(logits: &[f32], action: usize) -> f32 {
    log_softmax(logits)[action]
}

/// Sample an action from the softmax of `logits`.
///
/// Returns the action index and its log-probability, or `None` for empty logits.
pub fn sample<R: Rng + ?Sized>(logits: &[f32], rng: &mut R) -> Option<(usize, f32)> {
    let log_probs = log_softmax(logits);
    let last = log_probs.len().checked_sub(1)?;
    let u: f32 = rng.gen();
    let mut cumulative = 0.0f32;
    for (action, &lp) in log_probs.iter().enumerate() {
        cumulative += lp.exp();
        // rounding can leave the total just below 1
        if u < cumulative || action == last {
            return Some((action, lp));
        }
    }
    Some((last, log_probs[last]))
}
