/// Cosine similarity `(a·b) / (‖a‖·‖b‖)`, accumulated in f64.
///
/// Returns `0.0` when either side has zero norm or the lengths differ, so
/// callers never see NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Exponential moving average `c_new = (1 - α)·c_old + α·v`.
pub fn ema_update(current: &[f32], embedding: &[f32], alpha: f32) -> Vec<f32> {
    current
        .iter()
        .zip(embedding)
        .map(|(&c, &v)| (1.0 - alpha) * c + alpha * v)
        .collect()
}
