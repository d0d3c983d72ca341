//! Vector math for embedding and feature frames
//!
//! All helpers work on plain `f32` slices. Norm guards use a small epsilon so
//! zero vectors never divide by zero.

/// Epsilon added to norms before division
pub const NORM_EPSILON: f32 = 1e-12;

/// Inner product of two equal-length slices
///
/// Extra elements of the longer slice are ignored.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean norm
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Normalize in place to unit length so inner product equals cosine similarity
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v) + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Arithmetic mean of a set of equal-dimension vectors
///
/// Returns `None` for an empty set.
pub fn mean<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Vec<f32>> {
    let first = vectors.first()?.as_ref();
    let mut acc = vec![0.0f32; first.len()];
    for v in vectors {
        for (a, x) in acc.iter_mut().zip(v.as_ref().iter()) {
            *a += *x;
        }
    }
    let n = vectors.len() as f32;
    for a in acc.iter_mut() {
        *a /= n;
    }
    Some(acc)
}

/// Cosine distance `1 - cos(a, b)`
///
/// Two all-zero frames are identical (distance 0); a zero frame against a
/// non-zero one is maximally unrelated (distance 1). Symmetric in its arguments.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 && nb == 0.0 {
        return 0.0;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    let cos = (dot(a, b) / (na * nb)).clamp(-1.0, 1.0);
    1.0 - cos
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mu = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n;
    Some((mu, var.sqrt()))
}
