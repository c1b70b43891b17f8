pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(left, right)| left * right).sum()
}

pub fn magnitude(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity in `[-1, 1]`. Zero vectors and vectors of different
/// length score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_magnitudes(a, b, magnitude(a), magnitude(b))
}

pub fn cosine_with_magnitudes(a: &[f32], b: &[f32], mag_a: f32, mag_b: f32) -> f32 {
    if a.len() != b.len() || mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]), 0.0);
    }

    #[test]
    fn zero_and_mismatched_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn scale_does_not_change_similarity() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }
}
