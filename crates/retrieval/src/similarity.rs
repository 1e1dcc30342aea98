//! Cosine similarity over dense and sparse vectors.
//!
//! Both functions accumulate in `f64` and return `0.0` whenever a norm is
//! zero, so callers never see NaN.

use std::collections::BTreeMap;

/// Term → weight map. Ordered so sums are computed in a fixed order.
pub type SparseVector = BTreeMap<String, f32>;

/// Cosine similarity over the overlapping prefix of `a` and `b`.
///
/// Vectors of different length are compared on `min(len a, len b)`
/// positions; an empty vector or a zero norm gives `0.0`.
pub fn cosine_dense(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    finish(dot, norm_a, norm_b)
}

/// Cosine similarity of two term → weight maps. The dot product runs over
/// shared terms; each norm over the map's own weights.
pub fn cosine_sparse(a: &SparseVector, b: &SparseVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .filter_map(|(term, &wa)| b.get(term).map(|&wb| f64::from(wa) * f64::from(wb)))
        .sum();
    let norm_a: f64 = a.values().map(|&w| f64::from(w) * f64::from(w)).sum();
    let norm_b: f64 = b.values().map(|&w| f64::from(w) * f64::from(w)).sum();

    finish(dot, norm_a, norm_b)
}

fn finish(dot: f64, norm_a_sq: f64, norm_b_sq: f64) -> f32 {
    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return 0.0;
    }
    let cos = dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt());
    cos.clamp(-1.0, 1.0) as f32
}

/// In-place L2 normalization.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sparse(pairs: &[(&str, f32)]) -> SparseVector {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn dense_identical_vectors() {
        assert!((cosine_dense(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dense_orthogonal_vectors() {
        assert_eq!(cosine_dense(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn dense_opposite_vectors() {
        assert!((cosine_dense(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn dense_empty_or_zero() {
        assert_eq!(cosine_dense(&[], &[1.0]), 0.0);
        assert_eq!(cosine_dense(&[1.0], &[]), 0.0);
        assert_eq!(cosine_dense(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn dense_truncates_to_shorter() {
        // Only [1, 0] vs [1, 0] is compared.
        assert!((cosine_dense(&[1.0, 0.0], &[1.0, 0.0, 5.0, 7.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sparse_shared_terms_only() {
        let a = sparse(&[("circuit", 1.0), ("breaker", 1.0)]);
        let b = sparse(&[("breaker", 1.0), ("rag", 1.0)]);
        assert!((cosine_sparse(&a, &b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sparse_disjoint_or_empty() {
        let a = sparse(&[("x", 2.0)]);
        let b = sparse(&[("y", 3.0)]);
        assert_eq!(cosine_sparse(&a, &b), 0.0);
        assert_eq!(cosine_sparse(&a, &SparseVector::new()), 0.0);
        assert_eq!(cosine_sparse(&sparse(&[("x", 0.0)]), &a), 0.0);
    }

    #[test]
    fn l2_normalize_simple_vector() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 3];
        l2_normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    fn dense_vec() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-100.0f32..100.0, 0..32)
    }

    fn sparse_vec() -> impl Strategy<Value = SparseVector> {
        prop::collection::btree_map("[a-e]{1,3}", -10.0f32..10.0, 0..12)
    }

    proptest! {
        #[test]
        fn dense_is_symmetric(a in dense_vec(), b in dense_vec()) {
            prop_assert_eq!(cosine_dense(&a, &b), cosine_dense(&b, &a));
        }

        #[test]
        fn dense_is_bounded(a in dense_vec(), b in dense_vec()) {
            let c = cosine_dense(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&c));
        }

        #[test]
        fn dense_self_similarity_is_one(a in prop::collection::vec(0.5f32..100.0, 1..32)) {
            prop_assert!((cosine_dense(&a, &a) - 1.0).abs() < 1e-5);
        }

        #[test]
        fn dense_zero_vector_is_zero(a in dense_vec()) {
            let zeros = vec![0.0f32; a.len()];
            prop_assert_eq!(cosine_dense(&a, &zeros), 0.0);
        }

        #[test]
        fn sparse_is_symmetric(a in sparse_vec(), b in sparse_vec()) {
            prop_assert_eq!(cosine_sparse(&a, &b), cosine_sparse(&b, &a));
        }

        #[test]
        fn sparse_self_similarity_is_one(
            a in prop::collection::btree_map("[a-z]{1,4}", 0.5f32..10.0, 1..12)
        ) {
            prop_assert!((cosine_sparse(&a, &a) - 1.0).abs() < 1e-5);
        }

        #[test]
        fn sparse_disjoint_is_zero(
            a in prop::collection::btree_map("[a-m]{2}", 0.5f32..10.0, 1..8),
            b in prop::collection::btree_map("[n-z]{2}", 0.5f32..10.0, 1..8)
        ) {
            prop_assert_eq!(cosine_sparse(&a, &b), 0.0);
        }
    }
}
