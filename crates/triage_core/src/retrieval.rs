use crate::error::{Result, TriageError};

const NORM_EPSILON: f32 = 1e-12;

/// Scales `v` to unit L2 norm in place. The epsilon keeps an all-zero
/// embedding from dividing by zero; such a vector stays all-zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= norm;
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Highest-scoring row for an already-normalized query vector. Both sides
/// are unit vectors, so the dot product is the cosine similarity. The argmax
/// is stable: on ties the lowest row id wins.
pub fn most_similar(query: &[f32], matrix: &[Vec<f32>]) -> Result<(f32, usize)> {
    if matrix.is_empty() {
        return Err(TriageError::EmptyCorpus);
    }

    let mut best_score = f32::NEG_INFINITY;
    let mut best_index = 0;

    for (index, row) in matrix.iter().enumerate() {
        let score: f32 = row.iter().zip(query.iter()).map(|(r, q)| r * q).sum();
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }

    Ok((best_score, best_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalize_leaves_zero_vector_finite() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| x.is_finite()));
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn cosine_works_for_unit_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn identical_row_scores_one() {
        let mut q = vec![0.6, 0.8];
        l2_normalize(&mut q);
        let matrix = vec![q.clone()];

        let (score, index) = most_similar(&q, &matrix).unwrap();
        assert_eq!(index, 0);
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn picks_highest_scoring_row() {
        let matrix = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let (score, index) = most_similar(&[0.1, 0.9], &matrix).unwrap();
        assert_eq!(index, 1);
        assert!(score > 0.8);
    }

    #[test]
    fn ties_go_to_the_first_row() {
        let matrix = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let (_, index) = most_similar(&[1.0, 0.0], &matrix).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn empty_matrix_is_rejected() {
        let err = most_similar(&[1.0, 0.0], &[]).unwrap_err();
        assert!(matches!(err, TriageError::EmptyCorpus));
    }
}
