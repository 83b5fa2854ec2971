// src/similarity.rs

use log::debug;

use crate::embeddings::EmbeddingStore;
use crate::error::{Result, SolveError};
use crate::models::SimilarityMatrix;

/// Cosine similarity, accumulated in f64. `None` when the vectors differ in
/// length, are empty, or either has zero norm.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> Option<f64> {
    if v1.len() != v2.len() || v1.is_empty() {
        return None;
    }
    let mut dot_product = 0.0;
    let mut mag1_sq = 0.0;
    let mut mag2_sq = 0.0;
    for (&a, &b) in v1.iter().zip(v2) {
        let (a, b) = (a as f64, b as f64);
        dot_product += a * b;
        mag1_sq += a * a;
        mag2_sq += b * b;
    }
    let mag1 = mag1_sq.sqrt();
    let mag2 = mag2_sq.sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return None;
    }
    Some(dot_product / (mag1 * mag2))
}

/// Builds the pairwise similarity matrix for `items`, in the given order.
///
/// Self-similarity stays on the diagonal; it is part of the scoring.
pub fn build_similarity_matrix(items: &[String], store: &EmbeddingStore) -> Result<SimilarityMatrix> {
    let vectors = items
        .iter()
        .map(|text| store.get(text))
        .collect::<Result<Vec<_>>>()?;

    let n = items.len();
    let mut values = vec![0.0; n * n];
    for i in 0..n {
        for j in i..n {
            let sim = cosine_similarity(vectors[i], vectors[j]).ok_or_else(|| {
                // Equal dimensions are guaranteed by the store, so this is a zero norm
                let culprit = if norm_is_zero(vectors[i]) { i } else { j };
                SolveError::EmbeddingMissing(items[culprit].clone())
            })?;
            values[i * n + j] = sim;
            values[j * n + i] = sim;
        }
    }

    debug!("shape of similarities: ({}, {})", n, n);
    Ok(SimilarityMatrix::from_flat(n, values))
}

fn norm_is_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}
