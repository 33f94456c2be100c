use zipsa_core::{Result, RetrievalError};

const MIN_NORM: f32 = 1e-12;

/// Scale `v` to unit length. Vectors with (near) zero norm are left as is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm >= MIN_NORM {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Validate a raw model output against the provider's dimension and
/// normalize it.
pub fn finalize(mut v: Vec<f32>, dimension: usize) -> Result<Vec<f32>> {
    if v.is_empty() {
        return Err(RetrievalError::EmbeddingFailure("provider returned an empty vector".to_string()));
    }
    if v.len() != dimension {
        return Err(RetrievalError::DimensionMismatch { expected: dimension, actual: v.len() });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(RetrievalError::EmbeddingFailure("provider returned non-finite values".to_string()));
    }
    l2_normalize(&mut v);
    Ok(v)
}
