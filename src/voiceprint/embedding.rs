//! Embedding vector codec and similarity scoring.

use thiserror::Error;

/// Output dimension of the ECAPA-style speaker encoder.
pub const EMBEDDING_DIM: usize = 192;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding has wrong dimension: expected {EMBEDDING_DIM}, got {0}")]
    WrongDimension(usize),
    #[error("embedding bytes are not a whole number of f32 values")]
    Misaligned,
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Validate an extractor output before it is scored or stored.
///
/// # Errors
/// Returns [`EmbeddingError`] on dimension mismatch or non-finite values.
pub fn validate(embedding: &[f32]) -> Result<(), EmbeddingError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(EmbeddingError::WrongDimension(embedding.len()));
    }
    if embedding.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingError::NonFinite);
    }
    Ok(())
}

/// Serialize an embedding as little-endian f32 bytes for encryption.
#[must_use]
pub fn to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Deserialize little-endian f32 bytes back into an embedding.
///
/// # Errors
/// Returns [`EmbeddingError`] if the byte length or dimension is wrong.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
    if bytes.len() % 4 != 0 {
        return Err(EmbeddingError::Misaligned);
    }
    let embedding: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    validate(&embedding)?;
    Ok(embedding)
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`, clipped to `[-1, 1]`.
///
/// Degenerate inputs (zero vectors, length mismatch) score 0.0 rather than
/// erroring; a zero-energy embedding can never authenticate.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    similarity.clamp(-1.0, 1.0) as f32
}

/// Best similarity of a live embedding across all enrollment embeddings.
#[must_use]
pub fn max_similarity(live: &[f32], enrolled: &[Vec<f32>]) -> f32 {
    enrolled
        .iter()
        .map(|reference| cosine_similarity(live, reference))
        .reduce(f32::max)
        .unwrap_or(0.0)
}
