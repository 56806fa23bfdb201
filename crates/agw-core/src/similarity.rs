// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cosine similarity over fixed-dimension vectors.

use thiserror::Error;

/// Returned when two vectors of different lengths are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dimension mismatch: left has {left}, right has {right}")]
pub struct DimensionMismatch {
    /// Length of the left-hand vector.
    pub left: usize,
    /// Length of the right-hand vector.
    pub right: usize,
}

/// Cosine similarity of two vectors, in `[-1.0, 1.0]`.
///
/// Zero-length or all-zero vectors yield `0.0` rather than dividing by
/// zero.
///
/// # Errors
///
/// Returns [`DimensionMismatch`] when the vectors differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}
