
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{RagError, Result};

/// Sliding window parameters, measured in tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Width of each window
    pub chunk_size: usize,
    /// Tokens shared by two consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of two consecutive windows, never zero
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }

    /// Token ranges of every window over a sequence of `token_count` tokens.
    ///
    /// A window starts at every multiple of the stride below `token_count`, so
    /// the tail of a sequence may be covered by a short final window that lies
    /// entirely inside its predecessor. Each window still counts once when the
    /// vectors are pooled.
    #[inline]
    pub fn window_ranges(&self, token_count: usize) -> Vec<Range<usize>> {
        let width = self.chunk_size.max(1);
        (0..token_count)
            .step_by(self.stride())
            .map(|start| start..(start + width).min(token_count))
            .collect()
    }
}

/// Coordinate-wise arithmetic mean of equally weighted vectors
#[inline]
pub fn mean_pool(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let Some(first) = vectors.first() else {
        return Err(RagError::EmptyInput);
    };
    let dimension = first.len();

    let mut sums = vec![0.0_f64; dimension];
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(RagError::MalformedResponse(format!(
                "chunk {} has {} dimensions, expected {}",
                index,
                vector.len(),
                dimension
            )));
        }
        for (sum, value) in sums.iter_mut().zip(vector) {
            *sum += f64::from(*value);
        }
    }

    let count = vectors.len() as f64;
    Ok(sums.into_iter().map(|sum| (sum / count) as f32).collect())
}

/// Cosine similarity of two vectors of equal length, 0.0 when either is all zeros
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, na, nb), (x, y)| {
            let (x, y) = (f64::from(*x), f64::from(*y));
            (x.mul_add(y, dot), x.mul_add(x, na), y.mul_add(y, nb))
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
