//! In-memory vector index with cosine similarity search.
//!
//! Entries are keyed by listing row position and kept in insertion order so
//! equal scores rank by row.

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Row position of the listing
    pub position: usize,
    /// Hash of the text that was embedded
    pub content_hash: u64,
    pub embedding: Vec<f32>,
}

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub position: usize,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry.
    ///
    /// Rejects embeddings of the wrong width and zero-norm vectors, which
    /// cannot be scored.
    pub fn insert(
        &mut self,
        position: usize,
        content_hash: u64,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector(position));
        }

        self.entries.push(VectorEntry {
            position,
            content_hash,
            embedding,
        });

        Ok(())
    }

    pub fn get(&self, position: usize) -> Option<&VectorEntry> {
        self.entries.iter().find(|e| e.position == position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VectorEntry> {
        self.entries.iter()
    }

    /// Search for similar vectors using cosine similarity.
    ///
    /// # Arguments
    /// * `query` - The query embedding vector
    /// * `candidates` - Optional set of positions to search within
    /// * `min_score` - Optional minimum similarity
    /// * `limit` - Maximum number of results to return
    ///
    /// An empty or zero-norm query matches nothing.
    ///
    /// # Returns
    /// Results sorted by similarity score (highest first), ties in row order.
    pub fn search(
        &self,
        query: &[f32],
        candidates: Option<&[usize]>,
        min_score: Option<f32>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if query.is_empty() {
            return Ok(vec![]);
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Ok(vec![]);
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter(|entry| {
                candidates
                    .map(|positions| positions.contains(&entry.position))
                    .unwrap_or(true)
            })
            .map(|entry| SearchResult {
                position: entry.position,
                score: cosine_similarity(query, &entry.embedding, query_norm),
            })
            .filter(|result| min_score.map(|min| result.score >= min).unwrap_or(true))
            .collect();

        // stable: equal scores keep row order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / (query_norm * target_norm)
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding for listing {0} has zero norm")]
    ZeroNormVector(usize),
}
