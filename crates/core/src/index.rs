//! Exact nearest-neighbor index built fresh for every request.
//!
//! A [`SimilarityIndex`] is constructed once from the request's chunks and
//! is read-only afterwards; it has no insertion API. Dropping the request
//! drops the index.

use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, IndexError, SearchError};
use crate::models::{Chunk, DistanceMetric, SearchHit};

/// Upper bound on texts sent to the embedder in one call.
pub const EMBED_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    entries: Vec<Entry>,
    dimensions: usize,
    metric: DistanceMetric,
}

impl SimilarityIndex {
    /// An index with no entries. Every query against it returns no hits.
    pub fn empty(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            entries: Vec::new(),
            dimensions,
            metric,
        }
    }

    /// Embeds every chunk and builds the index. Any embedding failure or
    /// malformed vector fails the whole build.
    pub async fn build<E>(
        chunks: Vec<Chunk>,
        embedder: &E,
        metric: DistanceMetric,
    ) -> Result<Self, IndexError>
    where
        E: Embedder + ?Sized,
    {
        let dimensions = embedder.dimensions();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let embedded = embedder.embed_documents(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(IndexError::Embedding(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: embedded.len(),
                }));
            }
            debug!(batch_size = texts.len(), "embedded chunk batch");
            vectors.extend(embedded);
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        position: chunk.position,
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                if vector.iter().any(|value| !value.is_finite()) {
                    return Err(IndexError::NonFinite(chunk.position));
                }
                Ok(Entry { chunk, vector })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        info!(entries = entries.len(), dimensions, ?metric, "similarity index built");

        Ok(Self {
            entries,
            dimensions,
            metric,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Returns up to `k` chunks ordered by ascending distance, ties broken by
    /// chunk position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if k == 0 {
            return Err(SearchError::ZeroK);
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if query.iter().any(|value| !value.is_finite()) {
            return Err(SearchError::NonFinite);
        }

        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .iter()
            .map(|entry| (ranking_distance(self.metric, &entry.vector, query), entry))
            .collect();

        scored.sort_by(|(left_distance, left), (right_distance, right)| {
            left_distance
                .total_cmp(right_distance)
                .then_with(|| left.chunk.position.cmp(&right.chunk.position))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| SearchHit {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Embeds `question` and searches.
    pub async fn query<E>(
        &self,
        question: &str,
        embedder: &E,
        k: usize,
    ) -> Result<Vec<SearchHit>, SearchError>
    where
        E: Embedder + ?Sized,
    {
        if k == 0 {
            return Err(SearchError::ZeroK);
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let vector = embedder.embed_query(question).await?;
        self.search(&vector, k)
    }
}

/// Overflowing arithmetic can yield NaN; such entries rank behind every
/// finite distance.
fn ranking_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    let value = distance(metric, a, b);
    if value.is_nan() {
        f32::INFINITY
    } else {
        value
    }
}

fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum(),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
    }
}

/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
