//! Exact cosine index over entities

use crate::embed::{Embedder, TaskHint};
use crate::graph::Entity;
use thiserror::Error;
use tracing::debug;

/// Vector index errors
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Entity {0} has no embedding")]
    MissingEmbedding(String),

    #[error("Duplicate entity id: {0}")]
    DuplicateId(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] crate::embed::EmbedError),
}

pub type VectorResult<T> = Result<T, VectorError>;

/// Cosine similarity in [-1, 1]; zero vectors are dissimilar to everything
pub fn cosine_similarity(va: &[f32], vb: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (a, b) in va.iter().zip(vb.iter()) {
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exact cosine index. Entries keep insertion order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<Entity>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: Vec::new(),
        }
    }

    /// Add an entity; it must carry an embedding of the index's dimensionality
    pub fn insert(&mut self, entity: Entity) -> VectorResult<()> {
        let got = match &entity.embedding {
            Some(v) => v.len(),
            None => return Err(VectorError::MissingEmbedding(entity.id)),
        };
        if got != self.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got,
            });
        }
        if self.entries.iter().any(|e| e.id == entity.id) {
            return Err(VectorError::DuplicateId(entity.id));
        }
        self.entries.push(entity);
        Ok(())
    }

    /// Embed entities' text as documents and add them
    pub async fn embed_and_insert(
        &mut self,
        embedder: &dyn Embedder,
        entities: Vec<Entity>,
    ) -> VectorResult<usize> {
        let mut added = 0;
        for entity in entities {
            let vector = embedder.embed(&entity.embedding_text(), TaskHint::Document).await?;
            self.insert(entity.with_embedding(vector))?;
            added += 1;
        }
        debug!("Indexed {} entities ({} total)", added, self.entries.len());
        Ok(added)
    }

    /// Score every entry accepted by `keep` against `query`.
    ///
    /// Returns `(entity, similarity)` for all of them, unsorted.
    pub fn scan<'a>(
        &'a self,
        query: &[f32],
        keep: impl Fn(&Entity) -> bool,
    ) -> VectorResult<Vec<(&'a Entity, f32)>> {
        if query.len() != self.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        Ok(self
            .entries
            .iter()
            .filter(|e| keep(e))
            .filter_map(|e| {
                e.embedding
                    .as_deref()
                    .map(|v| (e, cosine_similarity(query, v)))
            })
            .collect())
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
}
