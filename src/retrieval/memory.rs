//! Retriever over an in-process `VectorIndex`

use crate::retrieval::{
    effective_k, rank, AttributeFilter, RetrievalCandidate, RetrievalError, RetrievalResult,
    VectorRetriever,
};
use crate::vector::{VectorError, VectorIndex};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct InMemoryRetriever {
    index: Arc<VectorIndex>,
    max_k: usize,
    similarity_floor: Option<f32>,
    /// Attributes copied onto candidates; empty means all
    attributes: Vec<String>,
}

impl InMemoryRetriever {
    pub fn new(index: Arc<VectorIndex>, max_k: usize) -> Self {
        Self {
            index,
            max_k,
            similarity_floor: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_similarity_floor(mut self, floor: Option<f32>) -> Self {
        self.similarity_floor = floor;
        self
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl VectorRetriever for InMemoryRetriever {
    async fn retrieve(
        &self,
        query: &[f32],
        k: usize,
        filters: &[AttributeFilter],
    ) -> RetrievalResult<Vec<RetrievalCandidate>> {
        let k = effective_k(k, self.max_k)?;
        for filter in filters {
            filter.validate()?;
        }

        let hits = self
            .index
            .scan(query, |entity| {
                filters.iter().all(|f| f.matches(entity.get(&f.attribute)))
            })
            .map_err(|e| match e {
                VectorError::DimensionMismatch { expected, got } => {
                    RetrievalError::DimensionMismatch { expected, got }
                }
                other => RetrievalError::IndexUnavailable(other.to_string()),
            })?;

        let candidates = hits
            .into_iter()
            .map(|(entity, score)| RetrievalCandidate {
                id: entity.id.clone(),
                label: entity.label.clone(),
                score,
                attributes: entity
                    .attributes
                    .iter()
                    .filter(|(key, _)| self.attributes.is_empty() || self.attributes.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            })
            .collect();

        let ranked = rank(candidates, k, self.similarity_floor);
        debug!("In-memory retrieval returned {} of {} entries", ranked.len(), self.index.len());
        Ok(ranked)
    }
}
