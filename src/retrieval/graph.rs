//! Retriever backed by the graph store's persisted vector index

use crate::config::RetrievalConfig;
use crate::retrieval::{
    effective_k, rank, AttributeFilter, RetrievalCandidate, RetrievalError, RetrievalResult,
    VectorRetriever,
};
use crate::store::{Params, Row, SessionPool, Value};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Over-fetch factor when filters may discard index hits
const FILTER_OVERSAMPLE: usize = 4;

/// Movie attributes copied onto candidates (never the embedding)
pub const DEFAULT_CANDIDATE_ATTRIBUTES: &[&str] =
    &["title", "tagline", "overview", "release_date", "vote_average"];

pub struct GraphVectorRetriever {
    pool: SessionPool,
    index_name: String,
    dimensions: usize,
    max_k: usize,
    similarity_floor: Option<f32>,
    attributes: Vec<String>,
    query_timeout: Duration,
}

impl GraphVectorRetriever {
    pub fn new(
        pool: SessionPool,
        config: &RetrievalConfig,
        dimensions: usize,
        query_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            index_name: config.index_name.clone(),
            dimensions,
            max_k: config.max_k,
            similarity_floor: config.similarity_floor,
            attributes: DEFAULT_CANDIDATE_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            query_timeout,
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Build the index query and its parameters
    pub fn build_query(
        &self,
        query: &[f32],
        k: usize,
        filters: &[AttributeFilter],
    ) -> RetrievalResult<(String, Params)> {
        let mut params = Params::new();
        params.insert("index".to_string(), json!(self.index_name));
        params.insert("embedding".to_string(), json!(query));
        params.insert("k".to_string(), json!(k));

        let fetch = if filters.is_empty() {
            k
        } else {
            k * FILTER_OVERSAMPLE
        };
        params.insert("fetch".to_string(), json!(fetch));

        let mut predicates = Vec::new();
        if let Some(floor) = self.similarity_floor {
            params.insert("floor".to_string(), json!(floor));
            predicates.push("score >= $floor".to_string());
        }
        for (i, filter) in filters.iter().enumerate() {
            filter.validate()?;
            let name = format!("f{}", i);
            predicates.push(filter.to_cypher("node", &name));
            let value = serde_json::to_value(&filter.value)
                .map_err(|e| RetrievalError::InvalidFilter(e.to_string()))?;
            params.insert(name, value);
        }

        let projection = self
            .attributes
            .iter()
            .map(|a| format!(".{}", a))
            .collect::<Vec<_>>()
            .join(", ");

        let mut cypher = String::from(
            "CALL db.index.vector.queryNodes($index, $fetch, $embedding) YIELD node, score\n",
        );
        if !predicates.is_empty() {
            cypher.push_str(&format!("WHERE {}\n", predicates.join(" AND ")));
        }
        cypher.push_str(&format!(
            "RETURN coalesce(node.id, elementId(node)) AS id, labels(node)[0] AS label, score, node {{{}}} AS attributes\n\
             ORDER BY score DESC, id ASC\n\
             LIMIT $k",
            projection
        ));

        Ok((cypher, params))
    }

    fn to_candidate(row: Row) -> Option<RetrievalCandidate> {
        let id = match row.get("id")? {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            _ => return None,
        };
        let label = row.get("label").and_then(Value::as_str).unwrap_or("").to_string();
        let score = row.get("score").and_then(Value::as_f64)? as f32;
        let attributes = match row.get("attributes") {
            Some(Value::Map(map)) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Default::default(),
        };
        Some(RetrievalCandidate {
            id,
            label,
            score,
            attributes,
        })
    }
}

#[async_trait]
impl VectorRetriever for GraphVectorRetriever {
    async fn retrieve(
        &self,
        query: &[f32],
        k: usize,
        filters: &[AttributeFilter],
    ) -> RetrievalResult<Vec<RetrievalCandidate>> {
        let k = effective_k(k, self.max_k)?;
        if query.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let (cypher, params) = self.build_query(query, k, filters)?;
        debug!("Vector search on index {} (k={}, filters={})", self.index_name, k, filters.len());

        let rows = self.pool.run(&cypher, &params, self.query_timeout).await?;
        let total = rows.len();
        let candidates: Vec<RetrievalCandidate> =
            rows.into_iter().filter_map(Self::to_candidate).collect();
        if candidates.len() < total {
            warn!("Dropped {} malformed vector search rows", total - candidates.len());
        }

        // The store already orders, but ties and floors are re-applied locally
        Ok(rank(candidates, k, self.similarity_floor))
    }
}
