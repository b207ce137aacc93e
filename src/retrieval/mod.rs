//! Vector Retriever
//!
//! Top-k semantically similar entities for a query vector. Both backends
//! rank by cosine similarity, descending, with ties broken by ascending
//! entity id so repeated runs return identical candidates.

pub mod graph;
pub mod memory;

use crate::store::{StoreError, Value};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

pub use graph::GraphVectorRetriever;
pub use memory::InMemoryRetriever;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("k must be greater than 0")]
    InvalidK,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),
}

impl From<StoreError> for RetrievalError {
    fn from(e: StoreError) -> Self {
        RetrievalError::IndexUnavailable(e.to_string())
    }
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// An entity similar to the query, with the attributes prompts need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    pub label: String,
    /// Cosine similarity to the query vector
    pub score: f32,
    pub attributes: IndexMap<String, Value>,
}

impl RetrievalCandidate {
    /// Display name: title for movies, name for people and genres
    pub fn display_name(&self) -> &str {
        ["title", "name"]
            .iter()
            .find_map(|k| self.attributes.get(*k).and_then(Value::as_str))
            .unwrap_or(self.id.as_str())
    }
}

/// Comparison applied to a candidate attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on strings (case-insensitive), membership on lists
    Contains,
}

/// Attribute predicate narrowing the candidate set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub attribute: String,
    pub op: FilterOp,
    pub value: Value,
}

impl AttributeFilter {
    pub fn new(attribute: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    /// Attribute names are spliced into Cypher, so only plain identifiers pass
    pub fn validate(&self) -> RetrievalResult<()> {
        let mut chars = self.attribute.chars();
        let ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if ok {
            Ok(())
        } else {
            Err(RetrievalError::InvalidFilter(format!(
                "attribute name `{}` is not an identifier",
                self.attribute
            )))
        }
    }

    /// Evaluate against a concrete attribute value (missing = null)
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = match actual {
            Some(v) if !v.is_null() => v,
            _ => return self.op == FilterOp::NotEq && !self.value.is_null(),
        };

        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::NotEq => !values_equal(actual, &self.value),
            FilterOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Contains => match (actual, &self.value) {
                (Value::String(hay), Value::String(needle)) => {
                    hay.to_lowercase().contains(&needle.to_lowercase())
                }
                (Value::List(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                _ => false,
            },
        }
    }

    /// Cypher predicate over `var`, with the value bound to `$param`
    pub fn to_cypher(&self, var: &str, param: &str) -> String {
        let lhs = format!("{}.{}", var, self.attribute);
        match self.op {
            FilterOp::Eq => format!("{} = ${}", lhs, param),
            FilterOp::NotEq => format!("{} <> ${}", lhs, param),
            FilterOp::Gt => format!("{} > ${}", lhs, param),
            FilterOp::Gte => format!("{} >= ${}", lhs, param),
            FilterOp::Lt => format!("{} < ${}", lhs, param),
            FilterOp::Lte => format!("{} <= ${}", lhs, param),
            FilterOp::Contains => match self.value {
                Value::String(_) => format!("toLower({}) CONTAINS toLower(${})", lhs, param),
                _ => format!("${} IN {}", param, lhs),
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Validate a requested k and clamp it to `max_k`
pub fn effective_k(k: usize, max_k: usize) -> RetrievalResult<usize> {
    if k == 0 {
        return Err(RetrievalError::InvalidK);
    }
    Ok(k.min(max_k))
}

/// Order by score descending then id ascending, drop those under the
/// floor, keep the first `k`
pub fn rank(
    mut candidates: Vec<RetrievalCandidate>,
    k: usize,
    floor: Option<f32>,
) -> Vec<RetrievalCandidate> {
    if let Some(floor) = floor {
        candidates.retain(|c| c.score >= floor);
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(k);
    candidates
}

/// Nearest-neighbour search over stored entity embeddings
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Up to `k` candidates (capped), best first. An empty result is not
    /// an error.
    async fn retrieve(
        &self,
        query: &[f32],
        k: usize,
        filters: &[AttributeFilter],
    ) -> RetrievalResult<Vec<RetrievalCandidate>>;
}
