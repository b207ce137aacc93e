//! Graph entity (a node of the knowledge graph)

use crate::embed::EmbeddingVector;
use crate::store::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the movie graph
///
/// Movies additionally own an embedding of their plain-text fields
/// (title, tagline, overview); other entities carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: String,
    /// Type label (Movie, Actor, Genre, ...)
    pub label: String,
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
}

impl Entity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            attributes: BTreeMap::new(),
            embedding: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The plain text an embedding of this entity is computed from
    pub fn embedding_text(&self) -> String {
        ["title", "tagline", "overview", "name"]
            .iter()
            .filter_map(|k| self.get(k).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
