//! Schema Registry
//!
//! Static description of the movie knowledge graph: node labels with their
//! attributes and relationship types with their allowed direction. The
//! registry is built once at startup and only read afterwards; its rendered
//! form is the grounding block injected into synthesis prompts.

pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

pub use validator::{SchemaValidator, SchemaViolation};

/// Scalar kinds an attribute can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    StringList,
}

impl AttributeKind {
    fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::String => "STRING",
            AttributeKind::Integer => "INTEGER",
            AttributeKind::Float => "FLOAT",
            AttributeKind::Boolean => "BOOLEAN",
            AttributeKind::Date => "DATE",
            AttributeKind::StringList => "LIST<STRING>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeSpec {
    pub fn new(name: &str, kind: AttributeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// A node label and the attributes its nodes carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub label: String,
    pub attributes: Vec<AttributeSpec>,
}

/// A relationship type, directed from `source` to `target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub name: String,
    pub source: String,
    pub target: String,
    pub attributes: Vec<AttributeSpec>,
}

/// Entity and relationship types of the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub entities: Vec<EntityType>,
    pub relationships: Vec<RelationshipType>,
}

impl SchemaDescriptor {
    /// The movie graph: movies, the people who act in and direct them,
    /// and their genres
    pub fn movies() -> Self {
        use AttributeKind as K;

        let entity = |label: &str, attrs: &[(&str, AttributeKind)]| EntityType {
            label: label.to_string(),
            attributes: attrs.iter().map(|(n, k)| AttributeSpec::new(n, *k)).collect(),
        };
        let rel = |name: &str, source: &str, target: &str, attrs: &[(&str, AttributeKind)]| {
            RelationshipType {
                name: name.to_string(),
                source: source.to_string(),
                target: target.to_string(),
                attributes: attrs.iter().map(|(n, k)| AttributeSpec::new(n, *k)).collect(),
            }
        };

        Self {
            entities: vec![
                entity(
                    "Movie",
                    &[
                        ("id", K::String),
                        ("title", K::String),
                        ("tagline", K::String),
                        ("overview", K::String),
                        ("release_date", K::Date),
                        ("runtime", K::Integer),
                        ("vote_average", K::Float),
                        ("original_language", K::String),
                    ],
                ),
                entity("Actor", &[("id", K::String), ("name", K::String)]),
                entity("Director", &[("id", K::String), ("name", K::String)]),
                entity("Genre", &[("name", K::String)]),
            ],
            relationships: vec![
                rel("ACTED_IN", "Actor", "Movie", &[("character", K::String)]),
                rel("DIRECTED", "Director", "Movie", &[]),
                rel("HAS_GENRE", "Movie", "Genre", &[]),
            ],
        }
    }

    pub fn entity(&self, label: &str) -> Option<&EntityType> {
        self.entities.iter().find(|e| e.label == label)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipType> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.entity(label).is_some()
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationship(name).is_some()
    }

    /// Whether nodes with `label` (or relationships of that type) carry `attribute`
    pub fn has_attribute(&self, label: &str, attribute: &str) -> bool {
        let attrs = match self.entity(label) {
            Some(e) => &e.attributes,
            None => match self.relationship(label) {
                Some(r) => &r.attributes,
                None => return false,
            },
        };
        attrs.iter().any(|a| a.name == attribute)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.label.as_str())
    }

    pub fn relationship_names(&self) -> impl Iterator<Item = &str> {
        self.relationships.iter().map(|r| r.name.as_str())
    }

    /// Render the grounding block for prompts. Pure: the same descriptor
    /// always renders to the same text.
    pub fn render(&self) -> String {
        let mut out = String::from("Node labels:\n");
        for entity in &self.entities {
            let _ = writeln!(out, "- {} {}", entity.label, render_attributes(&entity.attributes));
        }
        out.push_str("Relationships:\n");
        for rel in &self.relationships {
            let attrs = if rel.attributes.is_empty() {
                String::new()
            } else {
                format!(" {}", render_attributes(&rel.attributes))
            };
            let _ = writeln!(out, "- (:{})-[:{}{}]->(:{})", rel.source, rel.name, attrs, rel.target);
        }
        out
    }
}

fn render_attributes(attrs: &[AttributeSpec]) -> String {
    let inner: Vec<String> = attrs
        .iter()
        .map(|a| format!("{}: {}", a.name, a.kind.as_str()))
        .collect();
    format!("{{{}}}", inner.join(", "))
}

/// Read-only holder of the schema and its rendered grounding block
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    descriptor: Arc<SchemaDescriptor>,
    rendered: Arc<str>,
}

impl SchemaRegistry {
    pub fn new(descriptor: SchemaDescriptor) -> Self {
        let rendered: Arc<str> = descriptor.render().into();
        Self {
            descriptor: Arc::new(descriptor),
            rendered,
        }
    }

    pub fn movies() -> Self {
        Self::new(SchemaDescriptor::movies())
    }

    pub fn describe(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    /// Grounding block, rendered once at construction
    pub fn grounding(&self) -> &str {
        &self.rendered
    }

    pub fn validator(&self) -> SchemaValidator {
        SchemaValidator::new(self.descriptor.clone())
    }
}
