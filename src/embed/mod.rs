//! Embedding Client
//!
//! Turns free text into a fixed-length vector for similarity search.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use client::EmbeddingClient;

/// Embed errors
#[derive(Error, Debug)]
pub enum EmbedError {
    /// API error from the embedding provider
    #[error("Embedding API error: {0}")]
    ApiError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Input rejected before contacting the service
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type EmbedResult<T> = Result<T, EmbedError>;

/// Ordered vector of floats, fixed length per index
pub type EmbeddingVector = Vec<f32>;

/// What the embedded text will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskHint {
    /// A user question compared against stored documents
    Query,
    /// Stored content (movie title + overview)
    Document,
}

/// Text embedding service
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text; the result has exactly `dimensions()` entries
    async fn embed(&self, text: &str, hint: TaskHint) -> EmbedResult<EmbeddingVector>;

    fn dimensions(&self) -> usize;
}

/// Reject empty input and cut overly long input on a char boundary
pub fn prepare_input(text: &str, max_chars: usize) -> EmbedResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbedError::InvalidInput("text is empty".to_string()));
    }
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            debug!("Truncating embedding input from {} bytes to {}", trimmed.len(), cut);
            Ok(&trimmed[..cut])
        }
        None => Ok(trimmed),
    }
}

/// Check a returned vector against the configured dimensionality
pub fn check_dimensions(vector: EmbeddingVector, expected: usize) -> EmbedResult<EmbeddingVector> {
    if vector.len() != expected {
        return Err(EmbedError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(vector)
}
