//! Crate-level error type
//!
//! Per-component errors stay in their modules; `RagError` gathers them for
//! callers that drive the whole pipeline (construction, CLI).

use crate::config::ConfigError;
use crate::embed::EmbedError;
use crate::executor::ExecutionError;
use crate::llm::LlmError;
use crate::nlq::SynthesisError;
use crate::retrieval::RetrievalError;
use crate::store::StoreError;
use crate::summarize::SummarizationError;
use crate::vector::VectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedding service error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Query synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Query execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Summarization error: {0}")]
    Summarization(#[from] SummarizationError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Graph store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vector index error: {0}")]
    Vector(#[from] VectorError),
}

pub type RagResult<T> = Result<T, RagError>;
