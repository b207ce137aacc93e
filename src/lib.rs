//! Cinegraph
//!
//! Question answering over a movie knowledge graph (GraphRAG): vector
//! similarity search picks candidate entities, a language model writes a
//! schema-grounded Cypher query, the query runs read-only against the graph
//! with a bounded repair loop, and the rows are narrated back as an answer.
//!
//! # Architecture
//!
//! - `embed`: text to fixed-length vectors (OpenAI, Ollama, Gemini)
//! - `retrieval`: top-k similar entities, from the graph's vector index or
//!   an in-process `vector::VectorIndex`
//! - `schema`: the movie schema, its prompt rendering, and a static validator
//! - `nlq`: question + candidates + schema to a `GeneratedQuery`
//! - `executor`: read-only guard, row cap, timeout, error classification
//! - `repair`: bounded re-prompting on execution failure
//! - `summarize`: rows to a conversational answer
//! - `pipeline`: per-turn orchestration and chat sessions
//! - `store`: graph store boundary (Neo4j HTTP) and session pool
//!
//! ## Example Usage
//!
//! ```no_run
//! use cinegraph::{ChatSession, GraphRagPipeline, RagConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), cinegraph::RagError> {
//! let mut config = RagConfig::from_yaml_file("cinegraph.yaml")?;
//! config.apply_env();
//!
//! let pipeline = Arc::new(GraphRagPipeline::from_config(&config)?);
//! let mut session = ChatSession::new(pipeline);
//! let answer = session.ask("Which time travel movies star Bruce Willis?").await;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cypher;
pub mod embed;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod nlq;
pub mod pipeline;
pub mod repair;
pub mod retrieval;
pub mod schema;
pub mod store;
pub mod summarize;
pub mod vector;

// Re-export main types for convenience
pub use config::{ConfigError, LLMProvider, RagConfig};

pub use embed::{EmbedError, Embedder, EmbeddingClient, EmbeddingVector, TaskHint};

pub use error::{RagError, RagResult};

pub use executor::{ErrorKind, ExecutionError, ExecutionResult, QueryExecutor};

pub use graph::Entity;

pub use llm::{GenerationRequest, LlmClient, LlmError, TextGenerator};

pub use nlq::{GeneratedQuery, QuerySynthesizer, SynthesisError};

pub use pipeline::{
    ChatSession, ConversationTurn, GraphRagPipeline, PipelineParts, TurnOutcome, TurnReport,
};

pub use repair::{RepairLoop, RepairOutcome, RepairState};

pub use retrieval::{
    AttributeFilter, FilterOp, GraphVectorRetriever, InMemoryRetriever, RetrievalCandidate,
    RetrievalError, VectorRetriever,
};

pub use schema::{SchemaDescriptor, SchemaRegistry, SchemaValidator};

pub use store::{GraphStore, Neo4jHttpStore, Row, SessionPool, StoreError, Value};

pub use summarize::{SummarizationError, Summarizer};

pub use vector::VectorIndex;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
