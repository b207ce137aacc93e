//! Pipeline Orchestrator
//!
//! One turn: embed the question, retrieve candidates, synthesize a query,
//! execute it under the repair loop, summarize the rows. Every failure is
//! turned into a user-facing message here; `answer` never returns `Err`.

pub mod session;

use crate::config::RagConfig;
use crate::embed::{Embedder, EmbeddingClient, TaskHint};
use crate::error::RagResult;
use crate::executor::{ErrorKind, ExecutionResult, QueryExecutor};
use crate::llm::{LlmClient, TextGenerator};
use crate::nlq::QuerySynthesizer;
use crate::repair::{AttemptFailure, QueryRunner, RepairLoop, RepairState, SynthesisReviser};
use crate::retrieval::{GraphVectorRetriever, VectorRetriever};
use crate::schema::SchemaRegistry;
use crate::store::{GraphStore, Neo4jHttpStore, SessionPool};
use crate::summarize::{render_table, Summarizer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use session::{ChatSession, ConversationTurn};

pub const EMPTY_QUESTION_MESSAGE: &str =
    "Please ask me something about movies, for example \"Which time travel movies star Bruce Willis?\"";

pub const PROCESSING_FAILED_MESSAGE: &str =
    "Sorry, I couldn't process your request right now. Please try again in a moment.";

pub const NO_ANSWER_MESSAGE: &str =
    "Sorry, I couldn't work out how to answer that from the movie graph. Try rephrasing the question.";

pub const READ_ONLY_MESSAGE: &str =
    "Sorry, I can only look things up in the movie graph, not change it.";

/// Which path a turn took
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// Rows summarized by the model
    Answered,
    /// Query ran and returned nothing
    NoMatches,
    /// Summarization failed; the answer is a plain table of the rows
    Fallback,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub answer: String,
    pub outcome: TurnOutcome,
    /// Last query executed, if any
    pub query: Option<String>,
    /// Queries attempted, including repairs
    pub attempts: u32,
    pub repair_state: Option<RepairState>,
}

impl TurnReport {
    fn failed(answer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            outcome: TurnOutcome::Failed { reason: reason.into() },
            query: None,
            attempts: 0,
            repair_state: None,
        }
    }
}

/// Externally constructed collaborators of a pipeline
pub struct PipelineParts {
    pub embedder: Arc<dyn Embedder>,
    pub retriever: Arc<dyn VectorRetriever>,
    pub generator: Arc<dyn TextGenerator>,
    pub runner: Arc<dyn QueryRunner>,
    pub schema: SchemaRegistry,
}

/// The shared, read-only part of the system. Wrap in `Arc` and hand one
/// `ChatSession` to each user.
pub struct GraphRagPipeline {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn VectorRetriever>,
    synthesizer: QuerySynthesizer,
    runner: Arc<dyn QueryRunner>,
    repair: RepairLoop,
    summarizer: Summarizer,
    default_k: usize,
    history_len: usize,
    show_failed_query: bool,
    pool: Option<SessionPool>,
}

impl GraphRagPipeline {
    pub fn new(parts: PipelineParts, config: &RagConfig) -> Self {
        Self {
            embedder: parts.embedder,
            retriever: parts.retriever,
            synthesizer: QuerySynthesizer::new(parts.generator.clone(), parts.schema, &config.llm),
            runner: parts.runner,
            repair: RepairLoop::new(config.repair.max_retries),
            summarizer: Summarizer::new(parts.generator, &config.llm, &config.summarizer),
            default_k: config.retrieval.default_k,
            history_len: config.session.history_len,
            show_failed_query: config.session.show_failed_query,
            pool: None,
        }
    }

    /// Pipeline over an arbitrary graph store: the store backs both vector
    /// retrieval and query execution through one session pool
    pub fn with_store(
        config: &RagConfig,
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let schema = SchemaRegistry::movies();
        let pool = SessionPool::new(store, config.graph.pool_size, config.graph.acquire_timeout());
        let retriever = GraphVectorRetriever::new(
            pool.clone(),
            &config.retrieval,
            config.embedding.dimensions,
            config.executor.timeout(),
        );
        let executor = QueryExecutor::new(pool.clone(), &schema, &config.executor);

        let mut pipeline = Self::new(
            PipelineParts {
                embedder,
                retriever: Arc::new(retriever),
                generator,
                runner: Arc::new(executor),
                schema,
            },
            config,
        );
        pipeline.pool = Some(pool);
        pipeline
    }

    /// Build the HTTP clients and the Neo4j store described by `config`
    pub fn from_config(config: &RagConfig) -> RagResult<Self> {
        config.validate()?;
        let store = Neo4jHttpStore::new(&config.graph)?;
        let embedder = EmbeddingClient::new(&config.embedding)?;
        let generator = LlmClient::new(&config.llm)?;
        info!(
            "Pipeline ready: llm={:?}/{} embedding={:?}/{} graph={}",
            config.llm.provider,
            config.llm.model,
            config.embedding.provider,
            config.embedding.model,
            config.graph.url
        );
        Ok(Self::with_store(
            config,
            Arc::new(store),
            Arc::new(embedder),
            Arc::new(generator),
        ))
    }

    pub fn schema(&self) -> &SchemaRegistry {
        self.synthesizer.schema()
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Stop handing out graph sessions
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close();
            info!("Graph session pool closed");
        }
    }

    /// Run one turn with `history` as conversational context
    pub async fn answer(&self, question: &str, history: &[ConversationTurn]) -> TurnReport {
        let question = question.trim();
        if question.is_empty() {
            return TurnReport::failed(EMPTY_QUESTION_MESSAGE, "empty question");
        }
        info!("Answering: {}", question);

        let vector = match self.embedder.embed(question, TaskHint::Query).await {
            Ok(v) => v,
            Err(e) => {
                error!("Embedding failed: {}", e);
                return TurnReport::failed(PROCESSING_FAILED_MESSAGE, e.to_string());
            }
        };

        let candidates = match self.retriever.retrieve(&vector, self.default_k, &[]).await {
            Ok(c) => c,
            Err(e) => {
                error!("Retrieval failed: {}", e);
                return TurnReport::failed(PROCESSING_FAILED_MESSAGE, e.to_string());
            }
        };
        info!("Retrieved {} candidates", candidates.len());

        let query = match self.synthesizer.synthesize(question, &candidates, history).await {
            Ok(q) => q,
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                return TurnReport::failed(NO_ANSWER_MESSAGE, e.to_string());
            }
        };

        let reviser = SynthesisReviser {
            synthesizer: &self.synthesizer,
            candidates: &candidates,
        };
        let outcome = self.repair.run(query, self.runner.as_ref(), &reviser).await;

        if !outcome.succeeded() {
            let reason = outcome
                .last_failure()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "repair exhausted".to_string());
            let unsafe_query = matches!(
                outcome.last_failure(),
                Some(AttemptFailure::Execution(e)) if e.kind == ErrorKind::UnsafeQuery
            );
            let mut answer = if unsafe_query {
                READ_ONLY_MESSAGE.to_string()
            } else {
                NO_ANSWER_MESSAGE.to_string()
            };
            if self.show_failed_query {
                answer.push_str(&format!("\n\nLast query tried:\n{}", outcome.query.text));
            }
            return TurnReport {
                answer,
                outcome: TurnOutcome::Failed { reason },
                query: Some(outcome.query.text),
                attempts: outcome.attempts,
                repair_state: Some(outcome.state),
            };
        }

        let (rows, truncated) = match &outcome.result {
            ExecutionResult::Success { rows, truncated } => (rows.as_slice(), *truncated),
            ExecutionResult::Failure(_) => (&[][..], false),
        };

        let (answer, turn_outcome) = match self.summarizer.summarize(question, &outcome.result).await {
            Ok(answer) if rows.is_empty() => (answer, TurnOutcome::NoMatches),
            Ok(answer) => (answer, TurnOutcome::Answered),
            Err(e) => {
                warn!("Summarization failed, falling back to a table: {}", e);
                (
                    format!(
                        "Here is what I found in the movie graph:\n{}",
                        render_table(rows, truncated)
                    ),
                    TurnOutcome::Fallback,
                )
            }
        };

        TurnReport {
            answer,
            outcome: turn_outcome,
            query: Some(outcome.query.text.clone()),
            attempts: outcome.attempts,
            repair_state: Some(outcome.state),
        }
    }
}
