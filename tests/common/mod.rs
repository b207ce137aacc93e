//! In-process stand-ins for the external services

#![allow(dead_code)]

use async_trait::async_trait;
use cinegraph::embed::EmbedResult;
use cinegraph::llm::LlmResult;
use cinegraph::nlq::prompt::SYNTHESIS_SYSTEM_PROMPT;
use cinegraph::repair::QueryRunner;
use cinegraph::retrieval::RetrievalResult;
use cinegraph::store::{Params, StoreResult};
use cinegraph::{
    AttributeFilter, EmbedError, Embedder, EmbeddingVector, ExecutionResult, GeneratedQuery,
    GenerationRequest, GraphStore, LlmError, RetrievalCandidate, Row, TaskHint, TextGenerator,
    Value, VectorRetriever,
};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const DEFAULT_QUERY: &str = "MATCH (m:Movie) RETURN m.title AS title LIMIT 5";

pub fn fenced(query: &str) -> String {
    format!("Sure! Here is the query:\n```cypher\n{}\n```", query)
}

pub fn title_rows(titles: &[&str]) -> Vec<Row> {
    titles
        .iter()
        .map(|t| {
            let mut row = Row::new();
            row.insert("title".to_string(), Value::from(*t));
            row
        })
        .collect()
}

pub fn candidate(id: &str, title: &str, score: f32) -> RetrievalCandidate {
    let mut attributes = IndexMap::new();
    attributes.insert("title".to_string(), Value::from(title));
    RetrievalCandidate {
        id: id.to_string(),
        label: "Movie".to_string(),
        score,
        attributes,
    }
}

// ============================================================================
// Embedding service
// ============================================================================

pub struct FixedEmbedder {
    pub vector: Vec<f32>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![1.0, 0.0, 0.0])
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str, _hint: TaskHint) -> EmbedResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbedError::NetworkError("connection refused".to_string()));
        }
        Ok(self.vector.clone())
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

// ============================================================================
// Retriever
// ============================================================================

pub struct StubRetriever {
    pub candidates: Vec<RetrievalCandidate>,
}

impl StubRetriever {
    /// Three time-travel films
    pub fn time_travel() -> Self {
        Self {
            candidates: vec![
                candidate("m63", "Twelve Monkeys", 0.91),
                candidate("m59967", "Looper", 0.88),
                candidate("m105", "Back to the Future", 0.83),
            ],
        }
    }
}

#[async_trait]
impl VectorRetriever for StubRetriever {
    async fn retrieve(
        &self,
        _query: &[f32],
        k: usize,
        _filters: &[AttributeFilter],
    ) -> RetrievalResult<Vec<RetrievalCandidate>> {
        Ok(self.candidates.iter().take(k).cloned().collect())
    }
}

// ============================================================================
// Generative model
// ============================================================================

/// Answers synthesis prompts from a script and summary prompts by listing
/// the titles found in the rows
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    pub summary_fails: bool,
    pub synthesis_prompts: Mutex<Vec<String>>,
    pub summary_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            summary_fails: false,
            synthesis_prompts: Mutex::new(Vec::new()),
            summary_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_summaries(mut self) -> Self {
        self.summary_fails = true;
        self
    }

    pub fn synthesis_calls(&self) -> usize {
        self.synthesis_prompts.lock().unwrap().len()
    }

    pub fn synthesis_prompt(&self, i: usize) -> String {
        self.synthesis_prompts.lock().unwrap()[i].clone()
    }
}

fn narrate(prompt: &str) -> String {
    let titles: Vec<&str> = prompt
        .lines()
        .filter_map(|line| line.split("title: ").nth(1))
        .map(|rest| rest.split(';').next().unwrap_or(rest).trim())
        .collect();
    format!("You could watch {}.", titles.join(" or "))
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> LlmResult<String> {
        if request.system_prompt == SYNTHESIS_SYSTEM_PROMPT {
            self.synthesis_prompts.lock().unwrap().push(request.prompt.clone());
            let reply = self.replies.lock().unwrap().pop_front();
            return Ok(reply.unwrap_or_else(|| fenced(DEFAULT_QUERY)));
        }

        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if self.summary_fails {
            return Err(LlmError::NetworkError("summary model unavailable".to_string()));
        }
        Ok(narrate(&request.prompt))
    }
}

// ============================================================================
// Graph store and executor
// ============================================================================

/// Replays scripted results; records every query it receives
pub struct ScriptedStore {
    responses: Mutex<VecDeque<StoreResult<Vec<Row>>>>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new(responses: Vec<StoreResult<Vec<Row>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl GraphStore for ScriptedStore {
    async fn run(&self, query: &str, _params: &Params) -> StoreResult<Vec<Row>> {
        self.queries.lock().unwrap().push(query.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Executor stand-in that replays scripted results
pub struct ScriptedRunner {
    results: Mutex<VecDeque<ExecutionResult>>,
    pub executed: Mutex<Vec<GeneratedQuery>>,
}

impl ScriptedRunner {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<GeneratedQuery> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryRunner for ScriptedRunner {
    async fn run_query(&self, query: &GeneratedQuery) -> ExecutionResult {
        self.executed.lock().unwrap().push(query.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExecutionResult::Success {
                rows: Vec::new(),
                truncated: false,
            })
    }
}
