//! Query Repair Loop
//!
//! Bounded retry around execution. Every failed attempt is recorded as a
//! tagged `AttemptFailure` and the next step is chosen by an explicit
//! state transition:
//!
//! ```text
//! INITIAL --ok--> SUCCEEDED
//! INITIAL --repairable failure, budget left--> RETRYING
//! RETRYING --ok--> SUCCEEDED
//! RETRYING --repairable failure, budget left--> RETRYING
//! any --fatal failure or budget spent--> EXHAUSTED
//! ```
//!
//! With `max_retries = n` at most `n + 1` queries are attempted.

use crate::executor::{ExecutionError, ExecutionResult, QueryExecutor};
use crate::nlq::{GeneratedQuery, QuerySynthesizer, SynthesisError, SynthesisResult};
use crate::retrieval::RetrievalCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairState {
    Initial,
    Retrying,
    Succeeded,
    Exhausted,
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairState::Initial => "INITIAL",
            RepairState::Retrying => "RETRYING",
            RepairState::Succeeded => "SUCCEEDED",
            RepairState::Exhausted => "EXHAUSTED",
        };
        f.write_str(name)
    }
}

/// Why an attempt did not produce rows
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The query ran (or was prechecked) and failed
    Execution(ExecutionError),
    /// The model's repair reply held no usable query
    Parse(String),
    /// The model could not be reached
    Model(String),
}

impl AttemptFailure {
    fn is_fatal(&self) -> bool {
        match self {
            AttemptFailure::Execution(e) => !e.kind.is_repairable(),
            AttemptFailure::Parse(_) => false,
            AttemptFailure::Model(_) => true,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Execution(e) => write!(f, "{}", e),
            AttemptFailure::Parse(m) => write!(f, "unparseable model reply: {}", m),
            AttemptFailure::Model(m) => write!(f, "model unavailable: {}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Query text, absent when no query was produced
    pub query: Option<String>,
    pub failure: AttemptFailure,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub state: RepairState,
    /// Last query that was executed
    pub query: GeneratedQuery,
    /// Result of that execution
    pub result: ExecutionResult,
    /// Attempts consumed, including unparseable repairs
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    /// Ended by a failure that retrying cannot fix
    pub fatal: bool,
}

impl RepairOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == RepairState::Succeeded
    }

    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.history.last().map(|r| &r.failure)
    }
}

/// Executes a query; failures are values
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run_query(&self, query: &GeneratedQuery) -> ExecutionResult;
}

#[async_trait]
impl QueryRunner for QueryExecutor {
    async fn run_query(&self, query: &GeneratedQuery) -> ExecutionResult {
        self.execute(query).await
    }
}

/// Produces a corrected query from a failed one
#[async_trait]
pub trait QueryReviser: Send + Sync {
    async fn revise(
        &self,
        prior: &GeneratedQuery,
        error: &ExecutionError,
    ) -> SynthesisResult<GeneratedQuery>;
}

/// Synthesizer-backed reviser for one turn's candidates
pub struct SynthesisReviser<'a> {
    pub synthesizer: &'a QuerySynthesizer,
    pub candidates: &'a [RetrievalCandidate],
}

#[async_trait]
impl QueryReviser for SynthesisReviser<'_> {
    async fn revise(
        &self,
        prior: &GeneratedQuery,
        error: &ExecutionError,
    ) -> SynthesisResult<GeneratedQuery> {
        self.synthesizer.repair(prior, error, self.candidates).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepairLoop {
    max_retries: u32,
}

impl RepairLoop {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute `initial`, repairing on failure until success, a fatal
    /// failure, or the retry budget is spent
    pub async fn run(
        &self,
        initial: GeneratedQuery,
        runner: &dyn QueryRunner,
        reviser: &dyn QueryReviser,
    ) -> RepairOutcome {
        let mut state = RepairState::Initial;
        let mut attempts = 1;
        let mut history = Vec::new();
        let mut query = GeneratedQuery { attempt: attempts, ..initial };
        let mut result = runner.run_query(&query).await;

        loop {
            let error = match &result {
                ExecutionResult::Success { .. } => {
                    info!("Repair loop {} -> SUCCEEDED after {} attempt(s)", state, attempts);
                    state = RepairState::Succeeded;
                    break;
                }
                ExecutionResult::Failure(e) => e.clone(),
            };

            let failure = AttemptFailure::Execution(error.clone());
            let fatal = failure.is_fatal();
            history.push(AttemptRecord {
                attempt: attempts,
                query: Some(query.text.clone()),
                failure,
            });
            if fatal || attempts > self.max_retries {
                return self.exhausted(state, query, result, attempts, history, fatal);
            }

            if state != RepairState::Retrying {
                info!("Repair loop {} -> RETRYING after {}", state, error.kind);
                state = RepairState::Retrying;
            }

            // Unparseable replies use up attempts without executing anything
            let revised = loop {
                attempts += 1;
                match reviser.revise(&query, &error).await {
                    Ok(revised) => break revised,
                    Err(e) => {
                        let failure = match e {
                            SynthesisError::Parse(m) => AttemptFailure::Parse(m),
                            SynthesisError::Llm(e) => AttemptFailure::Model(e.to_string()),
                        };
                        warn!("Repair attempt {} produced no query: {}", attempts, failure);
                        let fatal = failure.is_fatal();
                        history.push(AttemptRecord {
                            attempt: attempts,
                            query: None,
                            failure,
                        });
                        if fatal || attempts > self.max_retries {
                            return self.exhausted(state, query, result, attempts, history, fatal);
                        }
                    }
                }
            };

            query = GeneratedQuery { attempt: attempts, ..revised };
            result = runner.run_query(&query).await;
        }

        RepairOutcome {
            state,
            query,
            result,
            attempts,
            history,
            fatal: false,
        }
    }

    fn exhausted(
        &self,
        from: RepairState,
        query: GeneratedQuery,
        result: ExecutionResult,
        attempts: u32,
        history: Vec<AttemptRecord>,
        fatal: bool,
    ) -> RepairOutcome {
        warn!(
            "Repair loop {} -> EXHAUSTED after {} attempt(s){}",
            from,
            attempts,
            if fatal { " (fatal)" } else { "" }
        );
        RepairOutcome {
            state: RepairState::Exhausted,
            query,
            result,
            attempts,
            history,
            fatal,
        }
    }
}
