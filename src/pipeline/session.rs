//! Per-user conversation state

use crate::pipeline::{GraphRagPipeline, TurnOutcome, TurnReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One answered question, kept as context for follow-ups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    /// Query that produced the answer, if one ran successfully
    pub query: Option<String>,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, query: Option<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            query,
            at: Utc::now(),
        }
    }
}

/// A chat with one user.
///
/// Sessions share the pipeline (schema, clients, session pool) but nothing
/// mutable: the rolling history belongs to the session alone.
pub struct ChatSession {
    id: Uuid,
    pipeline: Arc<GraphRagPipeline>,
    history: VecDeque<ConversationTurn>,
    history_len: usize,
}

impl ChatSession {
    pub fn new(pipeline: Arc<GraphRagPipeline>) -> Self {
        let history_len = pipeline.history_len();
        let id = Uuid::new_v4();
        info!("Started chat session {}", id);
        Self {
            id,
            pipeline,
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Answer a question; never fails
    pub async fn ask(&mut self, question: &str) -> String {
        self.ask_detailed(question).await.answer
    }

    /// Answer a question and report the path taken
    pub async fn ask_detailed(&mut self, question: &str) -> TurnReport {
        let report = self
            .pipeline
            .answer(question, self.history.make_contiguous())
            .await;

        // Failed turns leave the history untouched
        if !matches!(report.outcome, TurnOutcome::Failed { .. }) && self.history_len > 0 {
            if self.history.len() == self.history_len {
                self.history.pop_front();
            }
            self.history.push_back(ConversationTurn::new(
                question.trim(),
                report.answer.clone(),
                report.query.clone(),
            ));
        }
        report
    }

    pub fn history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
