//! Natural Language Querying (NLQ)
//!
//! Schema-grounded text-to-Cypher synthesis. The first prompt carries the
//! schema grounding block, the retrieved candidates and the question; a
//! repair prompt additionally carries the failed query and its error.

pub mod prompt;

use crate::config::LlmConfig;
use crate::executor::ExecutionError;
use crate::llm::{GenerationRequest, LlmError, TextGenerator};
use crate::pipeline::ConversationTurn;
use crate::retrieval::RetrievalCandidate;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("No well-formed Cypher query in model response: {0}")]
    Parse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// A model-written query and the question it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub text: String,
    pub question: String,
    /// 1 for the first synthesis, +1 for each repair
    pub attempt: u32,
}

pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
    schema: SchemaRegistry,
    temperature: f32,
    max_tokens: u32,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, schema: SchemaRegistry, config: &LlmConfig) -> Self {
        Self {
            generator,
            schema,
            temperature: config.synthesis_temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// First attempt at a query for `question`
    pub async fn synthesize(
        &self,
        question: &str,
        candidates: &[RetrievalCandidate],
        history: &[ConversationTurn],
    ) -> SynthesisResult<GeneratedQuery> {
        let prompt = prompt::build_synthesis_prompt(
            self.schema.grounding(),
            candidates,
            history,
            question,
        );
        let text = self.complete(prompt).await?;
        info!("Synthesized query (attempt 1)");
        Ok(GeneratedQuery {
            text,
            question: question.to_string(),
            attempt: 1,
        })
    }

    /// Ask for a corrected version of `prior` given the error it produced
    pub async fn repair(
        &self,
        prior: &GeneratedQuery,
        error: &ExecutionError,
        candidates: &[RetrievalCandidate],
    ) -> SynthesisResult<GeneratedQuery> {
        let prompt = prompt::build_repair_prompt(
            self.schema.grounding(),
            candidates,
            &prior.question,
            &prior.text,
            error,
        );
        let text = self.complete(prompt).await?;
        info!("Synthesized repaired query (attempt {})", prior.attempt + 1);
        Ok(GeneratedQuery {
            text,
            question: prior.question.clone(),
            attempt: prior.attempt + 1,
        })
    }

    async fn complete(&self, prompt: String) -> SynthesisResult<String> {
        debug!("Synthesis prompt:\n{}", prompt);
        let request = GenerationRequest::new(prompt::SYNTHESIS_SYSTEM_PROMPT, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let response = self.generator.generate(&request).await?;

        match extract_cypher(&response) {
            Some(query) => {
                debug!("Extracted query: {}", query);
                Ok(query)
            }
            None => {
                warn!("Model response contained no query");
                let mut preview: String = response.chars().take(120).collect();
                if preview.len() < response.len() {
                    preview.push_str("...");
                }
                Err(SynthesisError::Parse(preview))
            }
        }
    }
}

const CLAUSE_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "WHERE", "WITH", "UNWIND", "CALL", "RETURN", "ORDER", "SKIP", "LIMIT",
    "UNION", "AND", "OR",
];

fn starts_with_clause(line: &str) -> bool {
    let upper = line.trim_start().to_uppercase();
    CLAUSE_KEYWORDS.iter().any(|kw| {
        upper.starts_with(kw)
            && upper[kw.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_')
    })
}

/// Well-formed enough to hand to the executor: reads something and
/// returns something
fn is_well_formed(query: &str) -> bool {
    let upper = crate::cypher::mask_literals(query).to_uppercase();
    let reads = ["MATCH", "CALL", "UNWIND", "WITH"]
        .iter()
        .any(|kw| upper.contains(kw));
    reads && upper.contains("RETURN")
}

/// Pull the query out of a model response.
///
/// A fenced code block wins; otherwise the contiguous run of lines that
/// start with a clause keyword. Trailing semicolons are dropped.
pub fn extract_cypher(response: &str) -> Option<String> {
    let trimmed = response.trim();

    let candidate = if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let first_line = after_fence.split('\n').next().unwrap_or("");
        let code_start = if starts_with_clause(first_line) {
            0
        } else if let Some(i) = after_fence.find('\n') {
            // Language tag line, e.g. "cypher\n"
            i + 1
        } else {
            // Single line with a tag: "```cypher MATCH ... ```"
            let lead = after_fence.len() - after_fence.trim_start().len();
            after_fence[lead..]
                .find(char::is_whitespace)
                .map_or(after_fence.len(), |i| lead + i)
        };
        let body = &after_fence[code_start..];
        let end = body.find("```").unwrap_or(body.len());
        body[..end].trim().to_string()
    } else {
        let lines: Vec<&str> = trimmed
            .lines()
            .skip_while(|line| !starts_with_clause(line))
            .take_while(|line| !line.trim().is_empty())
            .collect();
        lines.join("\n").trim().to_string()
    };

    let query = candidate.trim_end_matches(';').trim().to_string();
    if query.is_empty() || !is_well_formed(&query) {
        return None;
    }
    Some(query)
}
