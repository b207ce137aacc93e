//! Summarizer
//!
//! Turns result rows into a conversational answer. The model only sees the
//! rows it must talk about; an empty result short-circuits to a fixed
//! message so nothing can be invented for it.

use crate::config::{LlmConfig, SummarizerConfig};
use crate::executor::ExecutionResult;
use crate::llm::{GenerationRequest, LlmError, TextGenerator};
use crate::nlq::prompt;
use crate::store::Row;
use comfy_table::{ContentArrangement, Table};
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SummarizationError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Nothing to summarize: {0}")]
    FailedExecution(String),
}

pub type SummaryResult<T> = Result<T, SummarizationError>;

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    temperature: f32,
    max_tokens: u32,
    max_prompt_rows: usize,
    no_matches_message: String,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, llm: &LlmConfig, config: &SummarizerConfig) -> Self {
        Self {
            generator,
            temperature: llm.summary_temperature,
            max_tokens: llm.max_tokens,
            // at least one row always reaches the model
            max_prompt_rows: config.max_prompt_rows.max(1),
            no_matches_message: config.no_matches_message.clone(),
        }
    }

    pub fn no_matches_message(&self) -> &str {
        &self.no_matches_message
    }

    pub async fn summarize(&self, question: &str, result: &ExecutionResult) -> SummaryResult<String> {
        let (rows, truncated) = match result {
            ExecutionResult::Success { rows, truncated } => (rows, *truncated),
            ExecutionResult::Failure(e) => {
                return Err(SummarizationError::FailedExecution(e.to_string()))
            }
        };

        if rows.is_empty() {
            info!("No rows; answering with the no-matches message");
            return Ok(self.no_matches_message.clone());
        }

        let shown = rows.len().min(self.max_prompt_rows);
        let rendered = render_rows(&rows[..shown]);
        let prompt = prompt::build_summary_prompt(question, &rendered, truncated || shown < rows.len());
        debug!("Summary prompt:\n{}", prompt);

        let request = GenerationRequest::new(prompt::SUMMARY_SYSTEM_PROMPT, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let answer = self.generator.generate(&request).await?;
        info!("Summarized {} rows", shown);
        Ok(answer.trim().to_string())
    }
}

/// Numbered `column: value` lines, one per row
pub fn render_rows(rows: &[Row]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let cells = row
            .iter()
            .map(|(column, value)| format!("{}: {}", column, value))
            .collect::<Vec<_>>()
            .join("; ");
        let _ = writeln!(out, "{}. {}", i + 1, cells);
    }
    out
}

/// Plain table of the rows, used when the model cannot narrate them
pub fn render_table(rows: &[Row], truncated: bool) -> String {
    let Some(first) = rows.first() else {
        return "(no results)".to_string();
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(first.keys());
    for row in rows {
        table.add_row(first.keys().map(|column| {
            row.get(column)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
    }

    let mut out = table.to_string();
    let _ = write!(out, "\n{} row(s)", rows.len());
    if truncated {
        out.push_str(" (truncated)");
    }
    out
}
