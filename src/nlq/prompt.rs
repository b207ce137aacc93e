//! Prompt templates for query synthesis, repair and summarization

use crate::executor::ExecutionError;
use crate::pipeline::ConversationTurn;
use crate::retrieval::RetrievalCandidate;
use std::fmt::Write;

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a Neo4j Cypher expert. You translate questions about movies \
into a single read-only Cypher query over a known graph schema.";

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a friendly movie assistant. You answer questions using only \
the query results you are given.";

/// Longest attribute value copied into a prompt
const MAX_VALUE_CHARS: usize = 200;

const QUERY_RULES: &str = "Rules:\n\
- Write exactly one read-only Cypher query.\n\
- Use only the node labels, relationship types, relationship directions and properties listed in the schema.\n\
- Never use CREATE, MERGE, SET, DELETE, REMOVE, DROP or LOAD CSV.\n\
- Return readable properties (titles, names, dates), not whole nodes, and add a LIMIT.\n\
- Reply with the query in a single ```cypher code block and nothing else.\n";

fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_VALUE_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Compact listing of candidates: id, label, score and key attributes
pub fn render_candidates(candidates: &[RetrievalCandidate]) -> String {
    if candidates.is_empty() {
        return "(none)\n".to_string();
    }
    let mut out = String::new();
    for (i, c) in candidates.iter().enumerate() {
        let attrs = c
            .attributes
            .iter()
            .map(|(k, v)| format!("{}: {}", k, clip(&v.to_string())))
            .collect::<Vec<_>>()
            .join("; ");
        let _ = writeln!(
            out,
            "{}. [{} id={} score={:.3}] {}",
            i + 1,
            c.label,
            c.id,
            c.score,
            attrs
        );
    }
    out
}

fn render_history(history: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in history {
        let _ = writeln!(out, "Q: {}", turn.question);
        if let Some(query) = &turn.query {
            let _ = writeln!(out, "Cypher: {}", query.replace('\n', " "));
        }
        let _ = writeln!(out, "A: {}", clip(&turn.answer));
    }
    out
}

pub fn build_synthesis_prompt(
    grounding: &str,
    candidates: &[RetrievalCandidate],
    history: &[ConversationTurn],
    question: &str,
) -> String {
    let mut prompt = format!("Graph schema:\n{}\n", grounding);
    prompt.push_str("Entities most similar to the question (use their ids to anchor the query when relevant):\n");
    prompt.push_str(&render_candidates(candidates));
    if !history.is_empty() {
        prompt.push_str("\nEarlier in this conversation:\n");
        prompt.push_str(&render_history(history));
    }
    let _ = write!(prompt, "\nQuestion: \"{}\"\n\n{}", question, QUERY_RULES);
    prompt
}

pub fn build_repair_prompt(
    grounding: &str,
    candidates: &[RetrievalCandidate],
    question: &str,
    failed_query: &str,
    error: &ExecutionError,
) -> String {
    let mut prompt = format!("Graph schema:\n{}\n", grounding);
    prompt.push_str("Entities most similar to the question:\n");
    prompt.push_str(&render_candidates(candidates));
    let _ = write!(
        prompt,
        "\nQuestion: \"{}\"\n\nThis query was generated for the question but failed:\n```cypher\n{}\n```\n\
         Error ({}): {}\n\nWrite a corrected query.\n{}",
        question, failed_query, error.kind, error.message, QUERY_RULES
    );
    prompt
}

pub fn build_summary_prompt(question: &str, rows: &str, truncated: bool) -> String {
    let mut prompt = format!("Question: \"{}\"\n\nQuery results:\n{}", question, rows);
    if truncated {
        prompt.push_str("(Only the first rows of a larger result are shown.)\n");
    }
    prompt.push_str(
        "\nAnswer the question conversationally in a few sentences.\n\
         Use only the entities and values in the results above. Do not mention any movie, \
         person or fact that is not in the results. Do not mention queries or databases.\n",
    );
    prompt
}
