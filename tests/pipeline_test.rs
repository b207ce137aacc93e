//! End-to-end turns through the orchestrator with stubbed services

mod common;

use common::{
    fenced, title_rows, FixedEmbedder, ScriptedModel, ScriptedRunner, ScriptedStore, StubRetriever,
};
use cinegraph::pipeline::{
    EMPTY_QUESTION_MESSAGE, NO_ANSWER_MESSAGE, PROCESSING_FAILED_MESSAGE, READ_ONLY_MESSAGE,
};
use cinegraph::repair::QueryRunner;
use cinegraph::store::Params;
use cinegraph::{
    ChatSession, ErrorKind, ExecutionError, ExecutionResult, GraphRagPipeline, GraphStore,
    PipelineParts, QueryExecutor, RagConfig, RepairState, Row, SchemaRegistry, SessionPool,
    StoreError, TurnOutcome, Value,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUESTION: &str = "Which time travel movies star Bruce Willis?";

const WILLIS_QUERY: &str = "MATCH (a:Actor {name: 'Bruce Willis'})-[:ACTED_IN]->(m:Movie)\n\
     WHERE m.id IN ['m63', 'm59967', 'm105']\n\
     RETURN m.title AS title";

// ============================================================================
// Helper Functions
// ============================================================================

fn config() -> RagConfig {
    let mut config = RagConfig::default();
    config.embedding.dimensions = 3;
    config
}

fn pipeline_with_runner(
    config: &RagConfig,
    model: Arc<ScriptedModel>,
    runner: Arc<dyn QueryRunner>,
) -> Arc<GraphRagPipeline> {
    Arc::new(GraphRagPipeline::new(
        PipelineParts {
            embedder: Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0])),
            retriever: Arc::new(StubRetriever::time_travel()),
            generator: model,
            runner,
            schema: SchemaRegistry::movies(),
        },
        config,
    ))
}

/// Real executor over a scripted store
fn pipeline_with_store(
    config: &RagConfig,
    model: Arc<ScriptedModel>,
    store: Arc<ScriptedStore>,
) -> Arc<GraphRagPipeline> {
    let pool = SessionPool::new(store, 4, Duration::from_secs(1));
    let executor = QueryExecutor::new(pool, &SchemaRegistry::movies(), &config.executor);
    pipeline_with_runner(config, model, Arc::new(executor))
}

fn failure(kind: ErrorKind, message: &str) -> ExecutionResult {
    ExecutionResult::Failure(ExecutionError::new(kind, message))
}

fn success(titles: &[&str]) -> ExecutionResult {
    ExecutionResult::Success {
        rows: title_rows(titles),
        truncated: false,
    }
}

// ============================================================================
// TEST: Scenarios
// ============================================================================

/// Valid query on the first try; the answer names titles from the rows
#[tokio::test]
async fn test_scenario_first_try_answer() {
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]));
    let store = Arc::new(ScriptedStore::new(vec![Ok(title_rows(&[
        "Twelve Monkeys",
        "Looper",
    ]))]));
    let pipeline = pipeline_with_store(&config(), model.clone(), store.clone());
    let mut session = ChatSession::new(pipeline);

    let report = session.ask_detailed(QUESTION).await;

    assert_eq!(report.outcome, TurnOutcome::Answered);
    assert!(!report.answer.is_empty());
    assert!(["Twelve Monkeys", "Looper", "Back to the Future"]
        .iter()
        .any(|t| report.answer.contains(t)));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.repair_state, Some(RepairState::Succeeded));
    assert_eq!(report.query.as_deref(), Some(WILLIS_QUERY));

    // The query ran verbatim
    assert_eq!(store.queries.lock().unwrap().as_slice(), &[WILLIS_QUERY.to_string()]);

    // Candidates were offered by id, never as vectors
    let prompt = model.synthesis_prompt(0);
    assert!(prompt.contains("id=m59967"));
    assert!(prompt.contains(QUESTION));
    assert!(prompt.contains("(:Actor)-[:ACTED_IN"));
}

/// Schema violation first, repaired query second
#[tokio::test]
async fn test_scenario_repaired_after_schema_violation() {
    let bad = "MATCH (p:Person)-[:ACTED_IN]->(m:Movie) RETURN m.title AS title";
    let model = Arc::new(ScriptedModel::new(vec![fenced(bad), fenced(WILLIS_QUERY)]));
    let runner = Arc::new(ScriptedRunner::new(vec![
        failure(ErrorKind::SchemaViolation, "unknown node label `Person`"),
        success(&["Looper"]),
    ]));
    let pipeline = pipeline_with_runner(&config(), model.clone(), runner.clone());
    let mut session = ChatSession::new(pipeline);

    let report = session.ask_detailed(QUESTION).await;

    assert_eq!(report.outcome, TurnOutcome::Answered);
    assert_eq!(report.repair_state, Some(RepairState::Succeeded));
    assert_eq!(report.attempts, 2);
    assert!(report.answer.contains("Looper"));

    let executed = runner.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].text, bad);
    assert_eq!(executed[1].text, WILLIS_QUERY);
    assert_eq!(executed[1].attempt, 2);

    let repair_prompt = model.synthesis_prompt(1);
    assert!(repair_prompt.contains(bad));
    assert!(repair_prompt.contains("unknown node label `Person`"));
}

/// Every attempt fails; the user gets an apology, not an error payload
#[tokio::test]
async fn test_scenario_exhausted_is_graceful() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let runner = Arc::new(ScriptedRunner::new(vec![
        failure(ErrorKind::Syntax, "Invalid input 'RETRUN'"),
        failure(ErrorKind::Syntax, "Invalid input 'RETRUN'"),
        failure(ErrorKind::Syntax, "Invalid input 'RETRUN'"),
    ]));
    let pipeline = pipeline_with_runner(&config(), model.clone(), runner.clone());
    let mut session = ChatSession::new(pipeline);

    let report = session.ask_detailed(QUESTION).await;

    assert_eq!(report.answer, NO_ANSWER_MESSAGE);
    assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
    assert_eq!(report.repair_state, Some(RepairState::Exhausted));
    assert_eq!(report.attempts, 3);
    assert_eq!(runner.executed().len(), 3);
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 0);
    assert!(!report.answer.contains("SyntaxError"));
    assert!(!report.answer.contains("RETRUN"));
}

// ============================================================================
// TEST: Failure handling
// ============================================================================

#[tokio::test]
async fn test_empty_question_makes_no_calls() {
    let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0]));
    let model = Arc::new(ScriptedModel::new(vec![]));
    let pipeline = Arc::new(GraphRagPipeline::new(
        PipelineParts {
            embedder: embedder.clone(),
            retriever: Arc::new(StubRetriever::time_travel()),
            generator: model.clone(),
            runner: Arc::new(ScriptedRunner::new(vec![])),
            schema: SchemaRegistry::movies(),
        },
        &config(),
    ));
    let mut session = ChatSession::new(pipeline);

    assert_eq!(session.ask("   ").await, EMPTY_QUESTION_MESSAGE);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.synthesis_calls(), 0);
    assert_eq!(session.history().count(), 0);
}

#[tokio::test]
async fn test_embedding_failure_aborts_turn() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let pipeline = Arc::new(GraphRagPipeline::new(
        PipelineParts {
            embedder: Arc::new(FixedEmbedder::failing()),
            retriever: Arc::new(StubRetriever::time_travel()),
            generator: model.clone(),
            runner: Arc::new(ScriptedRunner::new(vec![])),
            schema: SchemaRegistry::movies(),
        },
        &config(),
    ));
    let mut session = ChatSession::new(pipeline);

    let report = session.ask_detailed(QUESTION).await;
    assert_eq!(report.answer, PROCESSING_FAILED_MESSAGE);
    assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
    assert_eq!(model.synthesis_calls(), 0);
}

#[tokio::test]
async fn test_write_query_never_executes() {
    let writes = [
        "MATCH (m:Movie {title: 'Looper'}) DETACH DELETE m RETURN count(m)",
        "CALL apoc.cypher.doIt('CREATE (n:Movie {title: \"x\"})', {}) YIELD value RETURN value",
        "CALL apoc.do.when(true, 'MATCH (n) DETACH DELETE n', '', {}) YIELD value RETURN value",
        "CALL db.index.vector.createNodeIndex('plots', 'Movie', 'embedding', 3, 'cosine') RETURN 1",
    ];

    for write in writes {
        let model = Arc::new(ScriptedModel::new(vec![fenced(write)]));
        let store = Arc::new(ScriptedStore::new(vec![]));
        let pipeline = pipeline_with_store(&config(), model.clone(), store.clone());
        let mut session = ChatSession::new(pipeline);

        let report = session.ask_detailed("Delete Looper").await;

        assert_eq!(report.answer, READ_ONLY_MESSAGE, "{}", write);
        assert_eq!(report.attempts, 1);
        assert_eq!(store.query_count(), 0, "{}", write);
        // No repair prompt for unsafe queries
        assert_eq!(model.synthesis_calls(), 1);
    }
}

#[tokio::test]
async fn test_unparseable_first_reply() {
    let model = Arc::new(ScriptedModel::new(vec!["I'm not sure what you mean.".to_string()]));
    let runner = Arc::new(ScriptedRunner::new(vec![]));
    let pipeline = pipeline_with_runner(&config(), model, runner.clone());

    let report = ChatSession::new(pipeline).ask_detailed(QUESTION).await;
    assert_eq!(report.answer, NO_ANSWER_MESSAGE);
    assert!(runner.executed().is_empty());
}

#[tokio::test]
async fn test_show_failed_query_appends_last_query() {
    let mut config = config();
    config.session.show_failed_query = true;
    config.repair.max_retries = 0;
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]));
    let runner = Arc::new(ScriptedRunner::new(vec![failure(ErrorKind::Timeout, "too slow")]));
    let pipeline = pipeline_with_runner(&config, model, runner);

    let answer = ChatSession::new(pipeline).ask(QUESTION).await;
    assert!(answer.starts_with(NO_ANSWER_MESSAGE));
    assert!(answer.ends_with(WILLIS_QUERY));
}

#[tokio::test]
async fn test_no_rows_skips_summary_model() {
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]));
    let store = Arc::new(ScriptedStore::new(vec![Ok(Vec::new())]));
    let pipeline = pipeline_with_store(&config(), model.clone(), store);

    let report = ChatSession::new(pipeline).ask_detailed(QUESTION).await;
    assert_eq!(report.outcome, TurnOutcome::NoMatches);
    assert_eq!(report.answer, config().summarizer.no_matches_message);
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_summary_failure_falls_back_to_table() {
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]).with_failing_summaries());
    let store = Arc::new(ScriptedStore::new(vec![Ok(title_rows(&["Looper", "Twelve Monkeys"]))]));
    let pipeline = pipeline_with_store(&config(), model.clone(), store);

    let report = ChatSession::new(pipeline).ask_detailed(QUESTION).await;
    assert_eq!(report.outcome, TurnOutcome::Fallback);
    assert!(report.answer.contains("Looper"));
    assert!(report.answer.contains("Twelve Monkeys"));
    assert!(report.answer.contains("2 row(s)"));
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_store_outage_is_not_retried() {
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]));
    let store = Arc::new(ScriptedStore::new(vec![Err(StoreError::Connection(
        "connection refused".to_string(),
    ))]));
    let pipeline = pipeline_with_store(&config(), model.clone(), store.clone());

    let report = ChatSession::new(pipeline).ask_detailed(QUESTION).await;
    assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
    assert_eq!(store.query_count(), 1);
    assert_eq!(model.synthesis_calls(), 1);
}

// ============================================================================
// TEST: Sessions
// ============================================================================

#[tokio::test]
async fn test_history_feeds_follow_up_prompts() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let store = Arc::new(ScriptedStore::new(vec![
        Ok(title_rows(&["Looper"])),
        Ok(title_rows(&["Sin City"])),
    ]));
    let pipeline = pipeline_with_store(&config(), model.clone(), store);
    let mut session = ChatSession::new(pipeline);

    session.ask("Which time travel movies star Bruce Willis?").await;
    session.ask("Which of those came out after 2010?").await;

    let follow_up = model.synthesis_prompt(1);
    assert!(follow_up.contains("Q: Which time travel movies star Bruce Willis?"));
    assert!(follow_up.contains("A: You could watch Looper."));

    let history: Vec<_> = session.history().collect();
    assert_eq!(history.len(), 2);
    assert!(history[1].query.is_some());

    session.clear();
    assert_eq!(session.history().count(), 0);
}

#[tokio::test]
async fn test_history_is_bounded_and_skips_failures() {
    let mut config = config();
    config.session.history_len = 2;
    let model = Arc::new(ScriptedModel::new(vec![]));
    let pipeline = pipeline_with_store(&config, model, Arc::new(ScriptedStore::new(vec![])));
    let mut session = ChatSession::new(pipeline);

    for q in ["first?", "second?", "third?"] {
        session.ask(q).await;
    }
    session.ask("").await;

    let questions: Vec<&str> = session.history().map(|t| t.question.as_str()).collect();
    assert_eq!(questions, vec!["second?", "third?"]);
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let pipeline = pipeline_with_store(&config(), model, Arc::new(ScriptedStore::new(vec![])));
    let mut alice = ChatSession::new(pipeline.clone());
    let mut bob = ChatSession::new(pipeline);
    assert_ne!(alice.id(), bob.id());

    let (a, b) = tokio::join!(alice.ask("Sci-fi from 1995?"), bob.ask("Comedies with Bill Murray?"));
    assert!(!a.is_empty() && !b.is_empty());

    let alice_history: Vec<&str> = alice.history().map(|t| t.question.as_str()).collect();
    let bob_history: Vec<&str> = bob.history().map(|t| t.question.as_str()).collect();
    assert_eq!(alice_history, vec!["Sci-fi from 1995?"]);
    assert_eq!(bob_history, vec!["Comedies with Bill Murray?"]);
}

// ============================================================================
// TEST: Graph-backed pipeline
// ============================================================================

/// Answers the vector index procedure with fixed hits and everything else
/// with title rows
struct MovieGraph {
    queries: Mutex<Vec<String>>,
}

fn hit(id: &str, title: &str, score: f64) -> Row {
    let mut attributes = BTreeMap::new();
    attributes.insert("title".to_string(), Value::from(title));
    let mut row = Row::new();
    row.insert("id".to_string(), Value::from(id));
    row.insert("label".to_string(), Value::from("Movie"));
    row.insert("score".to_string(), Value::Float(score));
    row.insert("attributes".to_string(), Value::Map(attributes));
    row
}

#[async_trait]
impl GraphStore for MovieGraph {
    async fn run(&self, query: &str, params: &Params) -> cinegraph::store::StoreResult<Vec<Row>> {
        self.queries.lock().unwrap().push(query.to_string());
        if query.contains("db.index.vector.queryNodes") {
            assert_eq!(params["index"], serde_json::json!("movie_embeddings"));
            return Ok(vec![hit("m59967", "Looper", 0.88), hit("m63", "Twelve Monkeys", 0.91)]);
        }
        Ok(title_rows(&["Twelve Monkeys"]))
    }
}

#[tokio::test]
async fn test_with_store_uses_graph_index_and_executor() {
    let graph = Arc::new(MovieGraph {
        queries: Mutex::new(Vec::new()),
    });
    let model = Arc::new(ScriptedModel::new(vec![fenced(WILLIS_QUERY)]));
    let pipeline = Arc::new(GraphRagPipeline::with_store(
        &config(),
        graph.clone(),
        Arc::new(FixedEmbedder::new(vec![0.2, 0.4, 0.6])),
        model.clone(),
    ));
    let mut session = ChatSession::new(pipeline.clone());

    let report = session.ask_detailed(QUESTION).await;
    assert_eq!(report.outcome, TurnOutcome::Answered);
    assert!(report.answer.contains("Twelve Monkeys"));

    // Best candidate is listed first in the prompt
    let prompt = model.synthesis_prompt(0);
    let first = prompt.find("id=m63").unwrap();
    let second = prompt.find("id=m59967").unwrap();
    assert!(first < second);

    assert_eq!(graph.queries.lock().unwrap().len(), 2);

    pipeline.shutdown();
    let after = session.ask_detailed(QUESTION).await;
    assert_eq!(after.answer, PROCESSING_FAILED_MESSAGE);
}
