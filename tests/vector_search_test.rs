mod common;

use async_trait::async_trait;
use cinegraph::embed::EmbedResult;
use cinegraph::{
    AttributeFilter, ChatSession, Embedder, EmbeddingVector, Entity, FilterOp, GraphRagPipeline,
    InMemoryRetriever, PipelineParts, RagConfig, RetrievalError, SchemaRegistry, TaskHint,
    TurnOutcome, VectorIndex, VectorRetriever,
};
use common::{fenced, title_rows, ScriptedModel, ScriptedRunner};
use std::sync::Arc;

/// Three-axis embedding from keyword counts: time travel, crime, comedy
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str, _hint: TaskHint) -> EmbedResult<EmbeddingVector> {
        let text = text.to_lowercase();
        let count = |words: &[&str]| words.iter().filter(|w| text.contains(*w)).count() as f32;
        Ok(vec![
            count(&["time", "future", "past"]),
            count(&["heist", "crime", "gang", "police"]),
            count(&["comedy", "funny", "laugh"]),
        ])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

fn movies() -> Vec<Entity> {
    vec![
        Entity::new("m63", "Movie")
            .with_attribute("title", "Twelve Monkeys")
            .with_attribute("overview", "A convict travels back in time to find the origin of a plague in the past.")
            .with_attribute("runtime", 129i64),
        Entity::new("m59967", "Movie")
            .with_attribute("title", "Looper")
            .with_attribute("overview", "A hitman for a crime gang meets his older self from the future.")
            .with_attribute("runtime", 118i64),
        Entity::new("m949", "Movie")
            .with_attribute("title", "Heat")
            .with_attribute("overview", "A police detective hunts a heist crew.")
            .with_attribute("runtime", 170i64),
        Entity::new("m137", "Movie")
            .with_attribute("title", "Groundhog Day")
            .with_attribute("overview", "A funny comedy about a weatherman reliving the same day.")
            .with_attribute("runtime", 101i64),
    ]
}

async fn index() -> Arc<VectorIndex> {
    let mut index = VectorIndex::new(3);
    let added = index.embed_and_insert(&KeywordEmbedder, movies()).await.unwrap();
    assert_eq!(added, 4);
    Arc::new(index)
}

#[tokio::test]
async fn test_vector_search_integration() {
    let retriever = InMemoryRetriever::new(index().await, 50).with_attributes(&["title"]);
    let query = KeywordEmbedder.embed("movies about time travel to the past", TaskHint::Query).await.unwrap();

    let results = retriever.retrieve(&query, 2, &[]).await.unwrap();
    let titles: Vec<&str> = results.iter().map(|c| c.display_name()).collect();
    assert_eq!(titles, vec!["Twelve Monkeys", "Looper"]);
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].attributes.len(), 1);
}

#[tokio::test]
async fn test_vector_search_with_filter() {
    let retriever = InMemoryRetriever::new(index().await, 50);
    let query = vec![1.0, 0.0, 0.0];
    let filters = [AttributeFilter::new("runtime", FilterOp::Lt, 120i64)];

    let results = retriever.retrieve(&query, 10, &filters).await.unwrap();
    let titles: Vec<&str> = results.iter().map(|c| c.display_name()).collect();
    assert_eq!(titles, vec!["Looper", "Groundhog Day"]);
}

#[tokio::test]
async fn test_vector_search_bounds() {
    let retriever = InMemoryRetriever::new(index().await, 3);
    let results = retriever.retrieve(&[1.0, 1.0, 1.0], 40, &[]).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    assert!(matches!(
        retriever.retrieve(&[1.0, 1.0], 3, &[]).await,
        Err(RetrievalError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        retriever.retrieve(&[1.0, 1.0, 1.0], 0, &[]).await,
        Err(RetrievalError::InvalidK)
    ));
}

#[tokio::test]
async fn test_similarity_floor_gives_empty_result() {
    let retriever = InMemoryRetriever::new(index().await, 50).with_similarity_floor(Some(0.99));
    let results = retriever.retrieve(&[1.0, 1.0, 1.0], 5, &[]).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_pipeline_over_in_memory_index() {
    let mut config = RagConfig::default();
    config.embedding.dimensions = 3;
    config.retrieval.default_k = 2;

    let model = Arc::new(ScriptedModel::new(vec![fenced(
        "MATCH (m:Movie) WHERE m.id IN ['m63', 'm59967'] RETURN m.title AS title",
    )]));
    let runner = Arc::new(ScriptedRunner::new(vec![cinegraph::ExecutionResult::Success {
        rows: title_rows(&["Twelve Monkeys"]),
        truncated: false,
    }]));
    let pipeline = Arc::new(GraphRagPipeline::new(
        PipelineParts {
            embedder: Arc::new(KeywordEmbedder),
            retriever: Arc::new(InMemoryRetriever::new(index().await, 50)),
            generator: model.clone(),
            runner,
            schema: SchemaRegistry::movies(),
        },
        &config,
    ));

    let report = ChatSession::new(pipeline)
        .ask_detailed("A film where someone travels into the past?")
        .await;
    assert_eq!(report.outcome, TurnOutcome::Answered);
    assert!(report.answer.contains("Twelve Monkeys"));

    let prompt = model.synthesis_prompt(0);
    assert!(prompt.contains("id=m63"));
    // default_k = 2 keeps the prompt to two candidates
    assert!(prompt.contains("2. [Movie"));
    assert!(!prompt.contains("3. [Movie"));
}
