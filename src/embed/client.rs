//! Embedding client for the supported providers

use crate::config::{EmbeddingConfig, LLMProvider};
use crate::embed::{
    check_dimensions, prepare_input, EmbedError, EmbedResult, Embedder, EmbeddingVector, TaskHint,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for provider embedding APIs
pub struct EmbeddingClient {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: Option<String>,
    api_base_url: String,
    dimensions: usize,
    max_input_chars: usize,
}

impl EmbeddingClient {
    /// Create a new embedding client based on configuration
    pub fn new(config: &EmbeddingConfig) -> EmbedResult<Self> {
        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(EmbedError::ConfigError(format!(
                "{:?} requires an API key",
                config.provider
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::ConfigError(e.to_string()))?;

        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string());

        Ok(Self {
            client,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            dimensions: config.dimensions,
            max_input_chars: config.max_input_chars,
        })
    }

    fn api_key(&self) -> EmbedResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EmbedError::ConfigError(format!("{:?} requires an API key", self.provider)))
    }

    async fn send<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        body: &Req,
    ) -> EmbedResult<Resp> {
        let resp = request
            .json(body)
            .send()
            .await
            .map_err(|e| EmbedError::NetworkError(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::ApiError(format!(
                "{:?} returned {}: {}",
                self.provider, status, error_text
            )));
        }

        resp.json()
            .await
            .map_err(|e| EmbedError::SerializationError(e.to_string()))
    }

    async fn openai_embedding(&self, text: &str) -> EmbedResult<EmbeddingVector> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            input: [&'a str; 1],
            model: &'a str,
            dimensions: usize,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<OpenAIData>,
        }

        #[derive(Deserialize)]
        struct OpenAIData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.api_base_url);
        let request = self.client.post(&url).bearer_auth(self.api_key()?);
        let result: OpenAIResponse = self
            .send(
                request,
                &OpenAIRequest {
                    input: [text],
                    model: &self.model,
                    dimensions: self.dimensions,
                },
            )
            .await?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::ApiError("OpenAI returned no embedding".to_string()))
    }

    async fn ollama_embedding(&self, text: &str) -> EmbedResult<EmbeddingVector> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.api_base_url);
        let result: OllamaResponse = self
            .send(
                self.client.post(&url),
                &OllamaRequest {
                    model: &self.model,
                    prompt: text,
                },
            )
            .await?;
        Ok(result.embedding)
    }

    async fn gemini_embedding(&self, text: &str, hint: TaskHint) -> EmbedResult<EmbeddingVector> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GeminiRequest<'a> {
            model: String,
            content: GeminiContent<'a>,
            task_type: &'static str,
            output_dimensionality: usize,
        }

        #[derive(Serialize)]
        struct GeminiContent<'a> {
            parts: [GeminiPart<'a>; 1],
        }

        #[derive(Serialize)]
        struct GeminiPart<'a> {
            text: &'a str,
        }

        #[derive(Deserialize)]
        struct GeminiResponse {
            embedding: GeminiEmbedding,
        }

        #[derive(Deserialize)]
        struct GeminiEmbedding {
            values: Vec<f32>,
        }

        let url = format!("{}/models/{}:embedContent", self.api_base_url, self.model);
        let request = self.client.post(&url).header("x-goog-api-key", self.api_key()?);
        let task_type = match hint {
            TaskHint::Query => "RETRIEVAL_QUERY",
            TaskHint::Document => "RETRIEVAL_DOCUMENT",
        };

        let result: GeminiResponse = self
            .send(
                request,
                &GeminiRequest {
                    model: format!("models/{}", self.model),
                    content: GeminiContent {
                        parts: [GeminiPart { text }],
                    },
                    task_type,
                    output_dimensionality: self.dimensions,
                },
            )
            .await?;
        Ok(result.embedding.values)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str, hint: TaskHint) -> EmbedResult<EmbeddingVector> {
        let text = prepare_input(text, self.max_input_chars)?;
        debug!(
            "Embedding {} chars via {:?} ({:?})",
            text.chars().count(),
            self.provider,
            hint
        );

        let vector = match self.provider {
            LLMProvider::OpenAI => self.openai_embedding(text).await?,
            LLMProvider::Ollama => self.ollama_embedding(text).await?,
            LLMProvider::Gemini => self.gemini_embedding(text, hint).await?,
        };

        check_dimensions(vector, self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
