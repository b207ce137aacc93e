//! LLM client for the supported providers

use crate::config::{LLMProvider, LlmConfig};
use crate::llm::{GenerationRequest, LlmError, LlmResult, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct LlmClient {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: Option<String>,
    api_base_url: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(LlmError::ConfigError(format!(
                "{:?} requires an API key",
                config.provider
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

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
        })
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LlmError::ConfigError(format!("{:?} requires an API key", self.provider)))
    }

    async fn send<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        body: &Req,
    ) -> LlmResult<Resp> {
        let resp = request
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!(
                "{:?} returned {}: {}",
                self.provider, status, text
            )));
        }

        resp.json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))
    }

    async fn openai_chat(&self, request: &GenerationRequest) -> LlmResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: Option<String>,
        }

        let url = format!("{}/chat/completions", self.api_base_url);
        let builder = self.client.post(&url).bearer_auth(self.api_key()?);
        let result: Response = self
            .send(
                builder,
                &Request {
                    model: &self.model,
                    messages: vec![
                        Message { role: "system", content: &request.system_prompt },
                        Message { role: "user", content: &request.prompt },
                    ],
                    temperature: request.temperature,
                    max_tokens: request.max_tokens,
                },
            )
            .await?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn ollama_chat(&self, request: &GenerationRequest) -> LlmResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            system: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let result: Response = self
            .send(
                self.client.post(&url),
                &Request {
                    model: &self.model,
                    prompt: &request.prompt,
                    system: &request.system_prompt,
                    stream: false,
                    options: Options {
                        temperature: request.temperature,
                        num_predict: request.max_tokens,
                    },
                },
            )
            .await?;

        Ok(result.response)
    }

    async fn gemini_chat(&self, request: &GenerationRequest) -> LlmResult<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Request<'a> {
            system_instruction: Content<'a>,
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            role: Option<&'static str>,
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            max_output_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Option<CandidateContent>,
        }

        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<CandidatePart>,
        }

        #[derive(Deserialize)]
        struct CandidatePart {
            #[serde(default)]
            text: String,
        }

        let url = format!("{}/models/{}:generateContent", self.api_base_url, self.model);

        let result: Response = self
            .send(
                self.client
                    .post(&url)
                    .header("x-goog-api-key", self.api_key()?),
                &Request {
                    system_instruction: Content {
                        role: None,
                        parts: vec![Part { text: &request.system_prompt }],
                    },
                    contents: vec![Content {
                        role: Some("user"),
                        parts: vec![Part { text: &request.prompt }],
                    }],
                    generation_config: GenerationConfig {
                        temperature: request.temperature,
                        max_output_tokens: request.max_tokens,
                    },
                },
            )
            .await?;

        let text = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> LlmResult<String> {
        debug!(
            "Calling {:?} model {} (temperature {}, max_tokens {})",
            self.provider, self.model, request.temperature, request.max_tokens
        );

        let text = match self.provider {
            LLMProvider::OpenAI => self.openai_chat(request).await?,
            LLMProvider::Ollama => self.ollama_chat(request).await?,
            LLMProvider::Gemini => self.gemini_chat(request).await?,
        };

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}
