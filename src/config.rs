//! Pipeline configuration
//!
//! All knobs for the external clients and the bounded behaviour of the
//! pipeline (retrieval fan-out, row cap, retry limit, history length).
//! Loaded from YAML with secrets supplied through the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LLMProvider {
    OpenAI,
    Ollama,
    Gemini,
}

impl LLMProvider {
    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Ollama => "http://localhost:11434",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Whether requests must carry an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProvider::Ollama)
    }
}

/// Generative model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LLMProvider,
    /// Model name (e.g., "gpt-4o", "llama3", "gemini-2.5-flash")
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    /// Sampling temperature for query synthesis and repair
    pub synthesis_temperature: f32,
    /// Sampling temperature for summaries
    pub summary_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            api_base_url: None,
            synthesis_temperature: 0.0,
            summary_temperature: 0.2,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: LLMProvider,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    /// Vector dimension size, must match the persisted index
    pub dimensions: usize,
    /// Inputs longer than this are truncated before the request
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            model: "text-embedding-004".to_string(),
            api_key: None,
            api_base_url: None,
            dimensions: 768,
            max_input_chars: 8000,
            timeout_secs: 30,
        }
    }
}

/// Graph store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// HTTP endpoint of the graph store
    pub url: String,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Maximum concurrent sessions against the store
    pub pool_size: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: None,
            pool_size: 8,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl GraphConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Vector retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Name of the persisted vector index
    pub index_name: String,
    pub default_k: usize,
    /// Hard cap on k, bounds the candidate block in prompts
    pub max_k: usize,
    /// Candidates scoring below this are dropped
    pub similarity_floor: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_name: "movie_embeddings".to_string(),
            default_k: 5,
            max_k: 50,
            similarity_floor: None,
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_ms: u64,
    pub row_cap: usize,
    /// Reject queries that reference labels, relationships or properties
    /// missing from the schema before they reach the store
    pub validate_schema: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            row_cap: 100,
            validate_schema: true,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub max_retries: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Rows serialized into the summary prompt
    pub max_prompt_rows: usize,
    pub no_matches_message: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_prompt_rows: 50,
            no_matches_message: "I couldn't find any movies in the graph matching that question."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Turns kept as conversational context for the synthesizer
    pub history_len: usize,
    /// Include the last attempted query in failure messages
    pub show_failed_query: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_len: 5,
            show_failed_query: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub graph: GraphConfig,
    pub retrieval: RetrievalConfig,
    pub executor: ExecutorConfig,
    pub repair: RepairConfig,
    pub summarizer: SummarizerConfig,
    pub session: SessionConfig,
}

impl RagConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: RagConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets from the environment without overriding explicit values
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let provider_key = |provider: LLMProvider| match provider {
            LLMProvider::OpenAI => lookup("OPENAI_API_KEY"),
            LLMProvider::Gemini => lookup("GEMINI_API_KEY"),
            LLMProvider::Ollama => None,
        };

        if self.llm.api_key.is_none() {
            self.llm.api_key =
                lookup("CINEGRAPH_LLM_API_KEY").or_else(|| provider_key(self.llm.provider));
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = lookup("CINEGRAPH_EMBED_API_KEY")
                .or_else(|| provider_key(self.embedding.provider));
        }
        if self.graph.password.is_none() {
            self.graph.password = lookup("NEO4J_PASSWORD");
        }
        debug!(
            "Secrets present: llm={} embedding={} graph={}",
            self.llm.api_key.is_some(),
            self.embedding.api_key.is_some(),
            self.graph.password.is_some()
        );
    }

    /// Check invariants between settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid("embedding.dimensions must be > 0".to_string()));
        }
        if self.retrieval.max_k == 0 {
            return Err(ConfigError::Invalid("retrieval.max_k must be > 0".to_string()));
        }
        if self.retrieval.default_k == 0 || self.retrieval.default_k > self.retrieval.max_k {
            return Err(ConfigError::Invalid(format!(
                "retrieval.default_k must be in 1..={}",
                self.retrieval.max_k
            )));
        }
        if self.executor.row_cap == 0 {
            return Err(ConfigError::Invalid("executor.row_cap must be > 0".to_string()));
        }
        if self.summarizer.max_prompt_rows == 0 {
            return Err(ConfigError::Invalid(
                "summarizer.max_prompt_rows must be > 0".to_string(),
            ));
        }
        if self.graph.pool_size == 0 {
            return Err(ConfigError::Invalid("graph.pool_size must be > 0".to_string()));
        }
        for (name, t) in [
            ("llm.synthesis_temperature", self.llm.synthesis_temperature),
            ("llm.summary_temperature", self.llm.summary_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!("{} must be within 0.0..=2.0", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.repair.max_retries, 2);
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.retrieval.max_k, 50);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RagConfig::from_yaml_str(
            "llm:\n  provider: OpenAI\n  model: gpt-4o\nexecutor:\n  row_cap: 20\n",
        )
        .unwrap();
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.executor.row_cap, 20);
        assert_eq!(config.executor.timeout_ms, 10_000);
        assert_eq!(config.session.history_len, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RagConfig::from_yaml_str("executor:\n  row_cap: 0\n").is_err());
        assert!(RagConfig::from_yaml_str("retrieval:\n  default_k: 60\n").is_err());
        assert!(RagConfig::from_yaml_str("llm:\n  summary_temperature: 3.5\n").is_err());
        assert!(RagConfig::from_yaml_str("embedding:\n  dimensions: 0\n").is_err());
        assert!(RagConfig::from_yaml_str("summarizer:\n  max_prompt_rows: 0\n").is_err());
    }

    #[test]
    fn test_env_overrides_fill_missing_secrets() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "gem-key"),
            ("CINEGRAPH_LLM_API_KEY", "llm-key"),
            ("NEO4J_PASSWORD", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("llm-key"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("gem-key"));
        assert_eq!(config.graph.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_env_does_not_override_explicit_key() {
        let mut config = RagConfig::default();
        config.llm.api_key = Some("explicit".to_string());
        config.apply_env_with(|_| Some("from-env".to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("explicit"));
    }
}
