use crate::models::{IngestionOptions, SearchOptions};
use crate::retry::RetryPolicy;
use crate::synthesizer::PromptTemplate;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INDEX_DIR: &str = "legal_index";
pub const DEFAULT_MODEL_ENDPOINT: &str = "https://api.groq.com/openai/v1/";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API; `chat/completions` is joined to it.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Bounds each attempt, not the whole retry sequence.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub index_dir: PathBuf,
    pub search: SearchOptions,
    pub ingestion: IngestionOptions,
    pub prompt: PromptTemplate,
    /// Completion budget sent with every answer request.
    pub max_answer_tokens: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            search: SearchOptions::default(),
            ingestion: IngestionOptions::default(),
            prompt: PromptTemplate::default(),
            max_answer_tokens: 1_024,
        }
    }
}

impl RetrieverConfig {
    pub fn with_index_dir(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Self::default()
        }
    }
}
