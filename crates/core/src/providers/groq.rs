use crate::config::ModelConfig;
use crate::traits::{ChatMessage, ChatRequest, LanguageModel};
use crate::SynthesisError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Chat completions against Groq's OpenAI-compatible API.
pub struct GroqChatModel {
    client: Client,
    completions_url: Url,
    config: ModelConfig,
}

impl GroqChatModel {
    pub fn new(config: ModelConfig) -> Result<Self, SynthesisError> {
        let completions_url = Url::parse(&config.endpoint)?.join("chat/completions")?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(SynthesisError::Http)?;

        Ok(Self {
            client,
            completions_url,
            config,
        })
    }

    fn api_key(&self) -> Result<&str, SynthesisError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(SynthesisError::MissingCredential)
    }

    async fn send_once(&self, api_key: &str, body: &CompletionBody<'_>) -> Result<String, SynthesisError> {
        let response = self
            .client
            .post(self.completions_url.clone())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SynthesisError::Unauthorized(status));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SynthesisError::Api { status, body });
        }

        let parsed: CompletionResponse = response.json().await?;
        first_choice_text(parsed)
    }
}

#[async_trait]
impl LanguageModel for GroqChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, SynthesisError> {
        let api_key = self.api_key()?;
        let body = CompletionBody {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        self.config
            .retry
            .run(|| self.send_once(api_key, &body))
            .await
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(response: CompletionResponse) -> Result<String, SynthesisError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(SynthesisError::EmptyCompletion)
}
