use crate::models::Chunk;
use crate::traits::{ChatMessage, ChatRequest, LanguageModel, Role};
use crate::SynthesisError;
use std::sync::Arc;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful legal research assistant. \
Answer only from the supplied legal context. If the context does not contain the answer, say so. \
Cite the document and page for every statement you make.";

pub const DEFAULT_TEMPLATE: &str = "Answer based on legal context:
{context}

Question: {question}

Provide detailed answer with citations:";

/// Prompt text with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub system: String,
    pub body: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            body: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn render(&self, question: &str, chunks: &[Chunk]) -> String {
        self.body
            .replace("{context}", &render_context(chunks))
            .replace("{question}", question)
    }
}

pub fn render_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "[Document: {}, Page: {}]\n{}",
                chunk.document_label(),
                chunk.page_label(),
                chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone)]
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    max_tokens: usize,
}

impl AnswerSynthesizer {
    /// Decoding temperature for every request.
    pub const TEMPERATURE: f32 = 0.0;

    pub fn new(model: Arc<dyn LanguageModel>, template: PromptTemplate, max_tokens: usize) -> Self {
        Self {
            model,
            template,
            max_tokens,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn build_request(&self, question: &str, chunks: &[Chunk]) -> ChatRequest {
        ChatRequest {
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: self.template.system.clone(),
                },
                ChatMessage {
                    role: Role::User,
                    content: self.template.render(question, chunks),
                },
            ],
            temperature: Self::TEMPERATURE,
            max_tokens: self.max_tokens,
        }
    }

    pub async fn synthesize(&self, question: &str, chunks: &[Chunk]) -> Result<String, SynthesisError> {
        let request = self.build_request(question, chunks);
        self.model.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed answer and records every request.
    #[derive(Default)]
    struct RecordingModel {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, SynthesisError> {
            let mut requests = self.requests.lock().map_err(|_| SynthesisError::EmptyCompletion)?;
            requests.push(request.clone());
            Ok(format!("answer #{}", requests.len()))
        }
    }

    fn chunk(document: &str, page: Option<u32>, text: &str) -> Chunk {
        Chunk {
            id: format!("{document}-{page:?}"),
            text: text.to_string(),
            source_document: document.to_string(),
            source_path: String::new(),
            page_number: page,
            sequence_index: 0,
        }
    }

    #[test]
    fn prompt_embeds_labeled_context_and_verbatim_question() {
        let template = PromptTemplate::default();
        let prompt = template.render(
            "Can the lease be assigned?",
            &[
                chunk("lease.pdf", Some(2), "Assignment requires consent."),
                chunk("", None, "Subletting is prohibited."),
            ],
        );

        assert!(prompt.contains("[Document: lease.pdf, Page: 2]\nAssignment requires consent."));
        assert!(prompt.contains("[Document: Unknown, Page: N/A]\nSubletting is prohibited."));
        assert!(prompt.contains("Question: Can the lease be assigned?"));
        assert!(!prompt.contains("{context}"));
    }

    #[tokio::test]
    async fn requests_use_zero_temperature_and_identical_prompts() -> Result<(), SynthesisError> {
        let model = Arc::new(RecordingModel::default());
        let synthesizer = AnswerSynthesizer::new(model.clone(), PromptTemplate::default(), 256);
        let context = vec![chunk("nda.pdf", Some(1), "Term is two years.")];

        synthesizer.synthesize("How long is the term?", &context).await?;
        synthesizer.synthesize("How long is the term?", &context).await?;

        let requests = model.requests.lock().map_err(|_| SynthesisError::EmptyCompletion)?;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, 256);
        assert_eq!(requests[0].messages[0].role, Role::System);
        Ok(())
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        struct FailingModel;

        #[async_trait]
        impl LanguageModel for FailingModel {
            fn name(&self) -> &str {
                "failing"
            }

            async fn complete(&self, _request: &ChatRequest) -> Result<String, SynthesisError> {
                Err(SynthesisError::Timeout)
            }
        }

        let synthesizer = AnswerSynthesizer::new(Arc::new(FailingModel), PromptTemplate::default(), 64);
        let result = synthesizer.synthesize("Who pays taxes?", &[]).await;
        assert!(matches!(result, Err(SynthesisError::Timeout)));
    }
}
