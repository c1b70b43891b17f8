pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod mmr;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod similarity;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{normalize_whitespace, ChunkingConfig, PageChunker};
pub use config::{ModelConfig, RetrieverConfig};
pub use embeddings::{Encoder, HashingEncoder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BuildError, IndexingError, IngestError, QueryError, StorageError, SynthesisError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexManifest, VectorIndex};
pub use ingest::{
    discover_pdf_files, ingest_directory, ingest_directory_best_effort, ingest_documents,
    ingest_documents_best_effort, IngestionReport, SkippedDocument,
};
pub use models::{
    Chunk, DocumentFingerprint, IngestionOptions, RetrievalResult, ScoredChunk, SearchOptions,
    SourceCitation,
};
pub use orchestrator::{IndexSummary, LegalRetriever, QaChain, StateKind};
pub use providers::GroqChatModel;
pub use retry::RetryPolicy;
pub use synthesizer::{AnswerSynthesizer, PromptTemplate};
pub use traits::{ChatMessage, ChatRequest, LanguageModel, Role};
