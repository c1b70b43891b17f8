use crate::config::RetrieverConfig;
use crate::embeddings::Encoder;
use crate::index::{IndexManifest, VectorIndex};
use crate::ingest::{ingest_documents_best_effort, IngestionReport};
use crate::models::{Chunk, RetrievalResult, ScoredChunk, SearchOptions};
use crate::synthesizer::AnswerSynthesizer;
use crate::traits::LanguageModel;
use crate::{BuildError, IndexingError, IngestError, QueryError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Uninitialized,
    Indexed,
    Ready,
}

enum RetrieverState {
    Uninitialized,
    Indexed(Arc<VectorIndex>),
    Ready(Arc<QaChain>),
}

impl RetrieverState {
    fn kind(&self) -> StateKind {
        match self {
            Self::Uninitialized => StateKind::Uninitialized,
            Self::Indexed(_) => StateKind::Indexed,
            Self::Ready(_) => StateKind::Ready,
        }
    }

    fn index(&self) -> Option<&Arc<VectorIndex>> {
        match self {
            Self::Uninitialized => None,
            Self::Indexed(index) => Some(index),
            Self::Ready(chain) => Some(&chain.index),
        }
    }
}

/// An index bound to a synthesizer and the search settings used for every
/// question.
pub struct QaChain {
    index: Arc<VectorIndex>,
    synthesizer: AnswerSynthesizer,
    search: SearchOptions,
}

impl QaChain {
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn retrieve(&self, query_vector: &[f32]) -> Vec<ScoredChunk> {
        self.index.search(query_vector, &self.search)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub location: PathBuf,
    pub chunk_count: usize,
    pub document_count: usize,
    pub manifest: IndexManifest,
}

impl From<&VectorIndex> for IndexSummary {
    fn from(index: &VectorIndex) -> Self {
        let documents = index
            .chunks()
            .map(|chunk| chunk.source_path.as_str())
            .collect::<HashSet<_>>();
        Self {
            location: index.location().to_path_buf(),
            chunk_count: index.len(),
            document_count: documents.len(),
            manifest: index.manifest().clone(),
        }
    }
}

/// Answers legal questions over a persisted index.
///
/// Starts `Uninitialized`, becomes `Indexed` once an index is loaded or
/// built, and `Ready` after the first question binds the index to the
/// language model. Rebuilding drops back to `Indexed`. Queries in flight
/// during a rebuild finish against the index they started with.
pub struct LegalRetriever {
    config: RetrieverConfig,
    encoder: Arc<dyn Encoder>,
    model: Arc<dyn LanguageModel>,
    state: RwLock<RetrieverState>,
    build_lock: Mutex<()>,
}

impl LegalRetriever {
    /// Loads any compatible index already stored under `config.index_dir`.
    /// An unreadable index is logged and ignored so documents can be
    /// ingested again.
    pub fn open(config: RetrieverConfig, encoder: Arc<dyn Encoder>, model: Arc<dyn LanguageModel>) -> Self {
        let state = match VectorIndex::load(&config.index_dir, encoder.as_ref()) {
            Ok(Some(index)) => {
                info!(
                    location = %config.index_dir.display(),
                    chunks = index.len(),
                    "loaded existing index"
                );
                RetrieverState::Indexed(Arc::new(index))
            }
            Ok(None) => {
                info!(location = %config.index_dir.display(), "no index found; ingest documents first");
                RetrieverState::Uninitialized
            }
            Err(error) => {
                warn!(%error, "ignoring unusable index; ingest documents to rebuild it");
                RetrieverState::Uninitialized
            }
        };

        Self {
            config,
            encoder,
            model,
            state: RwLock::new(state),
            build_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub async fn state_kind(&self) -> StateKind {
        self.state.read().await.kind()
    }

    pub async fn index_summary(&self) -> Option<IndexSummary> {
        self.state
            .read()
            .await
            .index()
            .map(|index| IndexSummary::from(index.as_ref()))
    }

    /// Encodes `chunks`, persists them as the new index and swaps it in.
    /// On failure the previous index, if any, keeps serving queries.
    pub async fn create_index(&self, chunks: Vec<Chunk>) -> Result<IndexSummary, BuildError> {
        if chunks.is_empty() {
            return Err(BuildError::Empty);
        }

        let _build = self.build_lock.lock().await;
        let encoder = Arc::clone(&self.encoder);
        let location = self.config.index_dir.clone();

        let index = tokio::task::spawn_blocking(move || {
            let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
            let embeddings = encoder.encode_batch(&texts);
            VectorIndex::build(&location, chunks, embeddings, encoder.as_ref())
        })
        .await
        .map_err(|error| BuildError::Task(error.to_string()))??;

        let summary = IndexSummary::from(&index);
        *self.state.write().await = RetrieverState::Indexed(Arc::new(index));
        info!(
            chunks = summary.chunk_count,
            documents = summary.document_count,
            build_id = %summary.manifest.build_id,
            "index ready"
        );
        Ok(summary)
    }

    /// Ingests the given PDFs, skipping unreadable ones, and rebuilds the
    /// index from whatever was extracted. Fails with an ingestion error
    /// naming every skipped file when nothing could be extracted.
    pub async fn ingest_and_index(
        &self,
        paths: Vec<PathBuf>,
    ) -> Result<(IngestionReport, IndexSummary), IndexingError> {
        let options = self.config.ingestion.clone();
        let mut report = tokio::task::spawn_blocking(move || ingest_documents_best_effort(&paths, &options))
            .await
            .map_err(|error| BuildError::Task(error.to_string()))??;

        if report.chunks.is_empty() {
            let error = if report.skipped_files.is_empty() {
                IngestError::NoText(report.documents.len())
            } else {
                IngestError::NothingIngested {
                    skipped: std::mem::take(&mut report.skipped_files),
                }
            };
            return Err(error.into());
        }

        let chunks = std::mem::take(&mut report.chunks);
        let summary = self.create_index(chunks).await?;
        Ok((report, summary))
    }

    pub async fn query(&self, question: &str) -> Result<RetrievalResult, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let chain = self.chain().await?;
        let query_vector = self.encoder.encode(question);
        let chunks = chain
            .retrieve(&query_vector)
            .into_iter()
            .map(|scored| scored.chunk)
            .collect::<Vec<_>>();
        let sources = chunks.iter().map(Chunk::citation).collect::<Vec<_>>();

        match chain.synthesizer.synthesize(question, &chunks).await {
            Ok(answer) => Ok(RetrievalResult { answer, sources }),
            Err(source) => {
                warn!(error = %source, sources = sources.len(), "answer synthesis failed");
                Err(QueryError::Synthesis { source, sources })
            }
        }
    }

    async fn chain(&self) -> Result<Arc<QaChain>, QueryError> {
        match &*self.state.read().await {
            RetrieverState::Uninitialized => return Err(QueryError::NoIndex),
            RetrieverState::Ready(chain) => return Ok(Arc::clone(chain)),
            RetrieverState::Indexed(_) => {}
        }

        let mut state = self.state.write().await;
        let index = match &*state {
            RetrieverState::Uninitialized => return Err(QueryError::NoIndex),
            RetrieverState::Ready(chain) => return Ok(Arc::clone(chain)),
            RetrieverState::Indexed(index) => Arc::clone(index),
        };

        let chain = Arc::new(QaChain {
            index,
            synthesizer: AnswerSynthesizer::new(
                Arc::clone(&self.model),
                self.config.prompt.clone(),
                self.config.max_answer_tokens,
            ),
            search: self.config.search,
        });
        *state = RetrieverState::Ready(Arc::clone(&chain));
        info!(model = chain.synthesizer.model_name(), "question answering chain initialized");
        Ok(chain)
    }
}
