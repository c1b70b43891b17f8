use crate::ingest::SkippedDocument;
use crate::models::SourceCitation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no documents were provided for ingestion")]
    EmptyInput,

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf parse error in {path}: {details}")]
    PdfParse { path: PathBuf, details: String },

    #[error("no readable text found in {0} document(s)")]
    NoText(usize),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("none of the {} document(s) could be ingested: {}", .skipped.len(), describe_skipped(.skipped))]
    NothingIngested { skipped: Vec<SkippedDocument> },
}

fn describe_skipped(skipped: &[SkippedDocument]) -> String {
    skipped
        .iter()
        .map(|document| format!("{} ({})", document.path.display(), document.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("index storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("index at {path} is incompatible: {details}")]
    Incompatible { path: PathBuf, details: String },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot build an index from zero chunks")]
    Empty,

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("embedding for chunk {chunk_id} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to persist index: {0}")]
    Storage(#[from] StorageError),

    #[error("index build task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("language model credential is not configured; set GROQ_API_KEY")]
    MissingCredential,

    #[error("language model rejected the credential ({0})")]
    Unauthorized(reqwest::StatusCode),

    #[error("language model request timed out")]
    Timeout,

    #[error("language model http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("language model returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("language model returned an empty completion")]
    EmptyCompletion,

    #[error("invalid language model endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("language model call failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<SynthesisError>,
    },
}

impl SynthesisError {
    /// Whether another attempt could succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Http(_) => true,
            Self::Api { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error)
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("no legal documents are indexed; ingest documents first")]
    NoIndex,

    #[error("could not generate an answer ({} source(s) retrieved): {source}", .sources.len())]
    Synthesis {
        #[source]
        source: SynthesisError,
        sources: Vec<SourceCitation>,
    },
}

impl QueryError {
    /// Sources retrieved before the failure, if any.
    pub fn sources(&self) -> &[SourceCitation] {
        match self {
            Self::Synthesis { sources, .. } => sources,
            _ => &[],
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
