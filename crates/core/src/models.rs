use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document label used when a chunk's origin is unknown.
pub const UNKNOWN_DOCUMENT: &str = "Unknown";

/// Page label used when a chunk carries no page number.
pub const UNKNOWN_PAGE: &str = "N/A";

/// Number of characters kept in a citation excerpt.
pub const EXCERPT_CHARS: usize = 200;

/// Appended to an excerpt that was cut at [`EXCERPT_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";

fn unknown_document() -> String {
    UNKNOWN_DOCUMENT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_name: String,
    pub source_path: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A span of text from one page of one source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default = "unknown_document")]
    pub source_document: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub sequence_index: u64,
}

impl Chunk {
    pub fn document_label(&self) -> &str {
        if self.source_document.trim().is_empty() {
            UNKNOWN_DOCUMENT
        } else {
            &self.source_document
        }
    }

    pub fn page_label(&self) -> String {
        self.page_number
            .map(|page| page.to_string())
            .unwrap_or_else(|| UNKNOWN_PAGE.to_string())
    }

    pub fn citation(&self) -> SourceCitation {
        SourceCitation {
            document: self.document_label().to_string(),
            page: self.page_label(),
            content: excerpt(&self.text),
        }
    }
}

/// First [`EXCERPT_CHARS`] characters of `text`, marked when cut.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((byte_offset, _)) => format!("{}{}", &text[..byte_offset], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceCitation {
    pub document: String,
    pub page: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalResult {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
}

/// A chunk returned by the index together with its query similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub sentence_boundary_regex: &'static str,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            min_chunk_chars: 20,
            sentence_boundary_regex: r"[.?!;][\)\]'\x22]?\s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub diversify: bool,
    /// 1.0 ranks purely by relevance, 0.0 purely by novelty.
    pub lambda: f32,
    /// Candidates considered by the diversity pass.
    pub fetch_k: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            diversify: true,
            lambda: 0.5,
            fetch_k: 20,
        }
    }
}

impl SearchOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn without_diversity(mut self) -> Self {
        self.diversify = false;
        self
    }
}
