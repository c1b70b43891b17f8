use crate::error::IngestError;
use crate::models::{Chunk, DocumentFingerprint, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            min_chars: value.min_chunk_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits normalized text into overlapping windows of at most `max_chars`
/// characters. A window ends at the last sentence boundary in its final
/// third when there is one, else at the last whitespace, else mid-word.
/// The overlap restarts on a word boundary when one falls inside it.
pub fn sliding_windows(normalized: &str, config: ChunkingConfig, boundary: &Regex) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + config.max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let window: String = chars[start..hard_end].iter().collect();
            (start + soft_cut(&window, config.max_chars * 2 / 3, boundary)).max(start + 1)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }

        if end == chars.len() {
            break;
        }
        let mut next = end.saturating_sub(config.overlap_chars).max(start + 1);
        while next < end && !chars[next - 1].is_whitespace() {
            next += 1;
        }
        start = next;
    }

    let kept = windows
        .iter()
        .filter(|window| window.chars().count() >= config.min_chars)
        .cloned()
        .collect::<Vec<_>>();

    if kept.is_empty() {
        windows.into_iter().take(1).collect()
    } else {
        kept
    }
}

/// Character length of `window` after the preferred cut.
fn soft_cut(window: &str, min_chars: usize, boundary: &Regex) -> usize {
    let total = window.chars().count();
    let char_offset = |byte: usize| window[..byte].chars().count();

    let sentence_end = boundary
        .find_iter(window)
        .map(|found| char_offset(found.end()))
        .filter(|offset| *offset >= min_chars)
        .last();
    if let Some(offset) = sentence_end {
        return offset;
    }

    window
        .char_indices()
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(byte, _)| char_offset(byte))
        .filter(|offset| *offset >= min_chars)
        .last()
        .unwrap_or(total)
}

/// Validated chunking settings with the sentence-boundary pattern compiled
/// once, shared by every page of an ingestion run.
#[derive(Debug, Clone)]
pub struct PageChunker {
    config: ChunkingConfig,
    boundary: Regex,
}

impl PageChunker {
    pub fn new(options: &IngestionOptions) -> Result<Self, IngestError> {
        let config = ChunkingConfig::from(options);
        config.validate()?;
        let boundary = Regex::new(options.sentence_boundary_regex)?;
        Ok(Self { config, boundary })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Chunks one page, numbering chunks from `global_index`. Returns the
    /// chunks and the next free index.
    pub fn build_page_chunks(
        &self,
        document: &DocumentFingerprint,
        page: u32,
        page_text: &str,
        global_index: u64,
    ) -> (Vec<Chunk>, u64) {
        let normalized = normalize_whitespace(page_text);

        let mut chunks = Vec::new();
        let mut cursor = global_index;

        for text in sliding_windows(&normalized, self.config, &self.boundary) {
            chunks.push(Chunk {
                id: make_chunk_id(&document.document_id, page, cursor, &text),
                text,
                source_document: document.document_name.clone(),
                source_path: document.source_path.clone(),
                page_number: Some(page),
                sequence_index: cursor,
            });
            cursor = cursor.saturating_add(1);
        }

        (chunks, cursor)
    }
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> DocumentFingerprint {
        DocumentFingerprint {
            document_id: "doc-1".to_string(),
            document_name: "msa.pdf".to_string(),
            source_path: "/tmp/msa.pdf".to_string(),
            checksum: "checksum".to_string(),
            page_count: 1,
            ingested_at: chrono::Utc::now(),
        }
    }

    fn boundary() -> Regex {
        Regex::new(IngestionOptions::default().sentence_boundary_regex).expect("default regex")
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof\u{a0}  spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn short_text_is_a_single_window() {
        let config = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 10,
            min_chars: 5,
        };
        let windows = sliding_windows("Payment is due net thirty.", config, &boundary());
        assert_eq!(windows, vec!["Payment is due net thirty.".to_string()]);
    }

    #[test]
    fn windows_prefer_sentence_boundaries_and_overlap() {
        let config = ChunkingConfig {
            max_chars: 60,
            overlap_chars: 15,
            min_chars: 5,
        };
        let text = "The lessee shall maintain insurance at all times. \
                    The lessor may inspect the premises with notice. \
                    Rent escalates three percent annually.";
        let windows = sliding_windows(text, config, &boundary());

        assert!(windows.len() >= 3);
        assert_eq!(windows[0], "The lessee shall maintain insurance at all times.");
        assert!(windows.iter().all(|window| window.chars().count() <= 60));
        assert!(windows
            .last()
            .is_some_and(|window| window.ends_with("annually.")));
        assert!(windows[1].starts_with("at all times."));
    }

    #[test]
    fn windows_without_spaces_are_hard_cut() {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 2,
            min_chars: 1,
        };
        let windows = sliding_windows(&"x".repeat(25), config, &boundary());
        assert_eq!(windows[0].len(), 10);
        assert_eq!(windows[1].len(), 10);
        assert!(windows.iter().map(String::len).sum::<usize>() >= 25);
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let options = IngestionOptions {
            chunk_max_chars: 50,
            chunk_overlap_chars: 50,
            ..IngestionOptions::default()
        };
        let result = PageChunker::new(&options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn invalid_boundary_pattern_is_rejected_up_front() {
        let options = IngestionOptions {
            sentence_boundary_regex: "[unclosed",
            ..IngestionOptions::default()
        };
        assert!(matches!(PageChunker::new(&options), Err(IngestError::Regex(_))));
    }

    #[test]
    fn one_chunker_serves_consecutive_pages() -> Result<(), IngestError> {
        let chunker = PageChunker::new(&IngestionOptions::default())?;
        let (first, next) =
            chunker.build_page_chunks(&fingerprint(), 1, "The lessee pays rent monthly in advance.", 0);
        let (second, last) =
            chunker.build_page_chunks(&fingerprint(), 2, "The lessor repairs structural defects.", next);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].sequence_index, next);
        assert_eq!(last, next + 1);
        assert_eq!(chunker.config().max_chars, 1_000);
        Ok(())
    }

    #[test]
    fn page_chunks_carry_document_page_and_sequence() -> Result<(), IngestError> {
        let options = IngestionOptions {
            chunk_max_chars: 40,
            chunk_overlap_chars: 5,
            min_chunk_chars: 5,
            ..IngestionOptions::default()
        };
        let text = "Section 1. Definitions apply throughout. Section 2. Term begins on signing.";
        let chunker = PageChunker::new(&options)?;
        let (chunks, next) = chunker.build_page_chunks(&fingerprint(), 3, text, 7);

        assert!(chunks.len() >= 2);
        assert_eq!(next, 7 + chunks.len() as u64);
        for (offset, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source_document, "msa.pdf");
            assert_eq!(chunk.page_number, Some(3));
            assert_eq!(chunk.sequence_index, 7 + offset as u64);
            assert_eq!(chunk.id.len(), 64);
        }
        Ok(())
    }
}
