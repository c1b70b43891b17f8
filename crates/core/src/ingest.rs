use crate::chunking::PageChunker;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::{Chunk, DocumentFingerprint, IngestError, IngestionOptions};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Chunks every document in order. Any unreadable document fails the whole
/// call.
pub fn ingest_documents<P: AsRef<Path>>(
    paths: &[P],
    options: &IngestionOptions,
) -> Result<Vec<Chunk>, IngestError> {
    if paths.is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let chunker = PageChunker::new(options)?;
    let mut chunks = Vec::new();
    let mut cursor = 0u64;
    for path in paths {
        let (fingerprint, document_chunks) =
            ingest_document(&LopdfExtractor, path.as_ref(), &chunker, cursor)?;
        info!(
            document = %fingerprint.document_name,
            pages = fingerprint.page_count,
            chunks = document_chunks.len(),
            "document chunked"
        );
        cursor += document_chunks.len() as u64;
        chunks.extend(document_chunks);
    }

    if chunks.is_empty() {
        return Err(IngestError::NoText(paths.len()));
    }

    Ok(chunks)
}

pub fn ingest_directory(folder: &Path, options: &IngestionOptions) -> Result<Vec<Chunk>, IngestError> {
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        warn!(folder = %folder.display(), "no pdf files found");
        return Err(IngestError::EmptyInput);
    }
    ingest_documents(&files, options)
}

#[derive(Debug)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub chunks: Vec<Chunk>,
    pub documents: Vec<DocumentFingerprint>,
    pub skipped_files: Vec<SkippedDocument>,
}

/// Like [`ingest_documents`] but unreadable documents are recorded and
/// skipped.
pub fn ingest_documents_best_effort<P: AsRef<Path>>(
    paths: &[P],
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    if paths.is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let chunker = PageChunker::new(options)?;
    let mut report = IngestionReport::default();
    let mut cursor = 0u64;

    for path in paths {
        let path = path.as_ref();
        match ingest_document(&LopdfExtractor, path, &chunker, cursor) {
            Ok((fingerprint, document_chunks)) => {
                cursor += document_chunks.len() as u64;
                report.chunks.extend(document_chunks);
                report.documents.push(fingerprint);
            }
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                report.skipped_files.push(SkippedDocument {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

pub fn ingest_directory_best_effort(
    folder: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::EmptyInput);
    }
    ingest_documents_best_effort(&files, options)
}

fn ingest_document(
    extractor: &dyn PdfExtractor,
    path: &Path,
    chunker: &PageChunker,
    first_index: u64,
) -> Result<(DocumentFingerprint, Vec<Chunk>), IngestError> {
    let mut fingerprint = build_document_fingerprint(path)?;
    let pages = extractor.extract_pages(path)?;
    fingerprint.page_count = pages.len();

    let mut chunks = Vec::new();
    let mut cursor = first_index;
    for page in pages {
        let (page_chunks, next_cursor) =
            chunker.build_page_chunks(&fingerprint, page.number, &page.text, cursor);
        cursor = next_cursor;
        chunks.extend(page_chunks);
    }

    Ok((fingerprint, chunks))
}

fn build_document_fingerprint(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentFingerprint {
        document_id: generate_document_id(path),
        document_name: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        page_count: 0,
        ingested_at: Utc::now(),
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_pdf;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive_and_case_insensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"not a pdf")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn empty_path_list_is_rejected() {
        let paths: Vec<PathBuf> = Vec::new();
        let result = ingest_documents(&paths, &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::EmptyInput)));
    }

    #[test]
    fn directory_without_pdfs_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = ingest_directory(dir.path(), &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::EmptyInput)));
        Ok(())
    }

    #[test]
    fn unreadable_document_fails_strict_ingestion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        write_pdf(&good, &["Assignment requires prior written consent."])?;
        fs::write(&bad, b"%PDF-1.4\n%broken")?;

        let result = ingest_documents(&[good, bad.clone()], &IngestionOptions::default());
        match result {
            Err(IngestError::PdfParse { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected a parse error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_file_reports_io_error() {
        let result = ingest_documents(&["/definitely/not/here.pdf"], &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }

    #[test]
    fn chunks_carry_document_name_page_and_global_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("lease.pdf");
        let second = dir.path().join("nda.pdf");
        write_pdf(&first, &["Rent is payable monthly in advance.", "Tenant maintains the premises."])?;
        write_pdf(&second, &["Confidential information excludes public data."])?;

        let chunks = ingest_documents(&[first, second], &IngestionOptions::default())?;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].source_document, "lease.pdf");
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[1].page_number, Some(2));
        assert_eq!(chunks[2].source_document, "nda.pdf");
        let order = chunks.iter().map(|chunk| chunk.sequence_index).collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn invalid_chunking_fails_before_any_document_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("lease.pdf");
        write_pdf(&path, &["Rent is payable monthly in advance."])?;
        let options = IngestionOptions {
            chunk_max_chars: 0,
            ..IngestionOptions::default()
        };

        let result = ingest_documents_best_effort(&[path], &options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        Ok(())
    }

    #[test]
    fn best_effort_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        write_pdf(&dir.path().join("valid.pdf"), &["Force majeure excuses performance."])?;

        let report = ingest_directory_best_effort(dir.path(), &IngestionOptions::default())?;

        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].page_count, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }
}
