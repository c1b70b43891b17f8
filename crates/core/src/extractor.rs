use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let parse_error = |details: String| IngestError::PdfParse {
            path: path.to_path_buf(),
            details,
        };

        let document = Document::load(path).map_err(|error| parse_error(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| parse_error(format!("page {page_no}: {error}")))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(parse_error("pdf had no readable page text".to_string()));
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_pdf;
    use tempfile::tempdir;

    #[test]
    fn pages_are_numbered_from_one() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("contract.pdf");
        write_pdf(&path, &["Recitals of the parties", "Signature block"])?;

        let pages = extract_page_texts(&path)?;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Recitals"));
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].text.contains("Signature"));
        Ok(())
    }

    #[test]
    fn blank_pages_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sparse.pdf");
        write_pdf(&path, &["Schedule A", ""])?;

        let pages = extract_page_texts(&path)?;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        Ok(())
    }

    #[test]
    fn broken_pdf_reports_its_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        match extract_page_texts(&path) {
            Err(IngestError::PdfParse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a parse error, got {other:?}"),
        }
        Ok(())
    }
}
