//! PDF text extraction via the pdf-extract crate.

use std::path::Path;

use crate::error::{RagError, Result};

/// Extract the full text of a PDF.
///
/// Fails with [`RagError::Extraction`] when the file cannot be read or
/// parsed, or when it has no text layer (e.g. a scanned document).
pub fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| RagError::Extraction {
        file: path.to_path_buf(),
        reason: format!("read failed: {}", e),
    })?;

    let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| RagError::Extraction {
        file: path.to_path_buf(),
        reason: format!("pdf parse failed: {}", e),
    })?;

    if text.trim().is_empty() {
        return Err(RagError::Extraction {
            file: path.to_path_buf(),
            reason: "no text layer (scanned or image-only document?)".to_string(),
        });
    }

    Ok(text)
}

/// Count pages by form feed separators inserted between pages, falling
/// back to explicit "--- Page N ---" style markers some PDFs carry.
pub fn count_pages(text: &str) -> usize {
    let formfeed_pages = text.split('\x0c').filter(|p| !p.trim().is_empty()).count();
    if formfeed_pages > 1 {
        return formfeed_pages;
    }

    let marker = regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("invalid page marker regex");
    let marker_pages = marker
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .count();
    if marker_pages > 1 {
        return marker_pages;
    }

    1
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        assert_eq!(count_pages(text), 3);
    }

    #[test]
    fn test_count_pages_no_separator() {
        assert_eq!(count_pages("just one page of text"), 1);
    }

    #[test]
    fn test_count_pages_trailing_formfeed() {
        assert_eq!(count_pages("only page\x0c"), 1);
    }

    #[test]
    fn test_count_pages_with_markers() {
        let text = "intro text\n--- Page 2 ---\nsecond page\n--- Page 3 ---\nthird page";
        assert_eq!(count_pages(text), 3);
    }

    #[test]
    fn test_extract_missing_file() {
        let err = extract_text_from_pdf(Path::new("/nonexistent.pdf")).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[test]
    fn test_extract_garbage_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let err = extract_text_from_pdf(&path).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }
}
