//! PDF text extraction.
//!
//! Produces the plain text of every page in page order, with no page
//! markers. A PDF that parses but contains no text layer (a scanned image,
//! say) yields an empty or near-empty string and is not an error.

use std::path::Path;

use thiserror::Error;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a PDF file (missing %PDF- header)")]
    NotPdf,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Extract the text of an in-memory PDF.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    if !looks_like_pdf(bytes) {
        return Err(ExtractError::NotPdf);
    }
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Read and extract a PDF from disk.
pub fn extract_pdf_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_pdf_text(&bytes)
}

/// The header may be preceded by a little junk; readers accept it within
/// the first kilobyte.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_rejected() {
        let err = extract_pdf_text(b"just some text, not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::NotPdf));
    }

    #[test]
    fn test_header_may_follow_leading_junk() {
        let mut bytes = vec![b' '; 16];
        bytes.extend_from_slice(b"%PDF-1.7\n");
        assert!(looks_like_pdf(&bytes));
        assert!(!looks_like_pdf(&[b'x'; 2048]));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_pdf_file(Path::new("/nonexistent/docqa/file.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
        assert!(err.to_string().contains("file.pdf"));
    }
}
