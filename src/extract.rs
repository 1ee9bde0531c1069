//! Text extraction for corpus files.
//!
//! Plain-text formats are decoded as UTF-8. PDFs are extracted page by page
//! so each page can be cited on its own.

use std::path::Path;

/// How a file's bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
}

impl FileKind {
    /// Classify by extension. Anything that is not a PDF is treated as text.
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => FileKind::Pdf,
            _ => FileKind::Text,
        }
    }
}

/// Extraction error. The loader logs it and skips the file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not valid UTF-8 text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Decode a text file.
pub fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    let text = String::from_utf8(bytes)?;
    // Strip a UTF-8 byte order mark so it doesn't become part of the first chunk.
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Extract one string per PDF page, in page order.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
