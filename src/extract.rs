//! Text extraction for ingested files.
//!
//! PDFs go through `pdf-extract`; `.txt` and `.md` files are read as UTF-8.
//! Anything else is rejected so the pipeline can skip the file.

use std::path::Path;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Extract plain text from raw file bytes.
pub fn extract_text(path: &Path, bytes: &[u8]) -> Result<String> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Pdf) => extract_pdf(path, bytes),
        Some(DocumentKind::Text) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => Err(RagError::Extract {
            path: path.display().to_string(),
            message: "unsupported file type".to_string(),
        }),
    }
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| RagError::Extract {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
