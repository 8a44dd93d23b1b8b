//! Session-scoped knowledge base built from uploaded documents
//!
//! A session holds at most one knowledge base. Uploading another document
//! replaces it; texts are never merged.

mod pdf;

pub use pdf::{PdfText, extract_pdf_text};

#[cfg(test)]
pub(crate) use pdf::fixtures;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Error, Result};

/// Plain text that grounds completion requests for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    source: String,
    text: String,
    pages: usize,
    created_at: DateTime<Utc>,
}

/// Knowledge base metadata returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeSummary {
    pub source: String,
    pub pages: usize,
    pub chars: usize,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Wrap already-extracted text
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>, pages: usize) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            pages,
            created_at: Utc::now(),
        }
    }

    /// Build from an uploaded PDF
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if `bytes` exceeds `max_bytes`, or
    /// `FileFormat` if the PDF cannot be read
    pub fn from_pdf(source: impl Into<String>, bytes: &[u8], max_bytes: usize) -> Result<Self> {
        if bytes.len() > max_bytes {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let source = source.into();
        let extracted = extract_pdf_text(bytes)?;

        tracing::info!(
            source = %source,
            pages = extracted.pages,
            pages_with_text = extracted.pages_with_text,
            "knowledge base built from PDF"
        );

        Ok(Self::new(source, extracted.text, extracted.pages))
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn pages(&self) -> usize {
        self.pages
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> KnowledgeSummary {
        KnowledgeSummary {
            source: self.source.clone(),
            pages: self.pages,
            chars: self.text.chars().count(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    #[test]
    fn from_pdf_extracts_text() {
        let bytes = pdf_with_pages(&["Hello", "World"]);
        let kb = KnowledgeBase::from_pdf("notes.pdf", &bytes, 1024 * 1024).unwrap();

        assert_eq!(kb.text(), "Hello\n\nWorld\n\n");
        assert_eq!(kb.source(), "notes.pdf");
        assert_eq!(kb.pages(), 2);
        assert_eq!(kb.summary().chars, 14);
    }

    #[test]
    fn from_pdf_enforces_size_limit() {
        let bytes = pdf_with_pages(&["Hello"]);
        let err = KnowledgeBase::from_pdf("big.pdf", &bytes, 10).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 10, .. }));
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(KnowledgeBase::new("x", " \n\n", 1).is_empty());
        assert!(!KnowledgeBase::new("x", "a", 1).is_empty());
    }
}
