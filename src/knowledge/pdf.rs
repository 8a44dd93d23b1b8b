//! PDF text extraction

use lopdf::Document;

use crate::{Error, Result};

/// Text pulled from a PDF, page order preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfText {
    /// Non-empty page texts, each followed by a blank line
    pub text: String,
    /// Pages in the document
    pub pages: usize,
    /// Pages that contributed text
    pub pages_with_text: usize,
}

/// Extract plain text from PDF bytes
///
/// Each page's text is trimmed; empty pages are skipped and every kept page
/// is followed by `"\n\n"`.
///
/// # Errors
///
/// Returns `FileFormat` if the bytes are not a readable, unencrypted PDF or
/// contain no extractable text
pub fn extract_pdf_text(bytes: &[u8]) -> Result<PdfText> {
    if bytes.is_empty() {
        return Err(Error::FileFormat("uploaded file is empty".to_string()));
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(Error::FileFormat("file is not a PDF".to_string()));
    }

    let doc = Document::load_mem(bytes)
        .map_err(|e| Error::FileFormat(format!("failed to parse PDF: {e}")))?;

    if doc.is_encrypted() {
        return Err(Error::FileFormat(
            "PDF is password protected; upload an unencrypted copy".to_string(),
        ));
    }

    let pages = doc.get_pages();
    let mut text = String::new();
    let mut pages_with_text = 0;

    // BTreeMap keyed by page number, so iteration follows page order
    for &page_number in pages.keys() {
        match doc.extract_text(&[page_number]) {
            Ok(page_text) => {
                let page_text = page_text.trim();
                if page_text.is_empty() {
                    continue;
                }
                text.push_str(page_text);
                text.push_str("\n\n");
                pages_with_text += 1;
            }
            Err(e) => {
                tracing::warn!(page = page_number, error = %e, "skipping unreadable PDF page");
            }
        }
    }

    if pages_with_text == 0 {
        return Err(Error::FileFormat(
            "no extractable text found in PDF".to_string(),
        ));
    }

    tracing::debug!(
        pages = pages.len(),
        pages_with_text,
        chars = text.chars().count(),
        "extracted PDF text"
    );

    Ok(PdfText {
        text,
        pages: pages.len(),
        pages_with_text,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a PDF with one page per entry; empty entries become blank pages
    pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = i64::try_from(kids.len()).expect("page count");
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    #[test]
    fn extracts_pages_in_order() {
        let bytes = pdf_with_pages(&["Hello", "World"]);
        let extracted = extract_pdf_text(&bytes).unwrap();

        assert_eq!(extracted.text, "Hello\n\nWorld\n\n");
        assert_eq!(extracted.pages, 2);
        assert_eq!(extracted.pages_with_text, 2);
    }

    #[test]
    fn skips_blank_pages() {
        let bytes = pdf_with_pages(&["First", "", "Third"]);
        let extracted = extract_pdf_text(&bytes).unwrap();

        assert_eq!(extracted.text, "First\n\nThird\n\n");
        assert_eq!(extracted.pages, 3);
        assert_eq!(extracted.pages_with_text, 2);
    }

    #[test]
    fn rejects_non_pdf() {
        assert!(matches!(extract_pdf_text(b""), Err(Error::FileFormat(_))));
        assert!(matches!(
            extract_pdf_text(b"just some text"),
            Err(Error::FileFormat(_))
        ));
        assert!(matches!(
            extract_pdf_text(b"%PDF-1.5 truncated garbage"),
            Err(Error::FileFormat(_))
        ));
    }

    #[test]
    fn rejects_pdf_without_text() {
        let bytes = pdf_with_pages(&[""]);
        assert!(matches!(extract_pdf_text(&bytes), Err(Error::FileFormat(_))));
    }
}
