//! User Interface module
//!
//! Terminal output for session results, streamed fragments and statistics.

/// Simple CLI output functions
pub mod cli;

use crate::session::Document;

/// Human-readable origin of a reference document.
///
/// Documents with a page number come from uploaded files; the rest are web pages.
pub fn format_source(document: &Document) -> String {
    match document.page {
        Some(page) => format!("{} (Page: {})", document.source, page),
        None => document.source.clone(),
    }
}

/// First line of a document, trimmed for use as a title
pub fn document_title(document: &Document, max_chars: usize) -> String {
    let line = document.content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let line = line.trim();

    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, source: &str, page: Option<u32>) -> Document {
        Document {
            content: content.to_string(),
            source: source.to_string(),
            page,
        }
    }

    #[test]
    fn test_format_source() {
        assert_eq!(
            format_source(&doc("x", "notes.pdf", Some(3))),
            "notes.pdf (Page: 3)"
        );
        assert_eq!(
            format_source(&doc("x", "https://hamel.dev/blog", None)),
            "https://hamel.dev/blog"
        );
    }

    #[test]
    fn test_document_title() {
        let document = doc("\n  Retrieval augmented generation explained\nmore", "s", None);
        assert_eq!(document_title(&document, 9), "Retrieval…");
        assert_eq!(
            document_title(&document, 80),
            "Retrieval augmented generation explained"
        );
        assert_eq!(document_title(&doc("", "s", None), 10), "");
    }
}
