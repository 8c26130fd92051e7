use docx_rs::{DocumentChild, ParagraphChild, RunChild};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file is not accessible: {path}: {source}")]
    FileAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            MIME_PDF => Some(Self::Pdf),
            // Legacy .doc is routed through the DOCX parser; real binary
            // .doc files will surface as a DOCX parse error.
            MIME_DOCX | MIME_DOC => Some(Self::Docx),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct TextExtractionService;

impl TextExtractionService {
    pub fn new() -> Self {
        Self
    }

    /// Extracts and normalizes the text content of an uploaded CV.
    ///
    /// The MIME type is checked before the filesystem is touched, so an
    /// unsupported type is reported as such even for a missing file.
    pub async fn extract_text(
        &self,
        file_path: &str,
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        let kind = DocumentKind::from_mime(mime_type)
            .ok_or_else(|| ExtractionError::UnsupportedType(mime_type.to_string()))?;

        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|source| ExtractionError::FileAccess {
                path: file_path.to_string(),
                source,
            })?;

        let raw = match kind {
            DocumentKind::Pdf => extract_pdf(bytes).await?,
            DocumentKind::Docx => extract_docx(bytes).await?,
        };

        Ok(clean_text(&raw))
    }
}

async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    // pdf-extract is CPU-bound and occasionally slow on exotic fonts.
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ExtractionError::Pdf(format!("parser task failed: {}", e)))?
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    if raw.trim().is_empty() {
        return Err(ExtractionError::Pdf(
            "PDF appears to be empty or contains no extractable text".to_string(),
        ));
    }
    Ok(raw)
}

async fn extract_docx(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    let raw = tokio::task::spawn_blocking(move || docx_to_text(&bytes))
        .await
        .map_err(|e| ExtractionError::Docx(format!("parser task failed: {}", e)))??;

    if raw.trim().is_empty() {
        return Err(ExtractionError::Docx(
            "DOCX appears to be empty or contains no extractable text".to_string(),
        ));
    }
    Ok(raw)
}

fn docx_to_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| ExtractionError::Docx(e.to_string()))?;

    let mut content = String::new();
    let mut skipped = 0usize;
    for child in doc.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                for child in p.children {
                    if let ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let RunChild::Text(t) = child {
                                content.push_str(&t.text);
                            }
                        }
                    }
                }
                content.push('\n');
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(
            skipped,
            "DOCX contains non-paragraph elements that were not extracted"
        );
    }
    Ok(content)
}

/// Normalizes raw parser output into clean, analyzable text.
///
/// Guarantees on the output: `\n`-only line breaks, no space/tab runs, at
/// most one blank line in a row, every line trimmed, the whole string
/// trimmed, and no ASCII control characters. Idempotent.
pub fn clean_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in normalized.split('\n') {
        let mut cleaned = String::with_capacity(line.len());
        let mut last_was_space = false;
        for ch in line.chars() {
            let ch = if ch == '\t' { ' ' } else { ch };
            if ch.is_ascii_control() {
                continue;
            }
            if ch == ' ' {
                if !last_was_space {
                    cleaned.push(' ');
                }
                last_was_space = true;
            } else {
                cleaned.push(ch);
                last_was_space = false;
            }
        }
        lines.push(cleaned.trim().to_string());
    }

    // Collapse blank-line runs: at most one empty line between paragraphs,
    // none at the start or end.
    let mut out: Vec<String> = Vec::new();
    let mut blank_pending = false;
    for line in lines {
        if line.is_empty() {
            blank_pending = true;
        } else {
            if blank_pending && !out.is_empty() {
                out.push(String::new());
            }
            blank_pending = false;
            out.push(line);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace_and_paragraph_runs() {
        let cleaned = clean_text("John Doe\n\n\n   Software Engineer  ");
        assert_eq!(cleaned, "John Doe\n\nSoftware Engineer");
    }

    #[test]
    fn clean_text_normalizes_line_endings() {
        assert_eq!(clean_text("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn clean_text_collapses_tabs_and_spaces() {
        assert_eq!(clean_text("a\t\t  b   c"), "a b c");
    }

    #[test]
    fn clean_text_strips_control_characters() {
        let cleaned = clean_text("a\x00b\x08c\x0b\x0cd\x1fe\x7ff");
        assert_eq!(cleaned, "abcdef");
        assert!(cleaned.chars().all(|c| !c.is_ascii_control()));
    }

    #[test]
    fn clean_text_is_idempotent() {
        let samples = [
            "John Doe\n\n\n   Software Engineer  ",
            "\r\n\r\n  a\tb \r c\n\n\n\n\nd  ",
            "",
            "   \t \n\n ",
            "single line",
            "p1\n\np2\n\n\np3",
            "\x01ctrl\x7f chars\x1f here",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn clean_text_output_has_no_double_spaces_or_triple_newlines() {
        let cleaned = clean_text("a  b\t\tc\n\n\n\n\nd   e\r\n\r\n\r\n\r\nf");
        assert!(!cleaned.contains("  "));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(!cleaned.starts_with(char::is_whitespace));
        assert!(!cleaned.ends_with(char::is_whitespace));
    }

    #[test]
    fn mime_dispatch_routes_both_word_types_to_docx() {
        assert_eq!(DocumentKind::from_mime(MIME_PDF), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_mime(MIME_DOCX), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_mime(MIME_DOC), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_mime("image/jpeg"), None);
        assert_eq!(DocumentKind::from_mime(""), None);
    }

    #[tokio::test]
    async fn unsupported_mime_is_rejected_before_file_access() {
        let service = TextExtractionService::new();
        // The path does not exist; the MIME check must still win.
        let err = service
            .extract_text("/tmp/x.jpg", "image/jpeg")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: image/jpeg");
    }

    #[tokio::test]
    async fn missing_file_fails_with_access_error() {
        let service = TextExtractionService::new();
        let err = service
            .extract_text("/nonexistent/cv.pdf", MIME_PDF)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::FileAccess { .. }));
    }
}
