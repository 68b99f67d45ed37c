use lopdf::Document;

#[derive(Debug)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Pulls plain text out of a PDF. Pages are visited in order and non-empty
/// page texts are joined with a blank line; pages yielding nothing are
/// skipped entirely. A PDF that lopdf cannot parse is an extraction failure,
/// there is no retry or OCR path here.
pub fn extract(pdf_bytes: &[u8]) -> Result<ExtractedText, String> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| format!("Failed to load PDF: {}", e))?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let mut chunks: Vec<String> = Vec::new();

    for (page_num, _) in pages {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            let trimmed = page_text.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        }
    }

    Ok(ExtractedText {
        text: chunks.join("\n\n"),
        page_count,
    })
}

/// Page count for upload-time metadata. Unparseable bytes count as zero
/// pages; the upload itself is not rejected for that.
pub fn page_count(pdf_bytes: &[u8]) -> usize {
    Document::load_mem(pdf_bytes)
        .map(|doc| doc.get_pages().len())
        .unwrap_or(0)
}
