use crate::ocr::OcrEngine;
use lopdf::Document;
use std::path::Path;
use tracing::{info, warn};

/// Below this many non-whitespace characters the text layer is considered
/// useless and the document is re-read with OCR.
pub const OCR_FALLBACK_THRESHOLD: usize = 100;

fn meaningful_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Pull text straight from the PDF text layer.
///
/// Any failure (unparseable file, extraction error) is logged and collapses
/// to an empty string so the caller's batch loop never aborts on a bad file.
pub fn direct_text(path: &Path) -> String {
    // Structural parse first; pdf-extract panics less politely on garbage.
    if let Err(e) = Document::load(path) {
        warn!(file = %path.display(), error = %e, "Failed to parse PDF");
        return String::new();
    }

    match pdf_extract::extract_text(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "PDF text extraction failed");
            String::new()
        }
    }
}

/// Apply the OCR fallback rule: keep the direct text when it carries enough
/// characters, otherwise replace it wholesale with the OCR result.
///
/// OCR is never invoked when the direct text meets the threshold.
pub fn apply_ocr_fallback(direct: String, path: &Path, ocr: &dyn OcrEngine) -> String {
    let chars = meaningful_len(&direct);
    if chars >= OCR_FALLBACK_THRESHOLD {
        return direct;
    }
    info!(
        file = %path.display(),
        chars,
        "Text layer too short, falling back to OCR"
    );
    match ocr.ocr_pdf(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "OCR failed");
            // Whatever the text layer gave us is still better than nothing.
            direct
        }
    }
}

/// Full text of a document: text layer first, OCR when the layer is thin.
pub fn document_text(path: &Path, ocr: &dyn OcrEngine) -> String {
    let direct = direct_text(path);
    apply_ocr_fallback(direct, path, ocr)
}
