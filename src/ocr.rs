use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Seam over the local OCR engine so batch code can be exercised with a
/// stub (and so the fallback policy in `extract` can count invocations).
pub trait OcrEngine {
    /// Render every page of a PDF to a bitmap and OCR it, concatenating
    /// per-page text in page order.
    fn ocr_pdf(&self, path: &Path) -> Result<String>;

    /// OCR a single raster image file.
    fn ocr_image(&self, path: &Path) -> Result<String>;
}

/// OCR via the locally installed `tesseract` binary, with `pdftoppm` doing
/// the PDF page rendering.
pub struct Tesseract {
    lang: String,
    dpi: u32,
}

impl Tesseract {
    pub fn new(lang: impl Into<String>, dpi: u32) -> Self {
        Self {
            lang: lang.into(),
            dpi,
        }
    }

    fn run_tesseract(&self, image: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output()
            .context("failed to run tesseract (is it installed?)")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        // Tesseract emits a form feed between pages on some builds.
        Ok(String::from_utf8_lossy(&output.stdout).replace('\x0c', ""))
    }
}

impl OcrEngine for Tesseract {
    fn ocr_pdf(&self, path: &Path) -> Result<String> {
        let temp_dir = tempfile::Builder::new()
            .prefix("fapiao_ocr_")
            .tempdir()
            .context("failed to create OCR scratch directory")?;
        let prefix = temp_dir.path().join("page");

        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(path)
            .arg(&prefix)
            .status()
            .context("failed to run pdftoppm (is poppler installed?)")?;
        if !status.success() {
            bail!("pdftoppm exited with {status} for {}", path.display());
        }

        // pdftoppm writes page-1.png, page-2.png, ... ; collect and order them.
        let mut pages: Vec<(usize, std::path::PathBuf)> = std::fs::read_dir(temp_dir.path())
            .context("failed to list rendered pages")?
            .filter_map(|entry| entry.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_str()?;
                let num = stem.rsplit('-').next()?.parse::<usize>().ok()?;
                Some((num, p))
            })
            .collect();
        pages.sort_by_key(|(num, _)| *num);

        if pages.is_empty() {
            bail!("pdftoppm produced no pages for {}", path.display());
        }
        info!(pages = pages.len(), file = %path.display(), "Running OCR over rendered pages");

        let mut text = String::new();
        for (num, image) in &pages {
            match self.run_tesseract(image) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => {
                    // One bad page should not sink the whole document.
                    warn!(page = num, error = %e, "OCR failed for page");
                }
            }
        }
        Ok(text)
    }

    fn ocr_image(&self, path: &Path) -> Result<String> {
        self.run_tesseract(path)
    }
}
