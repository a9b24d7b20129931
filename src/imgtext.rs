use crate::ocr::OcrEngine;
use crate::scan;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImgTextSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// OCR every raster image directly inside `folder` into side-by-side
/// `*_extracted_text.txt` files. Per-image failures are counted, never
/// fatal; a folder without images writes nothing.
pub fn run(folder: &Path, ocr: &dyn OcrEngine) -> ImgTextSummary {
    let images = scan::find_images(folder);
    if images.is_empty() {
        warn!(path = %folder.display(), "No image files found");
        return ImgTextSummary::default();
    }
    info!(count = images.len(), "Extracting text from images");

    let mut summary = ImgTextSummary {
        total: images.len(),
        ..ImgTextSummary::default()
    };
    for (i, image) in images.iter().enumerate() {
        info!(progress = %format!("{}/{}", i + 1, images.len()), file = %image.display(), "Processing image");
        match extract_one(image, ocr) {
            Ok(()) => summary.success += 1,
            Err(e) => {
                error!(file = %image.display(), error = %e, "Extraction failed");
                summary.failed += 1;
            }
        }
    }
    info!(
        success = summary.success,
        failed = summary.failed,
        total = summary.total,
        "Image text extraction complete"
    );
    summary
}

fn extract_one(image: &Path, ocr: &dyn OcrEngine) -> Result<()> {
    let text = ocr.ocr_image(image)?;
    let output = text_path_for(image);
    fs::write(&output, text.trim())
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn text_path_for(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}_extracted_text.txt"))
}

/// OCR every image in `folder` into one annotated file instead of one file
/// per image. Images yielding no text count as failed.
pub fn run_merged(
    folder: &Path,
    output: Option<PathBuf>,
    ocr: &dyn OcrEngine,
) -> Result<ImgTextSummary> {
    let images = scan::find_images(folder);
    if images.is_empty() {
        warn!(path = %folder.display(), "No image files found");
        return Ok(ImgTextSummary::default());
    }

    let mut summary = ImgTextSummary {
        total: images.len(),
        ..ImgTextSummary::default()
    };
    let mut sections = Vec::new();
    let separator = "=".repeat(50);

    for image in &images {
        match ocr.ocr_image(image) {
            Ok(text) if !text.trim().is_empty() => {
                let name = image
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                sections.push(format!(
                    "\n{separator}\n文件: {name}\n{separator}\n{}",
                    text.trim()
                ));
                summary.success += 1;
            }
            Ok(_) => {
                warn!(file = %image.display(), "No text found in image");
                summary.failed += 1;
            }
            Err(e) => {
                error!(file = %image.display(), error = %e, "Extraction failed");
                summary.failed += 1;
            }
        }
    }

    let output = output.unwrap_or_else(|| folder.join("merged_extracted_text.txt"));
    let mut content = String::new();
    content.push_str("图片文字提取结果合并文件\n");
    content.push_str(&format!("总计图片: {} 个\n", summary.total));
    content.push_str(&format!("成功提取: {} 个\n", summary.success));
    content.push_str(&format!("处理失败: {} 个\n", summary.failed));
    content.push_str(&format!("\n{}\n", "=".repeat(80)));
    if sections.is_empty() {
        content.push_str("\n未提取到任何文字内容");
    } else {
        content.push_str(&sections.join("\n"));
    }
    fs::write(&output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(output = %output.display(), "Merged text file written");
    Ok(summary)
}
