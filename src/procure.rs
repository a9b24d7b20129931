use crate::config::Config;
use crate::excel;
use crate::heuristics::{ProcurementItem, extract_procurement_item};
use crate::ocr::OcrEngine;
use anyhow::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// OCR a product screenshot and write a procurement request sheet for it.
/// A missing or unreadable image still produces a sheet with empty fields,
/// ready to be filled in by hand.
pub fn run(
    image: &Path,
    output: Option<PathBuf>,
    cfg: &Config,
    ocr: &dyn OcrEngine,
) -> Result<()> {
    let item = if !image.exists() {
        warn!(path = %image.display(), "Image not found, using empty defaults");
        blank_item()
    } else {
        match ocr.ocr_image(image) {
            Ok(text) => {
                let item = extract_procurement_item(&text);
                info!(
                    name = %item.name,
                    price = item.unit_price,
                    quantity = item.quantity,
                    total = item.total_amount,
                    "Parsed procurement item"
                );
                item
            }
            Err(e) => {
                warn!(path = %image.display(), error = %e, "OCR failed, using empty defaults");
                blank_item()
            }
        }
    };

    let output = output
        .unwrap_or_else(|| PathBuf::from(format!("{}_采购申请.xlsx", Local::now().format("%Y%m%d"))));
    excel::write_procurement_workbook(
        &output,
        &item,
        &cfg.expense.project_manager,
        &cfg.procure,
    )?;
    Ok(())
}

fn blank_item() -> ProcurementItem {
    ProcurementItem {
        quantity: 0,
        ..ProcurementItem::default()
    }
}
