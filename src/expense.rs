use crate::config::Config;
use crate::excel;
use crate::extract;
use crate::heuristics::{extract_expense_fields, validate_amount};
use crate::ocr::OcrEngine;
use crate::scan;
use anyhow::Result;
use chrono::Local;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

/// One row of the expense report.
#[derive(Debug, Clone)]
pub struct ExpenseRecord {
    pub payment_reason: String,
    pub project_manager: String,
    pub invoice_type: String,
    pub invoice_number: String,
    pub payment_type: String,
    pub subject_detail: String,
    pub amount: String,
    /// Problems found during extraction. Logged and kept on the record,
    /// never written to the sheet and never fatal.
    pub remarks: String,
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Extract one record per PDF directly inside `folder`. Duplicate invoice
/// numbers within the run and implausible amounts are noted in remarks;
/// unreadable files still produce a placeholder row to hand-fill.
pub fn process_folder(folder: &Path, cfg: &Config, ocr: &dyn OcrEngine) -> Vec<ExpenseRecord> {
    let pdfs = scan::find_pdfs_shallow(folder);
    if pdfs.is_empty() {
        warn!(path = %folder.display(), "No PDF files found");
        return Vec::new();
    }
    info!(count = pdfs.len(), "Found PDF files");

    let exp = &cfg.expense;
    let mut seen_numbers: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for pdf in &pdfs {
        info!(file = %pdf.display(), "Processing invoice");
        let text = extract::document_text(pdf, ocr);

        if text.trim().is_empty() {
            error!(file = %pdf.display(), "Could not extract any text");
            records.push(ExpenseRecord {
                payment_reason: file_stem(pdf),
                project_manager: exp.project_manager.clone(),
                invoice_type: exp.invoice_type.clone(),
                invoice_number: "识别失败".to_string(),
                payment_type: exp.payment_type.clone(),
                subject_detail: exp.subject_detail.clone(),
                amount: "0.00".to_string(),
                remarks: "OCR识别失败，请手动填写".to_string(),
            });
            continue;
        }

        let fields = extract_expense_fields(&text);
        let mut remarks = String::new();

        if !fields.invoice_number.is_empty() {
            if !seen_numbers.insert(fields.invoice_number.clone()) {
                warn!(
                    number = %fields.invoice_number,
                    file = %pdf.display(),
                    "Duplicate invoice number in this batch"
                );
                remarks.push_str(&format!("重复发票号码: {}; ", fields.invoice_number));
            }
        }

        let (amount_ok, message) = validate_amount(&fields.amount);
        if !amount_ok {
            warn!(file = %pdf.display(), message = %message, "Amount validation failed");
            remarks.push_str(&format!("金额验证: {message}; "));
        }

        info!(file = %pdf.display(), amount = %fields.amount, "Processed invoice");
        records.push(ExpenseRecord {
            payment_reason: file_stem(pdf),
            project_manager: exp.project_manager.clone(),
            invoice_type: exp.invoice_type.clone(),
            invoice_number: fields.invoice_number,
            payment_type: exp.payment_type.clone(),
            subject_detail: exp.subject_detail.clone(),
            amount: fields.amount,
            remarks,
        });
    }
    records
}

/// Process a folder of invoices and write the dated expense report into it.
/// An empty folder writes nothing.
pub fn run(folder: &Path, cfg: &Config, ocr: &dyn OcrEngine) -> Result<()> {
    let records = process_folder(folder, cfg, ocr);
    if records.is_empty() {
        warn!("Nothing to write");
        return Ok(());
    }

    let output = folder.join(format!("{}_报销.xlsx", Local::now().format("%Y%m%d")));
    excel::write_expense_workbook(&output, &records, &cfg.expense)?;

    let total: f64 = records
        .iter()
        .filter_map(|r| r.amount.parse::<f64>().ok())
        .sum();
    info!(
        invoices = records.len(),
        total_amount = %format!("{total:.2}"),
        output = %output.display(),
        "Expense report complete"
    );

    let flagged: Vec<&ExpenseRecord> = records.iter().filter(|r| !r.remarks.is_empty()).collect();
    if !flagged.is_empty() {
        warn!(count = flagged.len(), "Records need manual review");
        for record in flagged {
            warn!(reason = %record.payment_reason, remarks = %record.remarks, "Review needed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::StubOcr;
    use std::fs;

    #[test]
    fn empty_folder_produces_no_records_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let ocr = StubOcr::returning("");

        run(dir.path(), &cfg, &ocr).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn unreadable_pdf_yields_placeholder_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("出租车发票.pdf"), b"not really a pdf").unwrap();
        let cfg = Config::default();
        let ocr = StubOcr::returning("");

        let records = process_folder(dir.path(), &cfg, &ocr);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payment_reason, "出租车发票");
        assert_eq!(records[0].invoice_number, "识别失败");
        assert_eq!(records[0].amount, "0.00");
        assert!(records[0].remarks.contains("OCR识别失败"));
    }

    #[test]
    fn duplicate_numbers_within_a_run_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        let cfg = Config::default();
        // Both garbage PDFs fall through to OCR, which returns the same text.
        let ocr = StubOcr::returning("发票号码：12345678\n小写：￥88.00");

        let records = process_folder(dir.path(), &cfg, &ocr);
        assert_eq!(records.len(), 2);
        assert!(records[0].remarks.is_empty());
        assert!(records[1].remarks.contains("重复发票号码: 12345678"));
    }
}
