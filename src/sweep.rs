use crate::cache::InvoiceCache;
use crate::config::Config;
use crate::extract;
use crate::heuristics::extract_all_invoice_numbers;
use crate::ocr::OcrEngine;
use crate::scan;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct SweepReport {
    pub total_files: usize,
    pub reimbursed: usize,
    pub not_reimbursed: usize,
    pub moved: Vec<String>,
    pub errors: Vec<String>,
}

/// Move already-reimbursed invoices out of the pending folder into
/// `pending/done/`. Reimbursed means the extracted numbers match the
/// archive cache under the configured policy (pending files themselves
/// excluded from the cache).
pub fn run(cfg: &Config, ocr: &dyn OcrEngine, dry_run: bool) -> Result<SweepReport> {
    let pending = &cfg.paths.pending_dir;
    let done = pending.join("done");

    info!(path = %pending.display(), "Checking pending invoices");
    let archive_pdfs = scan::find_pdfs(&cfg.paths.archive_root, Some(pending));
    let cache = InvoiceCache::refresh(&cfg.paths.cache_file, &archive_pdfs, false, |pdf| {
        let text = extract::document_text(pdf, ocr);
        extract_all_invoice_numbers(&text)
    })?;

    let pending_pdfs = scan::find_pdfs_shallow(pending);
    let mut report = SweepReport {
        total_files: pending_pdfs.len(),
        ..SweepReport::default()
    };
    if pending_pdfs.is_empty() {
        info!("No pending PDF files");
        return Ok(report);
    }
    info!(count = pending_pdfs.len(), "Pending PDF files to check");

    for pdf in &pending_pdfs {
        let text = extract::document_text(pdf, ocr);
        let numbers = extract_all_invoice_numbers(&text);
        if numbers.is_empty() {
            warn!(file = %pdf.display(), "No invoice numbers found");
            continue;
        }

        if !cache.is_duplicate(&numbers, cfg.dedup.match_policy) {
            report.not_reimbursed += 1;
            continue;
        }
        let known: Vec<&String> = numbers.iter().filter(|n| cache.contains(n)).collect();
        report.reimbursed += 1;
        info!(file = %pdf.display(), numbers = ?known, "Invoice already reimbursed");

        if dry_run {
            report.moved.push(pdf.to_string_lossy().to_string());
            continue;
        }
        match move_to_done(pdf, &done, &known) {
            Ok(()) => report.moved.push(pdf.to_string_lossy().to_string()),
            Err(e) => {
                error!(file = %pdf.display(), error = %e, "Move failed");
                report.errors.push(format!("{}: {e}", pdf.display()));
            }
        }
    }

    info!(
        total = report.total_files,
        reimbursed = report.reimbursed,
        moved = report.moved.len(),
        dry_run,
        "Sweep complete"
    );
    Ok(report)
}

fn move_to_done(pdf: &Path, done: &Path, numbers: &[&String]) -> Result<()> {
    fs::create_dir_all(done)
        .with_context(|| format!("failed to create {}", done.display()))?;
    let name = pdf
        .file_name()
        .context("pending file has no name")?
        .to_string_lossy()
        .to_string();
    let target = done.join(&name);
    if target.exists() {
        anyhow::bail!("target already exists: {}", target.display());
    }
    fs::rename(pdf, &target)
        .with_context(|| format!("failed to move {name} to done/"))?;

    // Leave a note of where the file came from and why it moved.
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());
    let mut note = fs::File::create(done.join(format!("{stem}_info.txt")))?;
    writeln!(note, "原文件路径: {}", pdf.display())?;
    writeln!(
        note,
        "已报销的发票号码: {}",
        numbers.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
    )?;
    writeln!(note, "移动时间: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::StubOcr;

    fn config_for(root: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.paths.archive_root = root.to_path_buf();
        cfg.paths.pending_dir = root.join("tbd");
        cfg.paths.cache_file = root.join("cache.json");
        cfg
    }

    #[test]
    fn reimbursed_pending_invoice_moves_to_done() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2025")).unwrap();
        fs::create_dir_all(root.join("tbd")).unwrap();
        fs::write(root.join("2025/paid.pdf"), b"x").unwrap();
        fs::write(root.join("tbd/copy.pdf"), b"x").unwrap();

        // Garbage PDFs mean every file OCRs to the same invoice number.
        let ocr = StubOcr::returning("发票号码：12345678");
        let cfg = config_for(root);

        let report = run(&cfg, &ocr, false).unwrap();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.reimbursed, 1);
        assert_eq!(report.moved.len(), 1);
        assert!(root.join("tbd/done/copy.pdf").exists());
        assert!(root.join("tbd/done/copy_info.txt").exists());
        assert!(!root.join("tbd/copy.pdf").exists());
    }

    #[test]
    fn dry_run_reports_but_leaves_files_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2025")).unwrap();
        fs::create_dir_all(root.join("tbd")).unwrap();
        fs::write(root.join("2025/paid.pdf"), b"x").unwrap();
        fs::write(root.join("tbd/copy.pdf"), b"x").unwrap();

        let ocr = StubOcr::returning("发票号码：12345678");
        let cfg = config_for(root);

        let report = run(&cfg, &ocr, true).unwrap();
        assert_eq!(report.moved.len(), 1);
        assert!(root.join("tbd/copy.pdf").exists());
        assert!(!root.join("tbd/done").exists());
    }

    #[test]
    fn all_policy_requires_every_number_to_be_known() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tbd")).unwrap();
        fs::write(root.join("tbd/mixed.pdf"), b"x").unwrap();

        let mut cfg = config_for(root);
        cfg.dedup.match_policy = crate::config::MatchPolicy::All;

        // Only one of the document's two numbers is in the archive.
        let mut cache = InvoiceCache::default();
        cache.insert("11112222", Path::new("/archive/a.pdf"));
        cache.save(&cfg.paths.cache_file).unwrap();

        let ocr = StubOcr::returning("发票号码:11112222 No. 33334444");
        let report = run(&cfg, &ocr, false).unwrap();
        assert_eq!(report.not_reimbursed, 1);
        assert!(root.join("tbd/mixed.pdf").exists());

        // The default any-match rule moves the same file.
        cfg.dedup.match_policy = crate::config::MatchPolicy::Any;
        let report = run(&cfg, &ocr, false).unwrap();
        assert_eq!(report.reimbursed, 1);
        assert!(root.join("tbd/done/mixed.pdf").exists());
    }

    #[test]
    fn unknown_numbers_stay_pending() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tbd")).unwrap();
        fs::write(root.join("tbd/new.pdf"), b"x").unwrap();

        let ocr = StubOcr::returning("发票号码：99998888");
        let cfg = config_for(root);

        let report = run(&cfg, &ocr, false).unwrap();
        assert_eq!(report.not_reimbursed, 1);
        assert!(root.join("tbd/new.pdf").exists());
    }
}
