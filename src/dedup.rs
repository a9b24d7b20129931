use crate::config::Config;
use crate::extract;
use crate::heuristics::extract_all_invoice_numbers;
use crate::ocr::OcrEngine;
use crate::scan;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct DedupReport {
    pub total_files: usize,
    pub files_with_numbers: usize,
    pub no_number_files: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub moved: Vec<PathBuf>,
    pub errors: Vec<String>,
}

fn sha256_of(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn mtime_of(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Find duplicate invoices in the pending folder and move the extras into
/// `pending/duplicates/`. Two files are duplicates when they share an
/// invoice number or are byte-identical; within a group the newest file is
/// kept. `dry_run` reports without moving anything.
pub fn run(cfg: &Config, ocr: &dyn OcrEngine, dry_run: bool) -> Result<DedupReport> {
    let pending = &cfg.paths.pending_dir;
    let duplicates_dir = pending.join("duplicates");
    let pdfs = scan::find_pdfs_shallow(pending);

    let mut report = DedupReport {
        total_files: pdfs.len(),
        ..DedupReport::default()
    };
    if pdfs.is_empty() {
        info!(path = %pending.display(), "No pending PDF files");
        return Ok(report);
    }
    info!(count = pdfs.len(), "Scanning pending folder for duplicates");

    let mut number_groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut hash_groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for pdf in &pdfs {
        match sha256_of(pdf) {
            Ok(hash) => hash_groups.entry(hash).or_default().push(pdf.clone()),
            Err(e) => {
                error!(file = %pdf.display(), error = %e, "Hashing failed");
                report.errors.push(format!("{}: {e}", pdf.display()));
                continue;
            }
        }

        let text = extract::document_text(pdf, ocr);
        let numbers = extract_all_invoice_numbers(&text);
        if numbers.is_empty() {
            warn!(file = %pdf.display(), "No invoice numbers found");
            report.no_number_files.push(pdf.clone());
            continue;
        }
        report.files_with_numbers += 1;
        for number in numbers {
            number_groups.entry(number).or_default().push(pdf.clone());
        }
    }

    // Shared invoice numbers first. Newest file stays, the rest move as
    // {number}_{name}.
    for (number, mut files) in number_groups {
        // A file carrying several numbers sits in several groups; once an
        // earlier group moved it, later groups must not touch it again.
        files.retain(|p| p.exists());
        if files.len() < 2 {
            continue;
        }
        files.sort_by_key(|p| std::cmp::Reverse(mtime_of(p)));
        info!(number = %number, count = files.len(), "Duplicate invoice number group");

        let keep = files[0].clone();
        info!(file = %keep.display(), "Keeping newest copy");
        report.kept.push(keep);

        for file in &files[1..] {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let target = duplicates_dir.join(format!("{number}_{name}"));
            move_duplicate(file, &target, dry_run, &mut report);
        }
    }

    // Byte-identical files that escaped the number pass (scans with no
    // detectable number, or copies already moved above and gone by now).
    for (_, files) in hash_groups {
        let files: Vec<PathBuf> = files.into_iter().filter(|p| p.exists()).collect();
        if files.len() < 2 {
            continue;
        }
        let keep = files[0].clone();
        info!(file = %keep.display(), "Keeping first of identical copies");
        report.kept.push(keep);

        for (i, file) in files[1..].iter().enumerate() {
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let target = duplicates_dir.join(format!("{stem}_duplicate_{}.pdf", i + 1));
            move_duplicate(file, &target, dry_run, &mut report);
        }
    }

    info!(
        total = report.total_files,
        moved = report.moved.len(),
        errors = report.errors.len(),
        dry_run,
        "Deduplication complete"
    );
    Ok(report)
}

fn move_duplicate(file: &Path, target: &Path, dry_run: bool, report: &mut DedupReport) {
    if dry_run {
        info!(from = %file.display(), to = %target.display(), "Would move duplicate");
        report.moved.push(file.to_path_buf());
        return;
    }
    let result = target
        .parent()
        .map(fs::create_dir_all)
        .transpose()
        .map_err(anyhow::Error::from)
        .and_then(|_| {
            if target.exists() {
                anyhow::bail!("target already exists: {}", target.display());
            }
            fs::rename(file, target).map_err(anyhow::Error::from)
        });
    match result {
        Ok(()) => {
            info!(from = %file.display(), to = %target.display(), "Moved duplicate");
            report.moved.push(file.to_path_buf());
        }
        Err(e) => {
            error!(file = %file.display(), error = %e, "Move failed");
            report.errors.push(format!("{}: {e}", file.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::StubOcr;

    fn config_for(root: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.paths.pending_dir = root.to_path_buf();
        cfg
    }

    #[test]
    fn shared_invoice_number_keeps_newest_copy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("old.pdf"), b"scan one").unwrap();
        // Distinct mtimes so the newest-wins rule has something to order.
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(root.join("new.pdf"), b"scan two").unwrap();

        let ocr = StubOcr::returning("发票号码：12345678");
        let report = run(&config_for(root), &ocr, false).unwrap();

        assert!(root.join("new.pdf").exists());
        assert!(!root.join("old.pdf").exists());
        assert!(root.join("duplicates/12345678_old.pdf").exists());
        assert_eq!(report.moved.len(), 1);
    }

    #[test]
    fn identical_bytes_without_numbers_are_still_caught() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.pdf"), b"same bytes").unwrap();
        fs::write(root.join("b.pdf"), b"same bytes").unwrap();

        let ocr = StubOcr::returning("no digits here");
        let report = run(&config_for(root), &ocr, false).unwrap();

        let survivors: Vec<bool> =
            vec![root.join("a.pdf").exists(), root.join("b.pdf").exists()];
        assert_eq!(survivors.iter().filter(|v| **v).count(), 1);
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.no_number_files.len(), 2);
    }

    #[test]
    fn file_in_several_number_groups_moves_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.pdf"), b"scan one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(root.join("b.pdf"), b"scan two").unwrap();

        // Both documents carry the same two invoice numbers, so the pair
        // lands in two groups.
        let ocr = StubOcr::returning("发票号码:11112222 No. 33334444");
        let report = run(&config_for(root), &ocr, false).unwrap();

        assert_eq!(report.moved.len(), 1);
        assert!(report.errors.is_empty());
        let in_duplicates = fs::read_dir(root.join("duplicates")).unwrap().count();
        assert_eq!(in_duplicates, 1);
    }

    #[test]
    fn dry_run_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.pdf"), b"one").unwrap();
        fs::write(root.join("b.pdf"), b"two").unwrap();

        let ocr = StubOcr::returning("发票号码：12345678");
        let report = run(&config_for(root), &ocr, true).unwrap();

        assert!(root.join("a.pdf").exists());
        assert!(root.join("b.pdf").exists());
        assert!(!root.join("duplicates").exists());
        assert_eq!(report.moved.len(), 1);
    }

    #[test]
    fn unique_invoices_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.pdf"), b"one").unwrap();

        let ocr = StubOcr::returning("发票号码：12345678");
        let report = run(&config_for(root), &ocr, false).unwrap();

        assert!(root.join("a.pdf").exists());
        assert!(report.moved.is_empty());
    }
}
