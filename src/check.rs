use crate::cache::InvoiceCache;
use crate::config::Config;
use crate::extract;
use crate::heuristics::extract_all_invoice_numbers;
use crate::ocr::OcrEngine;
use crate::scan;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    /// Detect from the input: existing PDF, existing folder, else number.
    Auto,
    Folder,
    File,
    Number,
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub input: String,
    pub kind: QueryKind,
    pub refresh: bool,
    pub rebuild: bool,
    pub stats: bool,
    pub export: Option<PathBuf>,
    pub include_pending: bool,
}

fn resolve_kind(input: &str, kind: QueryKind) -> QueryKind {
    if kind != QueryKind::Auto {
        return kind;
    }
    let path = Path::new(input);
    if path.is_file() && path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf")) {
        QueryKind::File
    } else if path.is_dir() {
        QueryKind::Folder
    } else {
        QueryKind::Number
    }
}

fn numbers_from_pdf(path: &Path, ocr: &dyn OcrEngine) -> Vec<String> {
    let text = extract::document_text(path, ocr);
    extract_all_invoice_numbers(&text)
}

/// Answer a query against the archive cache: is this number (or everything
/// in this file or folder) already reimbursed?
pub fn run(opts: &CheckOptions, cfg: &Config, ocr: &dyn OcrEngine) -> Result<()> {
    // The cache covers the full tree, pending included; queries filter the
    // pending entries out at answer time. A loaded cache is trusted unless
    // a rescan is requested.
    let loaded = InvoiceCache::load(&cfg.paths.cache_file);
    let cache = if loaded.numbers.is_empty() || opts.refresh || opts.rebuild {
        let pdfs = scan::find_pdfs(&cfg.paths.archive_root, None);
        info!(count = pdfs.len(), "Scanning archive for invoice numbers");
        InvoiceCache::refresh(&cfg.paths.cache_file, &pdfs, opts.rebuild, |pdf| {
            numbers_from_pdf(pdf, ocr)
        })?
    } else {
        loaded
    };

    if opts.stats {
        println!("\n=== 统计信息 ===");
        println!("总发票号码数量: {}", cache.numbers.len());
        println!("包含发票的文件数量: {}", cache.files.len());
        println!("扫描路径: {}", cfg.paths.archive_root.display());
        println!("排除路径: {}", cfg.paths.pending_dir.display());
        println!("缓存文件: {}", cfg.paths.cache_file.display());
        println!();
    }

    if let Some(export) = &opts.export {
        export_numbers(&cache, export)?;
        println!("发票号码已导出到: {}", export.display());
    }

    match resolve_kind(&opts.input, opts.kind) {
        QueryKind::Number => query_number(&cache, &opts.input, cfg, opts.include_pending),
        QueryKind::File => query_file(&cache, Path::new(&opts.input), ocr),
        QueryKind::Folder | QueryKind::Auto => query_folder(Path::new(&opts.input), ocr),
    }
    Ok(())
}

fn export_numbers(cache: &InvoiceCache, path: &Path) -> Result<()> {
    let mut out = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (number, files) in &cache.files {
        writeln!(out, "{number}: {} files", files.len())?;
        for file in files {
            writeln!(out, "  - {file}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn query_number(cache: &InvoiceCache, number: &str, cfg: &Config, include_pending: bool) {
    let files = cache.files_for(number, &cfg.paths.pending_dir, include_pending);
    println!("\n=== 发票号码查询结果 ===");
    println!("发票号码: {number}");
    println!("是否已报销: {}", if files.is_empty() { "否" } else { "是" });
    println!(
        "查询范围: {}",
        if include_pending { "包含待处理发票" } else { "仅已报销发票" }
    );
    if !files.is_empty() {
        println!("出现次数: {}", files.len());
        println!("相关文件:");
        for file in files {
            println!("  - {file}");
        }
    }
}

fn query_file(cache: &InvoiceCache, path: &Path, ocr: &dyn OcrEngine) {
    println!("\n=== PDF文件查询结果 ===");
    println!("文件: {}", path.display());
    if !path.exists() {
        println!("错误: 文件不存在");
        return;
    }
    let numbers = numbers_from_pdf(path, ocr);
    println!("发票号码数量: {}", numbers.len());
    for line in describe_file_numbers(cache, &numbers) {
        println!("{line}");
    }
}

/// One line per extracted number with its archive hit count, so the caller
/// can see at a glance whether the document is already reimbursed.
fn describe_file_numbers(cache: &InvoiceCache, numbers: &[String]) -> Vec<String> {
    numbers
        .iter()
        .map(|number| {
            let hits = cache.files.get(number).map_or(0, |files| files.len());
            format!("  - {number} (在 {hits} 个文件中)")
        })
        .collect()
}

fn query_folder(folder: &Path, ocr: &dyn OcrEngine) {
    println!("\n=== 文件夹查询结果 ===");
    println!("文件夹: {}", folder.display());
    let pdfs = scan::find_pdfs(folder, None);
    println!("PDF文件数量: {}", pdfs.len());

    let mut all_numbers: BTreeSet<String> = BTreeSet::new();
    for pdf in &pdfs {
        let numbers = numbers_from_pdf(pdf, ocr);
        if !numbers.is_empty() {
            println!("{}:", pdf.display());
            for number in &numbers {
                println!("  - {number}");
            }
            all_numbers.extend(numbers);
        }
    }
    println!("不同发票号码总数: {}", all_numbers.len());
}
