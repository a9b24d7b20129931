mod cache;
mod check;
mod config;
mod dedup;
mod excel;
mod expense;
mod extract;
mod heuristics;
mod imgtext;
mod ocr;
mod orders;
mod procure;
mod scan;
mod summarize;
mod sweep;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ocr::Tesseract;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fapiao", version, about = "发票报销与采购流程工具")]
struct Cli {
    /// Config file path.
    #[arg(long, default_value = "fapiao.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an expense report from a folder of invoice PDFs.
    Expense {
        /// Folder holding the invoice PDFs.
        folder: PathBuf,
    },
    /// Build a procurement request sheet from a product screenshot.
    Procure {
        /// Image of the product listing.
        image: PathBuf,
        /// Output .xlsx path (defaults to YYYYMMDD_采购申请.xlsx).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Query whether an invoice number, PDF or folder is already reimbursed.
    Check {
        /// Folder path, PDF path or bare invoice number.
        input: String,
        /// Input interpretation (defaults to auto-detection).
        #[arg(long, value_enum, default_value = "auto")]
        kind: check::QueryKind,
        /// Rescan the archive and merge new numbers into the cache.
        #[arg(long)]
        refresh: bool,
        /// Discard the cache and rescan the archive from scratch.
        #[arg(long)]
        rebuild: bool,
        /// Print cache statistics.
        #[arg(long)]
        stats: bool,
        /// Export all known numbers and their files to this path.
        #[arg(long)]
        export: Option<PathBuf>,
        /// Also count invoices still sitting in the pending folder.
        #[arg(long)]
        include_pending: bool,
    },
    /// Move already-reimbursed invoices from the pending folder to done/.
    Sweep {
        /// Report what would move without moving anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Move duplicate invoices in the pending folder to duplicates/.
    Dedup {
        /// Report duplicates without moving anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract successful orders from exported shop spreadsheets.
    Orders {
        /// Folder to scan recursively for .xlsx order exports.
        folder: PathBuf,
        /// Output folder for the merged and per-file workbooks.
        #[arg(short, long, default_value = "batch_output")]
        output: PathBuf,
    },
    /// OCR every image in a folder to text files.
    Imgtext {
        /// Folder holding the images.
        folder: PathBuf,
        /// Write one merged file instead of one file per image.
        #[arg(long)]
        merge: bool,
        /// Output path for the merged file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize every PDF in a folder with an LLM.
    Summarize {
        /// Folder to scan recursively for PDFs.
        folder: PathBuf,
        /// Analysis prompt (defaults to a paper-analysis prompt).
        #[arg(short, long)]
        prompt: Option<String>,
        /// Output JSON path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write a Markdown report next to the JSON.
        #[arg(short, long)]
        markdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;
    let ocr = Tesseract::new(cfg.ocr.lang.clone(), cfg.ocr.dpi);

    match cli.command {
        Command::Expense { folder } => expense::run(&folder, &cfg, &ocr)?,
        Command::Procure { image, output } => procure::run(&image, output, &cfg, &ocr)?,
        Command::Check {
            input,
            kind,
            refresh,
            rebuild,
            stats,
            export,
            include_pending,
        } => {
            let opts = check::CheckOptions {
                input,
                kind,
                refresh,
                rebuild,
                stats,
                export,
                include_pending,
            };
            check::run(&opts, &cfg, &ocr)?;
        }
        Command::Sweep { dry_run } => {
            sweep::run(&cfg, &ocr, dry_run)?;
        }
        Command::Dedup { dry_run } => {
            dedup::run(&cfg, &ocr, dry_run)?;
        }
        Command::Orders { folder, output } => orders::run(&folder, &output)?,
        Command::Imgtext {
            folder,
            merge,
            output,
        } => {
            if merge {
                imgtext::run_merged(&folder, output, &ocr)?;
            } else {
                imgtext::run(&folder, &ocr);
            }
        }
        Command::Summarize {
            folder,
            prompt,
            output,
            markdown,
        } => summarize::run(&folder, prompt, output, markdown, &cfg.llm).await?,
    }
    Ok(())
}
