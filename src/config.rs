use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

/// Top-level configuration, loaded from a TOML file.
///
/// Every section has defaults so the tool works out of the box; the file
/// exists so none of the workflow paths have to live in the source.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub ocr: OcrSection,
    #[serde(default)]
    pub expense: ExpenseSection,
    #[serde(default)]
    pub procure: ProcureSection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// Filesystem layout of the reimbursement archive.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Root of the tree holding already-reimbursed invoices.
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,
    /// Folder of invoices still waiting to be filed ("tbd").
    #[serde(default = "default_pending_dir")]
    pub pending_dir: PathBuf,
    /// Where the invoice-number cache blob lives.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

fn default_archive_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_pending_dir() -> PathBuf {
    PathBuf::from("tbd")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("invoice_numbers_cache.json")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            archive_root: default_archive_root(),
            pending_dir: default_pending_dir(),
            cache_file: default_cache_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrSection {
    /// Tesseract language spec, e.g. "chi_sim+eng".
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
    /// Render resolution for PDF pages. 144 dpi is 2x the 72 dpi base.
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

fn default_ocr_lang() -> String {
    "chi_sim+eng".to_string()
}

fn default_ocr_dpi() -> u32 {
    144
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            lang: default_ocr_lang(),
            dpi: default_ocr_dpi(),
        }
    }
}

/// Fixed fields and dropdown option lists for the expense template.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseSection {
    #[serde(default)]
    pub project_manager: String,
    #[serde(default = "default_invoice_type")]
    pub invoice_type: String,
    #[serde(default = "default_payment_type")]
    pub payment_type: String,
    #[serde(default = "default_subject_detail")]
    pub subject_detail: String,
    #[serde(default = "default_invoice_type_options")]
    pub invoice_type_options: Vec<String>,
    #[serde(default = "default_payment_type_options")]
    pub payment_type_options: Vec<String>,
    #[serde(default = "default_subject_detail_options")]
    pub subject_detail_options: Vec<String>,
}

fn default_invoice_type() -> String {
    "增值税电子普通发票".to_string()
}

fn default_payment_type() -> String {
    "科研费用".to_string()
}

fn default_subject_detail() -> String {
    "科研耗材".to_string()
}

fn default_invoice_type_options() -> Vec<String> {
    [
        "增值税专用发票",
        "增值税电子普通发票",
        "增值税普通发票",
        "机动车销售统一发票",
        "其他",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_payment_type_options() -> Vec<String> {
    ["科研费用", "办公费用", "差旅费用", "会议费用", "培训费用", "其他"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_subject_detail_options() -> Vec<String> {
    ["科研耗材", "办公用品", "设备采购", "软件服务", "咨询服务", "其他"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ExpenseSection {
    fn default() -> Self {
        Self {
            project_manager: String::new(),
            invoice_type: default_invoice_type(),
            payment_type: default_payment_type(),
            subject_detail: default_subject_detail(),
            invoice_type_options: default_invoice_type_options(),
            payment_type_options: default_payment_type_options(),
            subject_detail_options: default_subject_detail_options(),
        }
    }
}

/// Fixed fields and dropdown option lists for the procurement template.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcureSection {
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_procurement_type")]
    pub procurement_type: String,
    #[serde(default = "default_secondary_category")]
    pub secondary_category: String,
    #[serde(default = "default_procurement_type_options")]
    pub procurement_type_options: Vec<String>,
    #[serde(default = "default_secondary_category_options")]
    pub secondary_category_options: Vec<String>,
}

fn default_procurement_type() -> String {
    "科研设备".to_string()
}

fn default_secondary_category() -> String {
    "科研耗材".to_string()
}

fn default_procurement_type_options() -> Vec<String> {
    ["科研设备", "办公设备", "耗材用品", "软件许可", "服务外包", "其他"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_secondary_category_options() -> Vec<String> {
    default_subject_detail_options()
}

impl Default for ProcureSection {
    fn default() -> Self {
        Self {
            department: String::new(),
            procurement_type: default_procurement_type(),
            secondary_category: default_secondary_category(),
            procurement_type_options: default_procurement_type_options(),
            secondary_category_options: default_secondary_category_options(),
        }
    }
}

/// How many of a document's extracted invoice numbers must already be
/// known before the document counts as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// One shared number is enough. Tolerant of partial OCR failure but
    /// can false-positive on short shared substrings.
    #[default]
    Any,
    /// Every extracted number must be known.
    All,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DedupSection {
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

/// OpenAI-compatible chat-completions endpoint for the PDF summarizer.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    /// Truncate extracted text beyond this many characters before sending.
    #[serde(default = "default_llm_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_llm_model() -> String {
    "Qwen/Qwen2.5-7B-Instruct".to_string()
}

fn default_llm_api_key_env() -> String {
    "SILICONFLOW_API_KEY".to_string()
}

fn default_llm_max_chars() -> usize {
    12_000
}

fn default_llm_temperature() -> f64 {
    0.3
}

fn default_llm_max_tokens() -> u32 {
    2000
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            max_chars: default_llm_max_chars(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("definitely/not/here.toml").unwrap();
        assert_eq!(cfg.ocr.lang, "chi_sim+eng");
        assert_eq!(cfg.dedup.match_policy, MatchPolicy::Any);
        assert_eq!(cfg.llm.max_chars, 12_000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let toml = r#"
            [paths]
            archive_root = "/data/invoices"

            [dedup]
            match_policy = "all"
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.paths.archive_root, PathBuf::from("/data/invoices"));
        assert_eq!(cfg.paths.pending_dir, PathBuf::from("tbd"));
        assert_eq!(cfg.dedup.match_policy, MatchPolicy::All);
        assert_eq!(cfg.expense.invoice_type, "增值税电子普通发票");
        assert_eq!(cfg.expense.payment_type_options.len(), 6);
    }
}
