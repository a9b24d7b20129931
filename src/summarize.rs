use crate::config::LlmSection;
use crate::extract;
use crate::scan;
use anyhow::{Context, Result, bail};
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Default analysis prompt, aimed at academic papers.
const DEFAULT_PROMPT: &str = "请分析这篇论文，回答以下问题：\n\
1. 这篇论文的主要研究问题是什么？\n\
2. 采用了什么方法或模型？\n\
3. 主要结论和贡献是什么？\n\
请用中文简洁回答。";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// Outcome of one API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub status: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// Per-file entry in the results blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileResult {
    Skipped {
        status: String,
        reason: String,
    },
    Analyzed {
        file_path: String,
        analysis: Analysis,
        text_length: usize,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultsBlob {
    timestamp: String,
    total_files: usize,
    total_tokens_used: u64,
    results: BTreeMap<String, FileResult>,
}

/// Cut `text` to at most `max_chars` characters on a character boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

struct Summarizer {
    client: Client,
    cfg: LlmSection,
    api_key: String,
}

impl Summarizer {
    /// The API key is required up front; a missing env var aborts before
    /// any PDF is touched.
    fn new(cfg: &LlmSection) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("environment variable {} is not set", cfg.api_key_env))?;
        Ok(Self {
            client: Client::new(),
            cfg: cfg.clone(),
            api_key,
        })
    }

    async fn analyze(&self, pdf_name: &str, text: &str, prompt: &str) -> Analysis {
        let request = ChatRequest {
            model: self.cfg.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "你是一个专业的学术论文分析助手，擅长提取论文的关键信息。请用中文回答。"
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("以下是PDF文件《{pdf_name}》的内容：\n\n{text}\n\n{prompt}"),
                },
            ],
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
        };

        match self.send(&request).await {
            Ok((response, tokens)) => Analysis {
                status: "success".to_string(),
                response,
                error: None,
                tokens_used: tokens,
            },
            Err(e) => {
                error!(file = pdf_name, error = %e, "API call failed");
                Analysis {
                    status: "error".to_string(),
                    response: String::new(),
                    error: Some(e.to_string()),
                    tokens_used: None,
                }
            }
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<(String, Option<u64>)> {
        let url = format!("{}/chat/completions", self.cfg.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("API error {status}: {body}");
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .context("empty response from API")?;
        Ok((content, chat.usage.map(|u| u.total_tokens)))
    }
}

/// Write the results blob atomically so an interrupted run never leaves a
/// truncated JSON file behind.
fn save_results(
    path: &Path,
    results: &BTreeMap<String, FileResult>,
    total_tokens: u64,
) -> Result<()> {
    let blob = ResultsBlob {
        timestamp: Local::now().to_rfc3339(),
        total_files: results.len(),
        total_tokens_used: total_tokens,
        results: results.clone(),
    };
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new_in("."),
    }
    .context("failed to create results temp file")?;
    serde_json::to_writer_pretty(&mut tmp, &blob).context("failed to serialize results")?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Analyze every PDF under `folder` with the configured model, saving the
/// results blob after each file. Returns the result map for reporting.
pub async fn run(
    folder: &Path,
    prompt: Option<String>,
    output: Option<PathBuf>,
    markdown: bool,
    cfg: &LlmSection,
) -> Result<()> {
    let summarizer = Summarizer::new(cfg)?;
    let prompt = prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());

    let pdfs = scan::find_pdfs(folder, None);
    if pdfs.is_empty() {
        warn!(path = %folder.display(), "No PDF files found");
        return Ok(());
    }
    let output = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "pdf_analysis_{}.json",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    info!(count = pdfs.len(), model = %cfg.model, output = %output.display(), "Analyzing PDFs");

    let mut results: BTreeMap<String, FileResult> = BTreeMap::new();
    let mut total_tokens: u64 = 0;

    for (idx, pdf) in pdfs.iter().enumerate() {
        let name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let span = tracing::info_span!("summarize", file = %name);
        let _guard = span.enter();
        info!(progress = %format!("{}/{}", idx + 1, pdfs.len()), "Processing");

        let text = extract::direct_text(pdf);
        let text = truncate_chars(&text, cfg.max_chars);
        if text.trim().is_empty() {
            warn!(file = %name, "Skipping file with no extractable text");
            results.insert(
                name,
                FileResult::Skipped {
                    status: "skipped".to_string(),
                    reason: "无法提取文本内容".to_string(),
                },
            );
            save_results(&output, &results, total_tokens)?;
            continue;
        }

        let analysis = summarizer.analyze(&name, text, &prompt).await;
        if let Some(tokens) = analysis.tokens_used {
            total_tokens += tokens;
        }
        results.insert(
            name,
            FileResult::Analyzed {
                file_path: pdf.to_string_lossy().to_string(),
                analysis,
                text_length: text.chars().count(),
            },
        );
        save_results(&output, &results, total_tokens)?;
    }
    info!(total_tokens, output = %output.display(), "Analysis complete");

    if markdown {
        let md_path = output.with_extension("md");
        write_markdown_report(&md_path, &results)?;
        info!(path = %md_path.display(), "Markdown report written");
    }
    Ok(())
}

fn write_markdown_report(path: &Path, results: &BTreeMap<String, FileResult>) -> Result<()> {
    let mut out = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writeln!(out, "# PDF批量分析报告\n")?;
    writeln!(out, "生成时间: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "总计分析: {} 个PDF文件\n", results.len())?;
    writeln!(out, "---\n")?;

    for (idx, (name, result)) in results.iter().enumerate() {
        writeln!(out, "## {}. {name}\n", idx + 1)?;
        match result {
            FileResult::Skipped { reason, .. } => {
                writeln!(out, "**状态**: 跳过\n")?;
                writeln!(out, "**原因**: {reason}\n")?;
            }
            FileResult::Analyzed { analysis, .. } => {
                if analysis.status == "success" {
                    writeln!(out, "**分析结果**:\n")?;
                    writeln!(out, "{}\n", analysis.response)?;
                    writeln!(out, "*Token使用: {}*\n", analysis.tokens_used.unwrap_or(0))?;
                } else {
                    writeln!(
                        out,
                        "**错误**: {}\n",
                        analysis.error.as_deref().unwrap_or("未知错误")
                    )?;
                }
            }
        }
        writeln!(out, "---\n")?;
    }
    Ok(())
}
