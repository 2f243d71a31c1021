// Dynamic validator
//
// Checks a materialized snapshot: structural markup, referenced local
// assets, a script probe run in an external process, and a small set of
// security patterns. Failing checks become `TestResult.errors`; only a
// broken environment (unreadable workspace, probe that cannot spawn) is an
// error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;

use super::DynamicValidator;
use crate::artifacts::validate_relative_path;
use crate::artifacts::store::list_relative_files;
use crate::config::constants::ENTRY_FILE;
use crate::config::ValidatorConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::forge::TestResult;

const MAX_PROBE_OUTPUT: usize = 500;

static INLINE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// External syntax/runtime check, e.g. `node --check <file>`
#[derive(Debug, Clone)]
pub struct ScriptProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

/// Outcome of probing one script
enum ProbeOutcome {
    Ok,
    Failed(String),
    /// Probe binary not installed
    Unavailable,
}

impl ScriptProbe {
    pub fn new(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    pub fn from_config(config: &ValidatorConfig) -> Option<Self> {
        Self::new(
            &config.probe_command,
            Duration::from_secs(config.probe_timeout_secs),
        )
    }

    async fn run(&self, script: &Path) -> Result<ProbeOutcome> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProbeOutcome::Unavailable)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to spawn probe {}", self.program))
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("Probe {} failed", self.program))?,
            Err(_) => {
                return Ok(ProbeOutcome::Failed(format!(
                    "probe timed out after {:?}",
                    self.timeout
                )))
            }
        };

        if output.status.success() {
            return Ok(ProbeOutcome::Ok);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        Ok(ProbeOutcome::Failed(summarize(&text)))
    }
}

/// Prefer the line naming the error class, else the first non-empty line
fn summarize(output: &str) -> String {
    let line = output
        .lines()
        .find(|l| l.contains("Error"))
        .or_else(|| output.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("script check failed")
        .trim();
    line.chars().take(MAX_PROBE_OUTPUT).collect()
}

pub struct HtmlValidator {
    probe: Option<ScriptProbe>,
}

impl HtmlValidator {
    pub fn new(probe: Option<ScriptProbe>) -> Self {
        Self { probe }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(ScriptProbe::from_config(config))
    }

    async fn run_checks(&self, workspace: &Path) -> Result<TestResult> {
        // Unreadable workspace is an infrastructure failure, not a test failure
        tokio::fs::read_dir(workspace)
            .await
            .with_context(|| format!("Workspace not readable: {}", workspace.display()))?;

        let entry = workspace.join(ENTRY_FILE);
        if !entry.is_file() {
            return Ok(TestResult::fail(vec![format!("Missing {} file", ENTRY_FILE)]));
        }
        let html = tokio::fs::read_to_string(&entry)
            .await
            .with_context(|| format!("Failed to read {}", entry.display()))?;

        let mut errors = structural_errors(&html);

        let page = PageScripts::extract(&html);
        for href in &page.stylesheets {
            if let Some(err) = missing_asset(workspace, href, "stylesheet") {
                errors.push(err);
            }
        }
        let mut local_scripts = Vec::new();
        for src in &page.script_srcs {
            match missing_asset(workspace, src, "script") {
                Some(err) => errors.push(err),
                None => {
                    if let Some(rel) = local_path(src) {
                        local_scripts.push(rel);
                    }
                }
            }
        }

        if let Some(probe) = &self.probe {
            errors.extend(self.probe_scripts(probe, workspace, &local_scripts, &page).await?);
        }

        errors.extend(self.security_errors(workspace, &html).await?);

        Ok(TestResult::from_errors(errors))
    }

    async fn probe_scripts(
        &self,
        probe: &ScriptProbe,
        workspace: &Path,
        local_scripts: &[String],
        page: &PageScripts,
    ) -> Result<Vec<String>> {
        let mut errors = Vec::new();

        for rel in local_scripts {
            match probe.run(&workspace.join(rel)).await? {
                ProbeOutcome::Ok => {}
                ProbeOutcome::Failed(msg) => {
                    errors.push(format!("JavaScript runtime error in {}: {}", rel, msg))
                }
                ProbeOutcome::Unavailable => {
                    tracing::warn!(probe = %probe.program, "Script probe not installed; skipping runtime check");
                    return Ok(errors);
                }
            }
        }

        for (index, inline) in page.inline_scripts.iter().enumerate() {
            let path = inline_script_path(inline.module);
            tokio::fs::write(&path, &inline.code)
                .await
                .with_context(|| format!("Failed to stage inline script {}", path.display()))?;
            let outcome = probe.run(&path).await;
            let _ = tokio::fs::remove_file(&path).await;

            match outcome? {
                ProbeOutcome::Ok => {}
                ProbeOutcome::Failed(msg) => errors.push(format!(
                    "JavaScript runtime error in inline script #{}: {}",
                    index + 1,
                    msg
                )),
                ProbeOutcome::Unavailable => {
                    tracing::warn!(probe = %probe.program, "Script probe not installed; skipping runtime check");
                    return Ok(errors);
                }
            }
        }

        Ok(errors)
    }

    /// `eval(` anywhere, and `innerHTML` unless DOMPurify is in use
    async fn security_errors(&self, workspace: &Path, html: &str) -> Result<Vec<String>> {
        let mut sources = vec![(ENTRY_FILE.to_string(), html.to_string())];
        for rel in list_relative_files(workspace.to_path_buf()).await? {
            if rel.ends_with(".js") || rel.ends_with(".mjs") {
                let code = tokio::fs::read_to_string(workspace.join(&rel))
                    .await
                    .with_context(|| format!("Failed to read {}", rel))?;
                sources.push((rel, code));
            }
        }

        let sanitized = sources.iter().any(|(_, code)| code.contains("DOMPurify"));
        let mut errors = Vec::new();
        for (file, code) in &sources {
            if code.contains("eval(") {
                errors.push(format!("Security risk: eval() usage detected in {}", file));
            }
            if !sanitized && code.contains("innerHTML") {
                errors.push(format!(
                    "Potential XSS risk: innerHTML usage without sanitization in {}",
                    file
                ));
            }
        }
        Ok(errors)
    }
}

#[async_trait]
impl DynamicValidator for HtmlValidator {
    async fn test(&self, workspace: &Path) -> ForgeResult<TestResult> {
        let result = self
            .run_checks(workspace)
            .await
            .map_err(ForgeError::validation)?;
        tracing::info!(
            passed = result.passed,
            errors = result.errors.len(),
            "Validation complete"
        );
        Ok(result)
    }
}

fn structural_errors(html: &str) -> Vec<String> {
    let lower = html.to_ascii_lowercase();
    let mut errors = Vec::new();
    if !lower.contains("<!doctype html>") {
        errors.push("Missing DOCTYPE declaration".to_string());
    }
    if !lower.contains("<html") {
        errors.push("Missing <html> tag".to_string());
    }
    if !lower.contains("<head>") && !lower.contains("<head ") {
        errors.push("Missing <head> tag".to_string());
    }
    if !lower.contains("<body>") && !lower.contains("<body ") {
        errors.push("Missing <body> tag".to_string());
    }
    errors
}

struct InlineScript {
    code: String,
    module: bool,
}

/// Script and stylesheet references pulled out of the entry document
struct PageScripts {
    script_srcs: Vec<String>,
    stylesheets: Vec<String>,
    inline_scripts: Vec<InlineScript>,
}

impl PageScripts {
    fn extract(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut page = PageScripts {
            script_srcs: Vec::new(),
            stylesheets: Vec::new(),
            inline_scripts: Vec::new(),
        };

        if let Ok(selector) = Selector::parse("script") {
            for script in document.select(&selector) {
                let attrs = script.value();
                if let Some(src) = attrs.attr("src") {
                    page.script_srcs.push(src.to_string());
                    continue;
                }
                let kind = attrs.attr("type").unwrap_or("").to_ascii_lowercase();
                let module = kind == "module";
                if !(kind.is_empty() || module || kind.contains("javascript")) {
                    continue;
                }
                let code: String = script.text().collect();
                if !code.trim().is_empty() {
                    page.inline_scripts.push(InlineScript { code, module });
                }
            }
        }

        if let Ok(selector) = Selector::parse(r#"link[rel~="stylesheet"][href]"#) {
            page.stylesheets = document
                .select(&selector)
                .filter_map(|link| link.value().attr("href"))
                .map(str::to_string)
                .collect();
        }

        page
    }
}

/// Workspace-relative path for a local reference; `None` for remote URLs
fn local_path(reference: &str) -> Option<String> {
    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("data:")
    {
        return None;
    }
    let trimmed = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_start_matches("./")
        .trim_start_matches('/');
    Some(trimmed.to_string())
}

fn missing_asset(workspace: &Path, reference: &str, kind: &str) -> Option<String> {
    let rel = local_path(reference)?;
    if validate_relative_path(&rel).is_err() || !workspace.join(&rel).is_file() {
        return Some(format!("Referenced {} not found: {}", kind, reference));
    }
    None
}

fn inline_script_path(module: bool) -> PathBuf {
    let n = INLINE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ext = if module { "mjs" } else { "js" };
    std::env::temp_dir().join(format!("appforge-inline-{}-{}.{}", std::process::id(), n, ext))
}
