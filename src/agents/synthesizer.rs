// LLM-backed code synthesizer
//
// Asks the provider for a JSON object of complete files, validates it into a
// `FileSnapshot`, and re-applies the namespace bootstrap after every call so
// a fix can never drop the persistence wiring.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::prompts::{fix_user_prompt, generate_system_prompt, FIX_SYSTEM_PROMPT};
use super::CodeSynthesizer;
use crate::artifacts::{FileSnapshot, SnapshotFile};
use crate::config::constants::{DEFAULT_MAX_TOKENS, ENTRY_FILE};
use crate::config::PersistenceConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::forge::{Issue, NamespaceContext};
use crate::providers::{parse_json_object, LlmProvider, Message, ProviderRequest};

/// Marks an injected bootstrap block; its presence makes injection a no-op
const BOOTSTRAP_MARKER: &str = "<!-- appforge:namespace -->";

const GENERATE_TEMPERATURE: f32 = 0.7;
const FIX_TEMPERATURE: f32 = 0.3;

pub struct LlmSynthesizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    max_tokens: u32,
    sdk_scripts: Vec<String>,
    init_snippet: String,
}

impl LlmSynthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let persistence = PersistenceConfig::default();
        Self {
            provider,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            sdk_scripts: persistence.sdk_scripts,
            init_snippet: persistence.init_snippet,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// SDK scripts and init code written into the bootstrap block
    pub fn with_persistence(mut self, persistence: &PersistenceConfig) -> Self {
        self.sdk_scripts = persistence.sdk_scripts.clone();
        self.init_snippet = persistence.init_snippet.clone();
        self
    }

    fn request(&self, system: String, user: String, temperature: f32) -> ProviderRequest {
        let mut request = ProviderRequest::new(vec![Message::user(user)])
            .with_system(system)
            .with_max_tokens(self.max_tokens)
            .with_temperature(temperature)
            .with_json_mode();
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        request
    }

    async fn synthesize(
        &self,
        request: ProviderRequest,
        namespace: Option<&NamespaceContext>,
    ) -> Result<FileSnapshot> {
        let response = self.provider.send_message(&request).await?;
        let snapshot = parse_snapshot(&response.text).with_context(|| {
            if response.was_truncated() {
                "Generator output was truncated (max_tokens reached)"
            } else {
                "Generator returned an invalid file set"
            }
        })?;

        Ok(match namespace {
            Some(ctx) => inject_namespace(&snapshot, ctx, &self.sdk_scripts, &self.init_snippet),
            None => snapshot,
        })
    }
}

#[async_trait]
impl CodeSynthesizer for LlmSynthesizer {
    async fn generate(
        &self,
        task: &str,
        namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        tracing::info!(provider = self.provider.name(), "Generating application");
        let request = self.request(
            generate_system_prompt(namespace),
            task.to_string(),
            GENERATE_TEMPERATURE,
        );
        self.synthesize(request, namespace)
            .await
            .map_err(ForgeError::synthesis)
    }

    async fn fix(
        &self,
        current: &FileSnapshot,
        blocking: &[Issue],
        test_errors: &[String],
        namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        tracing::info!(
            blocking = blocking.len(),
            errors = test_errors.len(),
            "Requesting fix"
        );
        let request = self.request(
            FIX_SYSTEM_PROMPT.to_string(),
            fix_user_prompt(current, blocking, test_errors),
            FIX_TEMPERATURE,
        );
        self.synthesize(request, namespace)
            .await
            .map_err(ForgeError::synthesis)
    }
}

// Raw generator output. Missing fields are tolerated here and rejected by
// `parse_snapshot`.
#[derive(Debug, Deserialize)]
struct RawSynthesis {
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    #[serde(default)]
    content: String,
}

/// Validate generator JSON into a snapshot: at least one file, unique safe
/// paths, and the entry document present.
pub(crate) fn parse_snapshot(text: &str) -> Result<FileSnapshot> {
    let raw: RawSynthesis = parse_json_object(text)?;
    if raw.files.is_empty() {
        bail!("Generator returned no files");
    }

    let files = raw
        .files
        .into_iter()
        .map(|f| {
            let path = f.path.trim();
            let path = path.strip_prefix("./").unwrap_or(path);
            SnapshotFile::new(path, f.content)
        })
        .collect();
    let snapshot = FileSnapshot::new(files)?;

    if snapshot.entry().is_none() {
        bail!("Generator output is missing {}", ENTRY_FILE);
    }
    if let Some(description) = raw.description.filter(|d| !d.is_empty()) {
        tracing::debug!(files = snapshot.len(), "Generated: {}", description);
    }
    Ok(snapshot)
}

/// Insert the namespace bootstrap before `</body>` of every HTML file.
///
/// Files that already carry the bootstrap are left untouched.
pub fn inject_namespace(
    snapshot: &FileSnapshot,
    ctx: &NamespaceContext,
    sdk_scripts: &[String],
    init_snippet: &str,
) -> FileSnapshot {
    let block = bootstrap_block(ctx, sdk_scripts, init_snippet);
    snapshot.map_contents(|file| {
        if !file.path.ends_with(".html") || file.content.contains(BOOTSTRAP_MARKER) {
            return file.content.clone();
        }
        match file.content.rfind("</body>") {
            Some(pos) => {
                let mut content = file.content.clone();
                content.insert_str(pos, &block);
                content
            }
            None => format!("{}{}", file.content, block),
        }
    })
}

fn bootstrap_block(ctx: &NamespaceContext, sdk_scripts: &[String], init_snippet: &str) -> String {
    let config = serde_json::to_string_pretty(&ctx.config).unwrap_or_else(|_| "{}".to_string());
    let namespace =
        serde_json::to_string(&ctx.namespace).unwrap_or_else(|_| "\"\"".to_string());

    let mut block = format!("    {}\n", BOOTSTRAP_MARKER);
    for src in sdk_scripts {
        block.push_str(&format!("    <script src=\"{}\"></script>\n", src));
    }
    block.push_str("    <script>\n");
    block.push_str(&format!("        const APP_CONFIG = {};\n", config));
    block.push_str(&format!("        const PROJECT_NAMESPACE = {};\n", namespace));
    for line in init_snippet.lines() {
        block.push_str("        ");
        block.push_str(line);
        block.push('\n');
    }
    block.push_str("    </script>\n");
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderResponse;
    use std::sync::Mutex;

    /// Replays canned responses and records requests
    struct CannedProvider {
        responses: Mutex<Vec<String>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl CannedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .context("no canned response left")?;
            Ok(ProviderResponse {
                id: "r".into(),
                model: "m".into(),
                text,
                stop_reason: Some("stop".into()),
                provider: "canned".into(),
            })
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn default_model(&self) -> &str {
            "m"
        }
    }

    const APP: &str = r#"{"files":[{"path":"index.html","content":"<!DOCTYPE html><html><head></head><body><h1>Todo</h1></body></html>"},{"path":"./app.js","content":"console.log(1)"}],"description":"todo"}"#;

    fn namespace() -> NamespaceContext {
        let mut config = serde_json::Map::new();
        config.insert("projectId".into(), serde_json::json!("demo"));
        NamespaceContext {
            namespace: "projects/42".into(),
            config,
        }
    }

    #[test]
    fn test_parse_snapshot_normalizes_paths() {
        let snapshot = parse_snapshot(APP).unwrap();
        assert_eq!(snapshot.paths().collect::<Vec<_>>(), vec!["index.html", "app.js"]);
    }

    #[test]
    fn test_parse_snapshot_requires_entry() {
        let err = parse_snapshot(r#"{"files":[{"path":"app.js","content":""}]}"#).unwrap_err();
        assert!(err.to_string().contains("index.html"));
        assert!(parse_snapshot(r#"{"files":[]}"#).is_err());
        assert!(parse_snapshot("not json").is_err());
    }

    #[test]
    fn test_parse_snapshot_rejects_unsafe_paths() {
        let text = r#"{"files":[{"path":"index.html","content":""},{"path":"../x.js","content":""}]}"#;
        assert!(parse_snapshot(text).is_err());
    }

    #[tokio::test]
    async fn test_output_touching_version_history_is_synthesis_error() {
        let provider = CannedProvider::new(&[
            r#"{"files":[{"path":"index.html","content":"<html></html>"},{"path":".versions/manifest.json","content":"not json"}]}"#,
        ]);
        let synth = LlmSynthesizer::new(provider);
        let err = synth.generate("x", None).await.unwrap_err();
        assert_eq!(err.kind(), "synthesis");
        assert!(err.to_string().contains("Hidden path"), "{err}");
    }

    #[test]
    fn test_injection_is_idempotent() {
        let snapshot = parse_snapshot(APP).unwrap();
        let scripts = vec!["https://cdn.example/sdk.js".to_string()];
        let once = inject_namespace(&snapshot, &namespace(), &scripts, "init();");
        let twice = inject_namespace(&once, &namespace(), &scripts, "init();");
        assert_eq!(once, twice);

        let html = &once.entry().unwrap().content;
        assert_eq!(html.matches(BOOTSTRAP_MARKER).count(), 1);
        assert!(html.contains(r#"const PROJECT_NAMESPACE = "projects/42";"#));
        assert!(html.contains("\"projectId\": \"demo\""));
        assert!(html.find(BOOTSTRAP_MARKER).unwrap() < html.find("</body>").unwrap());
        // non-HTML files untouched
        assert_eq!(once.get("app.js").unwrap().content, "console.log(1)");
    }

    #[tokio::test]
    async fn test_generate_sends_json_request() {
        let provider = CannedProvider::new(&[APP]);
        let synth = LlmSynthesizer::new(provider.clone())
            .with_model(Some("gpt-4o".into()))
            .with_max_tokens(1234);

        let snapshot = synth.generate("todo app", None).await.unwrap();
        assert_eq!(snapshot.len(), 2);

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].json_mode);
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].max_tokens, 1234);
        assert_eq!(requests[0].messages[0].content, "todo app");
    }

    #[tokio::test]
    async fn test_fix_reapplies_namespace() {
        let provider = CannedProvider::new(&[APP]);
        let synth = LlmSynthesizer::new(provider.clone());
        let current = parse_snapshot(APP).unwrap();

        let fixed = synth
            .fix(&current, &[], &["Missing DOCTYPE declaration".into()], Some(&namespace()))
            .await
            .unwrap();
        assert!(fixed.entry().unwrap().content.contains(BOOTSTRAP_MARKER));

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].messages[0].content.contains("Missing DOCTYPE declaration"));
    }

    #[tokio::test]
    async fn test_invalid_output_is_synthesis_error() {
        let provider = CannedProvider::new(&[r#"{"files":[{"path":"app.js","content":""}]}"#]);
        let synth = LlmSynthesizer::new(provider);
        let err = synth.generate("x", None).await.unwrap_err();
        assert_eq!(err.kind(), "synthesis");
    }

    #[tokio::test]
    async fn test_backend_error_is_synthesis_error() {
        let provider = CannedProvider::new(&[]);
        let synth = LlmSynthesizer::new(provider);
        let err = synth.generate("x", None).await.unwrap_err();
        assert_eq!(err.kind(), "synthesis");
    }
}
