// LLM-backed static analyzer
//
// The review model's output crosses a trust boundary: every field is parsed
// leniently into a raw shape and then coerced into the domain `Review`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::prompts::{render_files, REVIEW_SYSTEM_PROMPT};
use super::StaticAnalyzer;
use crate::artifacts::FileSnapshot;
use crate::config::constants::DEFAULT_MAX_TOKENS;
use crate::errors::{ForgeError, ForgeResult};
use crate::forge::{Issue, Review, Severity};
use crate::providers::{parse_json_object, LlmProvider, Message, ProviderRequest};

const REVIEW_TEMPERATURE: f32 = 0.2;

pub struct LlmReviewer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    max_tokens: u32,
}

impl LlmReviewer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
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

    async fn review_inner(&self, snapshot: &FileSnapshot) -> Result<Review> {
        let mut request = ProviderRequest::new(vec![Message::user(render_files(snapshot))])
            .with_system(REVIEW_SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(REVIEW_TEMPERATURE)
            .with_json_mode();
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let response = self.provider.send_message(&request).await?;
        parse_review(&response.text)
    }
}

#[async_trait]
impl StaticAnalyzer for LlmReviewer {
    async fn review(&self, snapshot: &FileSnapshot) -> ForgeResult<Review> {
        let review = self
            .review_inner(snapshot)
            .await
            .map_err(ForgeError::analysis)?;
        tracing::info!(
            issues = review.issues.len(),
            approved = review.approved,
            "Review complete"
        );
        Ok(review)
    }
}

/// Raw JSON shape from the reviewer: every field optional, loosely typed
#[derive(Debug, Deserialize)]
struct RawReview {
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: Option<Value>,
    #[serde(default)]
    severity: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        let line = match raw.line {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Issue {
            file: raw
                .file
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            line,
            severity: Severity::coerce(raw.severity.as_ref().and_then(Value::as_str)),
            message: raw
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "(no description provided)".to_string()),
            suggestion: raw.suggestion.unwrap_or_default(),
        }
    }
}

/// Parse and coerce reviewer output. Unparseable output is an error, never
/// a silent pass.
pub(crate) fn parse_review(text: &str) -> Result<Review> {
    let raw: RawReview = parse_json_object(text)?;
    let issues: Vec<Issue> = raw.issues.into_iter().map(Issue::from).collect();
    let approved = raw
        .approved
        .unwrap_or_else(|| issues.iter().all(|i| !i.severity.is_blocking()));
    Ok(Review {
        approved,
        issues,
        summary: raw.summary.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_review() {
        let review = parse_review(
            r#"{"approved":false,"issues":[{"file":"app.js","line":12,"severity":"critical","message":"XSS","suggestion":"use textContent"}],"summary":"unsafe"}"#,
        )
        .unwrap();
        assert!(!review.approved);
        assert_eq!(review.issues.len(), 1);
        let issue = &review.issues[0];
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.line, Some(12));
        assert_eq!(issue.suggestion, "use textContent");
        assert_eq!(review.summary, "unsafe");
    }

    #[test]
    fn test_unknown_and_missing_severity_become_important() {
        let review = parse_review(
            r#"{"issues":[{"file":"a.js","severity":"blocker","message":"x"},{"file":"b.js","message":"y"},{"severity":3,"message":"z"}]}"#,
        )
        .unwrap();
        assert!(review
            .issues
            .iter()
            .all(|i| i.severity == Severity::Important));
        // verdict absent: computed from issues
        assert!(!review.approved);
        assert_eq!(review.issues[2].file, "unknown");
    }

    #[test]
    fn test_line_as_string_and_garbage() {
        let review = parse_review(
            r#"{"approved":true,"issues":[{"file":"a.js","line":"7","severity":"minor","message":"x"},{"file":"a.js","line":"n/a","severity":"minor"}]}"#,
        )
        .unwrap();
        assert_eq!(review.issues[0].line, Some(7));
        assert_eq!(review.issues[1].line, None);
        assert_eq!(review.issues[1].message, "(no description provided)");
    }

    #[test]
    fn test_fenced_review_parses() {
        let review = parse_review("```json\n{\"approved\":true,\"issues\":[]}\n```").unwrap();
        assert!(review.approved);
        assert!(review.issues.is_empty());
    }

    #[test]
    fn test_unparseable_review_is_error() {
        assert!(parse_review("The code looks great!").is_err());
    }

    #[tokio::test]
    async fn test_review_over_http() {
        use crate::providers::openai::OpenAIProvider;
        use crate::providers::RetryPolicy;

        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "id": "c1",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"role": "assistant", "content": "{\"approved\":true,\"issues\":[{\"file\":\"index.html\",\"severity\":\"MINOR\",\"message\":\"title\"}],\"summary\":\"ok\"}"},
                "finish_reason": "stop"
            }]
        });
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let provider = OpenAIProvider::new("sk-test".into())
            .unwrap()
            .with_base_url(server.url())
            .with_retry_policy(RetryPolicy::none());
        let reviewer = LlmReviewer::new(Arc::new(provider)).with_model(Some("gpt-4o-mini".into()));

        let snapshot = FileSnapshot::new(vec![crate::artifacts::SnapshotFile::new(
            "index.html",
            "<html></html>",
        )])
        .unwrap();
        let review = reviewer.review(&snapshot).await.unwrap();
        assert_eq!(review.issues[0].severity, Severity::Minor);
        assert!(review.approved);
    }

    #[tokio::test]
    async fn test_backend_failure_is_analysis_error() {
        use crate::providers::openai::OpenAIProvider;
        use crate::providers::RetryPolicy;

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .create_async()
            .await;
        let provider = OpenAIProvider::new("bad".into())
            .unwrap()
            .with_base_url(server.url())
            .with_retry_policy(RetryPolicy::none());
        let reviewer = LlmReviewer::new(Arc::new(provider));
        let snapshot =
            FileSnapshot::new(vec![crate::artifacts::SnapshotFile::new("index.html", "")])
                .unwrap();

        let err = reviewer.review(&snapshot).await.unwrap_err();
        assert_eq!(err.kind(), "analysis");
    }
}
