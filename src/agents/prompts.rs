// Prompt templates for generation, fixes, review and persistence detection

use crate::artifacts::FileSnapshot;
use crate::forge::{Issue, NamespaceContext};

pub const GENERATE_SYSTEM_PROMPT: &str = r#"You are an expert front-end developer. Build a complete, working web application from the user's description.

Requirements:
- A single static site: `index.html` is the entry point, with any CSS and JavaScript in separate files it references by relative path
- Semantic HTML5 with a DOCTYPE, <html>, <head> and <body>
- Responsive layout (mobile, tablet, desktop) using modern CSS (Flexbox/Grid)
- Error handling and user feedback for every asynchronous operation
- Accessibility: labels, alt text, keyboard navigation
- Never use eval(); never assign untrusted strings to innerHTML (use textContent or DOM APIs)

Every referenced file must be included. Every feature must be fully implemented.

Return ONLY valid JSON (no markdown, no explanation):
{
  "files": [
    {"path": "index.html", "content": "...complete file..."},
    {"path": "styles.css", "content": "..."},
    {"path": "app.js", "content": "..."}
  ],
  "description": "Brief description of what was built"
}"#;

pub const PERSISTENCE_GUIDE: &str = r#"

DATA PERSISTENCE:
This app stores its data remotely. The data SDK and its configuration are injected into index.html automatically. You have access to:
- `APP_CONFIG`: the web configuration object
- `db`: an initialized Firestore handle
- `PROJECT_NAMESPACE`: the isolated path for this project

All collections MUST live under the project namespace:
    const itemsRef = db.collection(`${PROJECT_NAMESPACE}/items`);
Never use root collections such as db.collection('items').

Use real-time listeners (.onSnapshot) where the UI shows live data, include createdAt/updatedAt timestamps via firebase.firestore.FieldValue.serverTimestamp(), and wrap every database call in try/catch with visible feedback. Do not add the SDK script tags or configuration yourself."#;

pub const FIX_SYSTEM_PROMPT: &str = r#"You are debugging and fixing a web application.

You will receive:
1. The current code files
2. Blocking issues found in code review
3. Errors from automated testing

Fix ALL listed issues and errors while preserving every feature that is not implicated by them. Return the COMPLETE updated application, every file in full, in the same JSON format:
{
  "files": [
    {"path": "index.html", "content": "..."}
  ],
  "description": "What was fixed"
}

Return ONLY the JSON, no markdown."#;

pub const REVIEW_SYSTEM_PROMPT: &str = r#"You are a senior code reviewer. Classify every problem you find with exactly one severity.

1. "critical" (must fix, breaks functionality):
   - Security vulnerabilities (XSS, exposed credentials, eval of untrusted input)
   - Logic errors that prevent core features from working
   - Syntax errors or missing files that prevent execution
   - Data stored outside PROJECT_NAMESPACE when a namespace is in use

2. "important" (should fix, degrades the experience):
   - Poor error handling for edge cases
   - Accessibility violations (missing alt text, labels, ARIA)
   - Performance problems (memory leaks, unbounded loops)

3. "minor" (nice to have):
   - Style inconsistencies, naming, missing comments, redundant code

Be pragmatic: working code beats perfect code. Do not report style as critical or important.
Set "approved" to true when there are no critical issues and at most 2 important issues.

Return ONLY valid JSON:
{
  "approved": true,
  "issues": [
    {
      "file": "index.html",
      "line": 42,
      "severity": "critical",
      "message": "Brief description",
      "suggestion": "How to fix"
    }
  ],
  "summary": "Overall assessment (1-2 sentences)"
}"#;

pub const DETECT_SYSTEM_PROMPT: &str = r#"Determine whether the described web application needs remote data persistence (data that must survive reloads or be shared between users). Purely computational or presentational apps do not.

Return ONLY JSON: {"needs": true or false, "reason": "why"}"#;

/// Generation system prompt, extended with the persistence guide when the
/// app gets a namespace
pub fn generate_system_prompt(namespace: Option<&NamespaceContext>) -> String {
    match namespace {
        Some(_) => format!("{}{}", GENERATE_SYSTEM_PROMPT, PERSISTENCE_GUIDE),
        None => GENERATE_SYSTEM_PROMPT.to_string(),
    }
}

/// Every file as a labelled fenced block
pub fn render_files(snapshot: &FileSnapshot) -> String {
    snapshot
        .files()
        .iter()
        .map(|f| format!("File: {}\n```\n{}\n```", f.path, f.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `- critical: message (app.js:12). Suggestion: ...`
pub fn format_issue(issue: &Issue) -> String {
    let location = match issue.line {
        Some(line) => format!("{}:{}", issue.file, line),
        None => issue.file.clone(),
    };
    let mut out = format!(
        "- {}: {} ({})",
        issue.severity.as_str(),
        issue.message,
        location
    );
    if !issue.suggestion.is_empty() {
        out.push_str(". Suggestion: ");
        out.push_str(&issue.suggestion);
    }
    out
}

pub fn fix_user_prompt(current: &FileSnapshot, blocking: &[Issue], test_errors: &[String]) -> String {
    let issues = if blocking.is_empty() {
        "None".to_string()
    } else {
        blocking.iter().map(format_issue).collect::<Vec<_>>().join("\n")
    };
    let errors = if test_errors.is_empty() {
        "None".to_string()
    } else {
        test_errors
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Current files:\n\n{}\n\nReview issues:\n{}\n\nTest errors:\n{}\n\nFix all issues and return the complete updated code.",
        render_files(current),
        issues,
        errors
    )
}

/// Task description for an iteration request: the current app plus the change
pub fn iteration_task(current: &FileSnapshot, original_prompt: &str, change: &str) -> String {
    format!(
        "Modify an existing web application.\n\nOriginal request: {}\n\nCurrent files:\n\n{}\n\nRequested change: {}\n\nApply the change while keeping all existing functionality. Return the complete application, every file in full.",
        original_prompt,
        render_files(current),
        change
    )
}
