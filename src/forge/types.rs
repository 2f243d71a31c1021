// Convergence loop types: Severity, Issue, Review, TestResult, LoopOutcome

use serde::{Deserialize, Serialize};

use crate::artifacts::FileSnapshot;

/// Review issue severity. The only input the loop uses to decide whether
/// review findings block acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Important,
    Minor,
}

impl Severity {
    /// Coerce an untrusted severity label. Unknown or missing labels become
    /// `Important` so a garbled review errs toward more scrutiny.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") => Severity::Critical,
            Some("important") => Severity::Important,
            Some("minor") => Severity::Minor,
            other => {
                tracing::debug!(severity = ?other, "Unknown review severity, treating as important");
                Severity::Important
            }
        }
    }

    /// Critical and important issues block acceptance
    pub fn is_blocking(self) -> bool {
        !matches!(self, Severity::Minor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Minor => "minor",
        }
    }
}

/// A single review finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
}

impl Issue {
    pub fn new(severity: Severity, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            severity,
            message: message.into(),
            suggestion: String::new(),
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

/// Static analyzer verdict. `approved` is advisory only; the loop recomputes
/// acceptance from `issues`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub approved: bool,
    pub issues: Vec<Issue>,
    pub summary: String,
}

impl Review {
    pub fn clean() -> Self {
        Self {
            approved: true,
            issues: Vec::new(),
            summary: String::new(),
        }
    }

    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self {
            approved: issues.iter().all(|i| !i.severity.is_blocking()),
            issues,
            summary: String::new(),
        }
    }
}

/// Dynamic validator result. `errors` is context for the next fix, never
/// used for control decisions beyond `passed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub errors: Vec<String>,
}

impl TestResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            errors,
        }
    }

    /// Pass exactly when no check reported an error
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
        }
    }
}

/// Isolation key plus web config for apps that persist data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceContext {
    pub namespace: String,
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// What the loop is building, threaded through every synthesizer call
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub session_id: String,
    pub prompt: String,
    pub namespace: Option<NamespaceContext>,
}

impl TaskContext {
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<NamespaceContext>) -> Self {
        self.namespace = namespace;
        self
    }
}

/// Why the loop accepted a snapshot that still has open findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    /// Tests kept passing while blocking review issues stopped decreasing
    Stuck,
    /// Iteration budget exhausted
    Budget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopStatus {
    Accepted,
    AcceptedWithWarnings {
        reason: WarningReason,
        open_issues: usize,
        tests_passed: bool,
    },
    /// The fix call itself failed; remaining budget was not spent
    Failed { error: String },
}

impl LoopStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoopStatus::Failed { .. })
    }
}

/// Result returned from `ConvergenceLoop::run()`
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Last snapshot the loop held (the one persisted in the store)
    pub snapshot: FileSnapshot,
    pub status: LoopStatus,
    pub iterations_used: usize,
    /// Fix calls attempted, including a failing one
    pub fix_attempts: usize,
}
