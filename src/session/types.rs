// Build session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forge::LoopStatus;

/// Lifecycle of a build session.
///
/// `Generating -> Completed | Failed`, and `Completed -> Iterating ->
/// Completed | Failed`. Terminal states stay put until an iterate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Generating,
    Iterating,
    Completed,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Generating => "generating",
            BuildStatus::Iterating => "iterating",
            BuildStatus::Completed => "completed",
            BuildStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Everything a status poll returns about one build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSession {
    pub id: String,
    pub status: BuildStatus,
    pub prompt: String,
    /// Append-only trace of every decision point
    pub logs: Vec<LogEntry>,
    /// Current (or last) convergence iteration, 1-based; 0 before the loop runs
    pub iteration: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// How the last convergence loop ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LoopStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuildSession {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: BuildStatus::Generating,
            prompt: prompt.into(),
            logs: Vec::new(),
            iteration: 0,
            error: None,
            url: None,
            namespace: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.logs.push(LogEntry {
            timestamp: now,
            message: message.into(),
        });
        self.updated_at = now;
    }

    /// Ids double as workspace directory names
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 128
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.push_log(format!("Build failed: {}", error));
        self.status = BuildStatus::Failed;
        self.error = Some(error);
    }
}
