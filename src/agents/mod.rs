// Build agents
//
// The collaborators the convergence loop drives: a code synthesizer, a
// static analyzer (review) and a dynamic validator (test), plus the
// persistence detector and namespace provisioner used before generation.
// Each role is a trait so the loop can run against scripted fakes.

use async_trait::async_trait;
use std::path::Path;

use crate::artifacts::FileSnapshot;
use crate::errors::ForgeResult;
use crate::forge::{Issue, NamespaceContext, Review, TestResult};

pub mod namespace;
pub mod prompts;
pub mod reviewer;
pub mod synthesizer;
pub mod validator;

pub use namespace::{
    ConfiguredNamespaceProvisioner, LlmPersistenceDetector, NamespaceProvisioner,
    PersistenceDecision, PersistenceDetector,
};
pub use reviewer::LlmReviewer;
pub use synthesizer::{inject_namespace, LlmSynthesizer};
pub use validator::{HtmlValidator, ScriptProbe};

/// Produces complete file snapshots (never diffs)
#[async_trait]
pub trait CodeSynthesizer: Send + Sync {
    /// First synthesis from a task description
    async fn generate(
        &self,
        task: &str,
        namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot>;

    /// Full replacement snapshot addressing every blocking issue and test error
    async fn fix(
        &self,
        current: &FileSnapshot,
        blocking: &[Issue],
        test_errors: &[String],
        namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot>;
}

/// Code review
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn review(&self, snapshot: &FileSnapshot) -> ForgeResult<Review>;
}

/// Structural, runtime and security checks against a materialized snapshot.
///
/// A failing check is `Ok(TestResult { passed: false, .. })`; `Err` means the
/// checks themselves could not run.
#[async_trait]
pub trait DynamicValidator: Send + Sync {
    async fn test(&self, workspace: &Path) -> ForgeResult<TestResult>;
}
