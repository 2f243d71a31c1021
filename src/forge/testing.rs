// Scripted collaborators for loop and service tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::agents::{
    CodeSynthesizer, DynamicValidator, NamespaceProvisioner, PersistenceDecision,
    PersistenceDetector, StaticAnalyzer,
};
use crate::artifacts::{ArtifactStore, FileSnapshot, SnapshotFile, VersionMeta};
use crate::deploy::DeploymentProvider;
use crate::errors::{ForgeError, ForgeResult};

use super::convergence::LoopObserver;
use super::types::{Issue, NamespaceContext, Review, Severity, TestResult};

pub(crate) fn snapshot(tag: &str) -> FileSnapshot {
    FileSnapshot::new(vec![SnapshotFile::new(
        "index.html",
        format!("<!DOCTYPE html><html><head></head><body>{}</body></html>", tag),
    )])
    .unwrap()
}

pub(crate) fn critical() -> Issue {
    Issue::new(Severity::Critical, "app.js", "XSS via innerHTML")
}

pub(crate) fn important() -> Issue {
    Issue::new(Severity::Important, "index.html", "Missing alt text")
}

pub(crate) fn minor() -> Issue {
    Issue::new(Severity::Minor, "app.js", "Inconsistent naming")
}

/// Pops scripted values in order, repeating the last one once exhausted
struct Script<T: Clone> {
    queue: Mutex<VecDeque<T>>,
    last: Mutex<Option<T>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            queue: Mutex::new(items.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Option<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(item) = self.queue.lock().unwrap().pop_front() {
            *last = Some(item);
        }
        last.clone()
    }
}

pub(crate) struct ScriptedAnalyzer {
    script: Script<Review>,
}

impl ScriptedAnalyzer {
    pub fn always(review: Review) -> Self {
        Self::sequence(vec![review])
    }

    pub fn sequence(reviews: Vec<Review>) -> Self {
        Self {
            script: Script::new(reviews),
        }
    }

    /// Every call errors
    pub fn failing() -> Self {
        Self::sequence(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StaticAnalyzer for ScriptedAnalyzer {
    async fn review(&self, _snapshot: &FileSnapshot) -> ForgeResult<Review> {
        self.script
            .next()
            .ok_or_else(|| ForgeError::Analysis("review backend unavailable".into()))
    }
}

pub(crate) struct ScriptedValidator {
    script: Script<TestResult>,
}

impl ScriptedValidator {
    pub fn always(result: TestResult) -> Self {
        Self::sequence(vec![result])
    }

    pub fn sequence(results: Vec<TestResult>) -> Self {
        Self {
            script: Script::new(results),
        }
    }

    pub fn failing() -> Self {
        Self::sequence(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DynamicValidator for ScriptedValidator {
    async fn test(&self, _workspace: &Path) -> ForgeResult<TestResult> {
        self.script
            .next()
            .ok_or_else(|| ForgeError::Validation("test runner crashed".into()))
    }
}

/// Generates `snapshot("generated")`; the n-th fix returns `snapshot("fix n")`
#[derive(Default)]
pub(crate) struct ScriptedSynthesizer {
    fail_fix_on: Option<usize>,
    fail_generate: bool,
    generate_calls: AtomicUsize,
    fix_calls: AtomicUsize,
    last_task: Mutex<Option<String>>,
    last_namespace: Mutex<Option<NamespaceContext>>,
    last_fix: Mutex<Option<(Vec<Issue>, Vec<String>)>>,
}

impl ScriptedSynthesizer {
    /// The `n`-th fix call (1-based) fails
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_fix_on: Some(n),
            ..Default::default()
        }
    }

    pub fn failing_generate() -> Self {
        Self {
            fail_generate: true,
            ..Default::default()
        }
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn last_task(&self) -> Option<String> {
        self.last_task.lock().unwrap().clone()
    }

    pub fn last_namespace(&self) -> Option<NamespaceContext> {
        self.last_namespace.lock().unwrap().clone()
    }

    pub fn last_fix_input(&self) -> Option<(Vec<Issue>, Vec<String>)> {
        self.last_fix.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSynthesizer for ScriptedSynthesizer {
    async fn generate(
        &self,
        task: &str,
        namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_task.lock().unwrap() = Some(task.to_string());
        *self.last_namespace.lock().unwrap() = namespace.cloned();
        if self.fail_generate {
            return Err(ForgeError::Synthesis("generator returned no files".into()));
        }
        Ok(snapshot("generated"))
    }

    async fn fix(
        &self,
        _current: &FileSnapshot,
        blocking: &[Issue],
        test_errors: &[String],
        _namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        let n = self.fix_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_fix.lock().unwrap() = Some((blocking.to_vec(), test_errors.to_vec()));
        if self.fail_fix_on == Some(n) {
            return Err(ForgeError::Synthesis("model output missing index.html".into()));
        }
        Ok(snapshot(&format!("fix {}", n)))
    }
}

/// In-memory artifact store recording archived version labels
#[derive(Default)]
pub(crate) struct MemoryStore {
    current: Mutex<HashMap<String, FileSnapshot>>,
    labels: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn versions(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }

    pub fn current(&self, session_id: &str) -> Option<FileSnapshot> {
        self.current.lock().unwrap().get(session_id).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn write(&self, session_id: &str, snapshot: &FileSnapshot) -> ForgeResult<()> {
        self.current
            .lock()
            .unwrap()
            .insert(session_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn read(&self, session_id: &str) -> ForgeResult<FileSnapshot> {
        self.current(session_id)
            .ok_or_else(|| ForgeError::Store(format!("no workspace for {}", session_id)))
    }

    async fn snapshot_version(
        &self,
        _session_id: &str,
        _snapshot: &FileSnapshot,
        label: &str,
    ) -> ForgeResult<String> {
        let mut labels = self.labels.lock().unwrap();
        labels.push(label.to_string());
        Ok(labels.len().to_string())
    }

    async fn list_versions(&self, _session_id: &str) -> ForgeResult<Vec<VersionMeta>> {
        Ok(self
            .labels
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, label)| VersionMeta {
                id: (i + 1).to_string(),
                timestamp: chrono::Utc::now(),
                label: label.clone(),
                file_count: 1,
                digest: String::new(),
            })
            .collect())
    }

    fn materialized_path(&self, session_id: &str) -> ForgeResult<PathBuf> {
        Ok(PathBuf::from("/mem").join(session_id))
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    lines: Mutex<Vec<String>>,
    iterations: Mutex<Vec<usize>>,
}

impl RecordingObserver {
    pub fn contains(&self, needle: &str) -> bool {
        self.count(needle) > 0
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains(needle))
            .count()
    }

    pub fn iterations(&self) -> Vec<usize> {
        self.iterations.lock().unwrap().clone()
    }
}

impl LoopObserver for RecordingObserver {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }

    fn iteration(&self, iteration: usize) {
        self.iterations.lock().unwrap().push(iteration);
    }
}

/// Always returns the same persistence decision
pub(crate) struct FixedDetector(pub PersistenceDecision);

impl FixedDetector {
    pub fn not_needed() -> Self {
        Self(PersistenceDecision::not_needed("static page"))
    }

    pub fn needed() -> Self {
        Self(PersistenceDecision {
            needs: true,
            reason: "stores todo items".into(),
        })
    }
}

#[async_trait]
impl PersistenceDetector for FixedDetector {
    async fn detect(&self, _prompt: &str) -> PersistenceDecision {
        self.0.clone()
    }
}

#[derive(Default)]
pub(crate) struct FixedProvisioner {
    pub fail: bool,
}

#[async_trait]
impl NamespaceProvisioner for FixedProvisioner {
    async fn provision(&self, project_id: &str) -> ForgeResult<NamespaceContext> {
        if self.fail {
            return Err(ForgeError::Provision("quota exceeded".into()));
        }
        let mut config = serde_json::Map::new();
        config.insert("apiKey".into(), serde_json::Value::String("k".into()));
        Ok(NamespaceContext {
            namespace: format!("projects/{}", project_id),
            config,
        })
    }
}

/// Hands out `http://preview/<dir>` and records releases
#[derive(Default)]
pub(crate) struct RecordingDeployer {
    pub fail: bool,
    deployed: Mutex<Vec<PathBuf>>,
    running: Mutex<Vec<PathBuf>>,
}

impl RecordingDeployer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn deploy_count(&self) -> usize {
        self.deployed.lock().unwrap().len()
    }
}

#[async_trait]
impl DeploymentProvider for RecordingDeployer {
    async fn deploy(&self, workspace: &Path) -> ForgeResult<String> {
        if self.fail {
            return Err(ForgeError::Deploy("vercel: not logged in".into()));
        }
        self.deployed.lock().unwrap().push(workspace.to_path_buf());
        let mut running = self.running.lock().unwrap();
        if !running.iter().any(|p| p == workspace) {
            running.push(workspace.to_path_buf());
        }
        let name = workspace
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(format!("http://preview/{}", name))
    }

    async fn release(&self, workspace: &Path) -> ForgeResult<bool> {
        let mut running = self.running.lock().unwrap();
        let before = running.len();
        running.retain(|p| p != workspace);
        Ok(running.len() != before)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
