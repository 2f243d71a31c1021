// Build service
//
// Owns the injected collaborators and the session store. Each create or
// iterate request registers (or guards) a session and launches one tokio
// task; callers follow progress by polling the session.

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::agents::namespace::setup_instructions;
use crate::agents::{
    prompts, CodeSynthesizer, ConfiguredNamespaceProvisioner, DynamicValidator, HtmlValidator,
    LlmPersistenceDetector, LlmReviewer, LlmSynthesizer, NamespaceProvisioner,
    PersistenceDetector, StaticAnalyzer,
};
use crate::artifacts::{ArtifactStore, FileSnapshot, FsArtifactStore, VersionMeta};
use crate::config::Config;
use crate::deploy::{create_deployer, DeploymentProvider};
use crate::errors::{ForgeError, ForgeResult};
use crate::forge::{
    ConvergenceLoop, LoopConfig, LoopObserver, LoopStatus, NamespaceContext, TaskContext,
};
use crate::providers::create_provider;
use crate::session::{
    BuildSession, BuildStatus, InMemorySessionStore, SessionError, SessionReporter, SessionStore,
};

/// Errors surfaced to request handlers
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Forge(#[from] ForgeError),
}

/// The agents a build drives
pub struct BuildAgents {
    pub synthesizer: Arc<dyn CodeSynthesizer>,
    pub analyzer: Arc<dyn StaticAnalyzer>,
    pub validator: Arc<dyn DynamicValidator>,
    pub detector: Arc<dyn PersistenceDetector>,
    /// `None` when persistence is not configured; builds that need it get
    /// setup instructions instead of a namespace
    pub provisioner: Option<Arc<dyn NamespaceProvisioner>>,
}

/// How a build or iterate task ended, short of a hard error
enum Completion {
    Deployed(String),
    /// The loop's fix call failed
    LoopFailed(String),
}

struct Inner {
    agents: BuildAgents,
    store: Arc<dyn ArtifactStore>,
    deployer: Arc<dyn DeploymentProvider>,
    sessions: Arc<dyn SessionStore>,
    /// Provisioned namespaces, reused by later iterations
    namespaces: DashMap<String, NamespaceContext>,
    loop_config: LoopConfig,
}

/// Cheap to clone; every clone drives the same sessions
#[derive(Clone)]
pub struct BuildService {
    inner: Arc<Inner>,
}

impl BuildService {
    pub fn new(
        agents: BuildAgents,
        store: Arc<dyn ArtifactStore>,
        deployer: Arc<dyn DeploymentProvider>,
        sessions: Arc<dyn SessionStore>,
        loop_config: LoopConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                agents,
                store,
                deployer,
                sessions,
                namespaces: DashMap::new(),
                loop_config,
            }),
        }
    }

    /// Wire the LLM-backed agents, filesystem store and configured deployer
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.provider)?;
        let review_model = config.provider.review_model().map(str::to_string);

        let synthesizer = LlmSynthesizer::new(provider.clone())
            .with_max_tokens(config.build.max_tokens)
            .with_persistence(&config.persistence);
        let analyzer = LlmReviewer::new(provider.clone())
            .with_model(review_model.clone())
            .with_max_tokens(config.build.max_tokens);
        let detector = LlmPersistenceDetector::new(provider.clone(), review_model);
        let provisioner: Option<Arc<dyn NamespaceProvisioner>> = if config.persistence.enabled {
            Some(Arc::new(ConfiguredNamespaceProvisioner::new(
                &config.persistence,
            )))
        } else {
            None
        };

        tracing::info!(
            provider = provider.name(),
            model = provider.default_model(),
            workspace = %config.workspace.root.display(),
            deploy = ?config.deploy.mode,
            "Build service configured"
        );

        Ok(Self::new(
            BuildAgents {
                synthesizer: Arc::new(synthesizer),
                analyzer: Arc::new(analyzer),
                validator: Arc::new(HtmlValidator::from_config(&config.validator)),
                detector: Arc::new(detector),
                provisioner,
            },
            Arc::new(FsArtifactStore::new(config.workspace.root.clone())),
            create_deployer(&config.deploy),
            Arc::new(InMemorySessionStore::new()),
            LoopConfig {
                max_iterations: config.build.max_iterations,
            },
        ))
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Register a session and build it in the background
    pub fn start_build(&self, prompt: &str, id: Option<String>) -> Result<BuildSession, ServiceError> {
        let session = self.register(prompt, id)?;
        let service = self.clone();
        let id = session.id.clone();
        tokio::spawn(async move {
            service.execute_build(&id).await;
        });
        Ok(session)
    }

    /// Register a session and build it to completion
    pub async fn build(&self, prompt: &str, id: Option<String>) -> Result<BuildSession, ServiceError> {
        let session = self.register(prompt, id)?;
        self.execute_build(&session.id).await;
        Ok(self.get_status(&session.id)?)
    }

    /// Apply a change request to a completed session in the background
    pub fn start_iteration(&self, id: &str, change: &str) -> Result<BuildSession, ServiceError> {
        let session = self.begin_iteration(id, change)?;
        let service = self.clone();
        let id = id.to_string();
        let change = change.trim().to_string();
        tokio::spawn(async move {
            service.execute_iteration(&id, &change).await;
        });
        Ok(session)
    }

    /// Apply a change request and wait for the result
    pub async fn iterate(&self, id: &str, change: &str) -> Result<BuildSession, ServiceError> {
        self.begin_iteration(id, change)?;
        self.execute_iteration(id, change.trim()).await;
        Ok(self.get_status(id)?)
    }

    pub fn get_status(&self, id: &str) -> Result<BuildSession, SessionError> {
        self.inner
            .sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Stop the session's local preview. Returns false when none was running.
    pub async fn stop_preview(&self, id: &str) -> Result<bool, ServiceError> {
        self.get_status(id)?;
        let workspace = self.inner.store.materialized_path(id)?;
        let stopped = self.inner.deployer.release(&workspace).await?;
        if stopped {
            self.update(id, |s| s.push_log("Preview stopped"));
        }
        Ok(stopped)
    }

    pub async fn list_versions(&self, id: &str) -> Result<Vec<VersionMeta>, ServiceError> {
        self.get_status(id)?;
        Ok(self.inner.store.list_versions(id).await?)
    }

    // ── Session bookkeeping ─────────────────────────────────────────────

    fn register(&self, prompt: &str, id: Option<String>) -> Result<BuildSession, ServiceError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::InvalidRequest("Prompt is required".to_string()).into());
        }

        let id = id
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| Utc::now().timestamp_millis().to_string());
        if !BuildSession::is_valid_id(&id) {
            return Err(SessionError::InvalidRequest(format!("Invalid project id: {:?}", id)).into());
        }

        let session = BuildSession::new(id, prompt);
        self.inner.sessions.insert_new(session.clone())?;
        self.inner.namespaces.remove(&session.id);
        tracing::info!(session = %session.id, "Build session registered");
        Ok(session)
    }

    fn begin_iteration(&self, id: &str, change: &str) -> Result<BuildSession, ServiceError> {
        self.get_status(id)?;
        let change = change.trim();
        if change.is_empty() {
            return Err(SessionError::InvalidRequest("Change request is required".to_string()).into());
        }

        self.inner
            .sessions
            .transition(id, BuildStatus::Completed, BuildStatus::Iterating)?;
        let session = self.inner.sessions.update(id, &mut |s| {
            s.error = None;
            s.iteration = 0;
            s.push_log(format!("--- New iteration: {} ---", change));
        })?;
        tracing::info!(session = %id, "Iteration started");
        Ok(session)
    }

    fn update(&self, id: &str, mut f: impl FnMut(&mut BuildSession)) {
        if let Err(e) = self.inner.sessions.update(id, &mut f) {
            tracing::warn!(session = %id, "Session update dropped: {}", e);
        }
    }

    /// Apply the terminal status for a finished task
    fn finish(&self, id: &str, result: ForgeResult<Completion>) {
        match result {
            Ok(Completion::Deployed(url)) => {
                tracing::info!(session = %id, %url, "Build completed");
                self.update(id, |s| {
                    s.url = Some(url.clone());
                    s.error = None;
                    s.status = BuildStatus::Completed;
                    s.push_log("Build completed");
                });
            }
            Ok(Completion::LoopFailed(error)) => {
                tracing::warn!(session = %id, "Build failed in fix step: {}", error);
                self.update(id, |s| s.fail(error.clone()));
            }
            Err(e) => {
                tracing::error!(session = %id, kind = e.kind(), "Build failed: {}", e);
                let message = e.to_string();
                self.update(id, |s| s.fail(message.clone()));
            }
        }
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    async fn execute_build(&self, id: &str) {
        let Some(session) = self.inner.sessions.get(id) else {
            return;
        };
        let reporter = SessionReporter::new(self.inner.sessions.clone(), id);
        let result = self.run_build(id, &session.prompt, &reporter).await;
        self.finish(id, result);
    }

    async fn execute_iteration(&self, id: &str, change: &str) {
        let Some(session) = self.inner.sessions.get(id) else {
            return;
        };
        let reporter = SessionReporter::new(self.inner.sessions.clone(), id);
        let result = self
            .run_iteration(id, &session.prompt, change, &reporter)
            .await;
        self.finish(id, result);
    }

    async fn run_build(
        &self,
        id: &str,
        prompt: &str,
        reporter: &dyn LoopObserver,
    ) -> ForgeResult<Completion> {
        let namespace = self.prepare_namespace(id, prompt, reporter).await?;

        reporter.log("Generating initial code");
        let snapshot = self
            .inner
            .agents
            .synthesizer
            .generate(prompt, namespace.as_ref())
            .await?;
        reporter.log(&format!("Generated {} file(s)", snapshot.len()));
        self.persist(id, &snapshot, "Initial generation", reporter)
            .await?;

        let task = TaskContext::new(id, prompt).with_namespace(namespace);
        self.converge_and_deploy(snapshot, &task, reporter).await
    }

    async fn run_iteration(
        &self,
        id: &str,
        prompt: &str,
        change: &str,
        reporter: &dyn LoopObserver,
    ) -> ForgeResult<Completion> {
        let current = self.inner.store.read(id).await?;
        let namespace = self.inner.namespaces.get(id).map(|n| n.value().clone());

        reporter.log("Applying requested change");
        let task_text = prompts::iteration_task(&current, prompt, change);
        let snapshot = self
            .inner
            .agents
            .synthesizer
            .generate(&task_text, namespace.as_ref())
            .await?;
        reporter.log(&format!("Generated {} file(s)", snapshot.len()));
        self.persist(id, &snapshot, &format!("Iteration: {}", change), reporter)
            .await?;

        let task = TaskContext::new(id, prompt).with_namespace(namespace);
        self.converge_and_deploy(snapshot, &task, reporter).await
    }

    /// Detect persistence needs and provision a namespace when possible
    async fn prepare_namespace(
        &self,
        id: &str,
        prompt: &str,
        reporter: &dyn LoopObserver,
    ) -> ForgeResult<Option<NamespaceContext>> {
        let decision = self.inner.agents.detector.detect(prompt).await;
        if !decision.needs {
            return Ok(None);
        }
        reporter.log(&format!("Persistence needed: {}", decision.reason));

        let Some(provisioner) = &self.inner.agents.provisioner else {
            for line in setup_instructions(id) {
                reporter.log(&line);
            }
            return Ok(None);
        };

        let context = provisioner.provision(id).await?;
        reporter.log(&format!("Provisioned namespace {}", context.namespace));
        let namespace = context.namespace.clone();
        self.update(id, |s| s.namespace = Some(namespace.clone()));
        self.inner
            .namespaces
            .insert(id.to_string(), context.clone());
        Ok(Some(context))
    }

    async fn persist(
        &self,
        id: &str,
        snapshot: &FileSnapshot,
        label: &str,
        reporter: &dyn LoopObserver,
    ) -> ForgeResult<()> {
        self.inner.store.write(id, snapshot).await?;
        let version = self
            .inner
            .store
            .snapshot_version(id, snapshot, label)
            .await?;
        reporter.log(&format!("Saved version {} ({})", version, label));
        Ok(())
    }

    async fn converge_and_deploy(
        &self,
        snapshot: FileSnapshot,
        task: &TaskContext,
        reporter: &dyn LoopObserver,
    ) -> ForgeResult<Completion> {
        let id = task.session_id.as_str();
        let agents = &self.inner.agents;
        let convergence = ConvergenceLoop::new(
            agents.synthesizer.clone(),
            agents.analyzer.clone(),
            agents.validator.clone(),
            self.inner.store.clone(),
            self.inner.loop_config,
        );

        let outcome = convergence.run(snapshot, task, reporter).await?;
        let status = outcome.status.clone();
        self.update(id, |s| {
            s.iteration = outcome.iterations_used;
            s.outcome = Some(status.clone());
        });
        if let LoopStatus::Failed { error } = outcome.status {
            return Ok(Completion::LoopFailed(error));
        }

        reporter.log("Deploying");
        let workspace = self.inner.store.materialized_path(id)?;
        let url = self.inner.deployer.deploy(&workspace).await?;
        reporter.log(&format!("Deployed to: {}", url));
        Ok(Completion::Deployed(url))
    }
}
