// Persistence detection and namespace provisioning
//
// Before the first generation the prompt is classified: apps that store data
// get an isolated namespace (`projects/<id>`) plus the web config their
// bootstrap block needs.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::prompts::DETECT_SYSTEM_PROMPT;
use crate::config::PersistenceConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::forge::NamespaceContext;
use crate::providers::{parse_json_object, LlmProvider, Message, ProviderRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceDecision {
    pub needs: bool,
    #[serde(default)]
    pub reason: String,
}

impl PersistenceDecision {
    pub fn not_needed(reason: impl Into<String>) -> Self {
        Self {
            needs: false,
            reason: reason.into(),
        }
    }
}

/// Decides whether a prompt describes an app that persists data.
///
/// Infallible by contract: detection failures degrade to "not needed".
#[async_trait]
pub trait PersistenceDetector: Send + Sync {
    async fn detect(&self, prompt: &str) -> PersistenceDecision;
}

#[async_trait]
pub trait NamespaceProvisioner: Send + Sync {
    async fn provision(&self, project_id: &str) -> ForgeResult<NamespaceContext>;
}

pub struct LlmPersistenceDetector {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl LlmPersistenceDetector {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    async fn detect_inner(&self, prompt: &str) -> Result<PersistenceDecision> {
        let mut request = ProviderRequest::new(vec![Message::user(prompt)])
            .with_system(DETECT_SYSTEM_PROMPT)
            .with_max_tokens(200)
            .with_temperature(0.0)
            .with_json_mode();
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        let response = self.provider.send_message(&request).await?;
        parse_json_object(&response.text)
    }
}

#[async_trait]
impl PersistenceDetector for LlmPersistenceDetector {
    async fn detect(&self, prompt: &str) -> PersistenceDecision {
        match self.detect_inner(prompt).await {
            Ok(decision) => {
                tracing::info!(needs = decision.needs, "Persistence detection: {}", decision.reason);
                decision
            }
            Err(e) => {
                tracing::warn!("Persistence detection failed, assuming not needed: {:#}", e);
                PersistenceDecision::not_needed(format!("detection failed: {}", e))
            }
        }
    }
}

/// Hands out `projects/<id>` namespaces with the configured web config
pub struct ConfiguredNamespaceProvisioner {
    web_config: serde_json::Map<String, serde_json::Value>,
}

impl ConfiguredNamespaceProvisioner {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            web_config: config.web_config.clone(),
        }
    }
}

#[async_trait]
impl NamespaceProvisioner for ConfiguredNamespaceProvisioner {
    async fn provision(&self, project_id: &str) -> ForgeResult<NamespaceContext> {
        if project_id.is_empty() || project_id.contains('/') {
            return Err(ForgeError::Provision(format!(
                "Invalid project id for namespace: {:?}",
                project_id
            )));
        }
        if self.web_config.is_empty() {
            return Err(ForgeError::Provision(
                "No web config available for persistence".to_string(),
            ));
        }
        Ok(NamespaceContext {
            namespace: format!("projects/{}", project_id),
            config: self.web_config.clone(),
        })
    }
}

/// Session log lines explaining how to enable persistence
pub fn setup_instructions(project_id: &str) -> Vec<String> {
    vec![
        "Persistence setup required:".to_string(),
        "  1. Create a Firebase project at https://console.firebase.google.com/".to_string(),
        "  2. Enable Firestore (test mode is fine for development)".to_string(),
        "  3. Copy the web app config from Project Settings > General > Your apps".to_string(),
        "  4. Add it to config.toml under [persistence.web_config] and set persistence.enabled = true"
            .to_string(),
        format!(
            "  5. Data for this app will live under projects/{}",
            project_id
        ),
    ]
}
