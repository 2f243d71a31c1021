// Configuration structs

use super::constants::{
    DEFAULT_BODY_LIMIT_BYTES, DEFAULT_HTTP_ADDR, DEFAULT_MAX_TOKENS, DEFAULT_WORKSPACE_ROOT,
    MAX_ITERATIONS,
};
use super::provider::ProviderEntry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// Top-level configuration, as read from `~/.appforge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM backend used by the generator, reviewer and persistence detector
    pub provider: ProviderEntry,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_bind_address() -> String {
    DEFAULT_HTTP_ADDR.to_string()
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding one sub-directory per session
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(DEFAULT_WORKSPACE_ROOT)
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

/// Convergence loop and generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Fix-cycle budget per build/iterate call
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Maximum tokens requested from the backend per generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_iterations() -> usize {
    MAX_ITERATIONS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Where finished builds are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Serve the workspace from an in-process preview server
    Local,
    /// Publish with the Vercel CLI
    Vercel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_deploy_mode")]
    pub mode: DeployMode,
    /// Host the local preview server binds to
    #[serde(default = "default_preview_host")]
    pub preview_host: String,
    /// Fall back to the local preview when the cloud deploy fails
    #[serde(default = "default_true")]
    pub fallback_to_local: bool,
    /// Vercel CLI binary
    #[serde(default = "default_vercel_bin")]
    pub vercel_bin: String,
}

fn default_deploy_mode() -> DeployMode {
    DeployMode::Local
}

fn default_preview_host() -> String {
    "127.0.0.1".to_string()
}

fn default_vercel_bin() -> String {
    "vercel".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            mode: default_deploy_mode(),
            preview_host: default_preview_host(),
            fallback_to_local: true,
            vercel_bin: default_vercel_bin(),
        }
    }
}

/// Dynamic validator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// External command used to check scripts, e.g. `["node", "--check"]`.
    /// The script path is appended as the last argument. Empty disables the probe.
    #[serde(default = "default_probe_command")]
    pub probe_command: Vec<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_command() -> Vec<String> {
    vec!["node".to_string(), "--check".to_string()]
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_command: default_probe_command(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Client-side persistence (namespace) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Provision namespaces for prompts that need persistence
    #[serde(default)]
    pub enabled: bool,
    /// Web config handed to generated apps (e.g. a Firebase web config)
    #[serde(default)]
    pub web_config: serde_json::Map<String, serde_json::Value>,
    /// SDK scripts injected into the entry HTML ahead of the config block
    #[serde(default = "default_sdk_scripts")]
    pub sdk_scripts: Vec<String>,
    /// Javascript run after `APP_CONFIG` and `PROJECT_NAMESPACE` are defined
    #[serde(default = "default_init_snippet")]
    pub init_snippet: String,
}

fn default_sdk_scripts() -> Vec<String> {
    vec![
        "https://www.gstatic.com/firebasejs/10.7.1/firebase-app-compat.js".to_string(),
        "https://www.gstatic.com/firebasejs/10.7.1/firebase-firestore-compat.js".to_string(),
    ]
}

fn default_init_snippet() -> String {
    "firebase.initializeApp(APP_CONFIG);\nconst db = firebase.firestore();".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            web_config: serde_json::Map::new(),
            sdk_scripts: default_sdk_scripts(),
            init_snippet: default_init_snippet(),
        }
    }
}

impl Config {
    /// Build a config around a provider, everything else defaulted.
    pub fn with_provider(provider: ProviderEntry) -> Self {
        Self {
            provider,
            server: ServerConfig::default(),
            workspace: WorkspaceConfig::default(),
            build: BuildConfig::default(),
            deploy: DeployConfig::default(),
            validator: ValidatorConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.api_key().trim().is_empty() {
            anyhow::bail!(
                "Provider '{}' has an empty api_key. Set it in config.toml or export {}",
                self.provider.provider_type(),
                self.provider.api_key_env()
            );
        }

        if self.build.max_iterations == 0 || self.build.max_iterations > MAX_ITERATIONS {
            anyhow::bail!(
                "build.max_iterations must be between 1 and {}, got {}",
                MAX_ITERATIONS,
                self.build.max_iterations
            );
        }

        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "server.bind_address '{}' is not a valid socket address",
                self.server.bind_address
            );
        }

        if self.persistence.enabled && self.persistence.web_config.is_empty() {
            anyhow::bail!("persistence.enabled is set but persistence.web_config is empty");
        }

        Ok(())
    }
}
