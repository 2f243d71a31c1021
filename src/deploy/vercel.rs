// Vercel deployer: static deploy through the Vercel CLI

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

use super::DeploymentProvider;
use crate::errors::{ForgeError, ForgeResult};

const VERCEL_CONFIG_FILE: &str = "vercel.json";

pub struct VercelDeployer {
    binary: String,
}

impl VercelDeployer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn deploy_inner(&self, workspace: &Path) -> Result<String> {
        let config = serde_json::json!({
            "version": 2,
            "builds": [{ "src": "index.html", "use": "@vercel/static" }]
        });
        tokio::fs::write(
            workspace.join(VERCEL_CONFIG_FILE),
            serde_json::to_string_pretty(&config)?,
        )
        .await
        .context("Failed to write vercel.json")?;

        let output = Command::new(&self.binary)
            .args(["--prod", "--yes"])
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            );
        }

        extract_url(&stdout).context("Could not extract deployment URL from Vercel output")
    }
}

/// First `https://` URL in CLI output
pub(crate) fn extract_url(output: &str) -> Option<String> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https://[^\s]+").ok())
        .as_ref()?
        .find(output)
        .map(|m| m.as_str().to_string())
}

#[async_trait]
impl DeploymentProvider for VercelDeployer {
    async fn deploy(&self, workspace: &Path) -> ForgeResult<String> {
        let url = self
            .deploy_inner(workspace)
            .await
            .map_err(ForgeError::deploy)?;
        tracing::info!(%url, "Deployed to Vercel");
        Ok(url)
    }

    fn name(&self) -> &str {
        "vercel"
    }
}
