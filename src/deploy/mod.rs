// Deployment providers
//
// Publish a materialized workspace and hand back a reachable URL. The local
// preview doubles as the fallback when a cloud deploy fails.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::{DeployConfig, DeployMode};
use crate::errors::ForgeResult;

pub mod local;
pub mod vercel;

pub use local::LocalPreviewDeployer;
pub use vercel::VercelDeployer;

#[async_trait]
pub trait DeploymentProvider: Send + Sync {
    /// Publish `workspace` and return its URL
    async fn deploy(&self, workspace: &Path) -> ForgeResult<String>;

    /// Stop anything still serving `workspace`. Returns false when nothing
    /// was running.
    async fn release(&self, _workspace: &Path) -> ForgeResult<bool> {
        Ok(false)
    }

    fn name(&self) -> &str;
}

/// Tries `primary`, then `fallback`
pub struct FallbackDeployer {
    primary: Arc<dyn DeploymentProvider>,
    fallback: Arc<dyn DeploymentProvider>,
}

impl FallbackDeployer {
    pub fn new(primary: Arc<dyn DeploymentProvider>, fallback: Arc<dyn DeploymentProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl DeploymentProvider for FallbackDeployer {
    async fn deploy(&self, workspace: &Path) -> ForgeResult<String> {
        match self.primary.deploy(workspace).await {
            Ok(url) => Ok(url),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    "Deploy failed, falling back: {}",
                    e
                );
                self.fallback.deploy(workspace).await
            }
        }
    }

    async fn release(&self, workspace: &Path) -> ForgeResult<bool> {
        let primary = self.primary.release(workspace).await?;
        let fallback = self.fallback.release(workspace).await?;
        Ok(primary || fallback)
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}

/// Build the deployer described by `[deploy]`
pub fn create_deployer(config: &DeployConfig) -> Arc<dyn DeploymentProvider> {
    let local: Arc<dyn DeploymentProvider> =
        Arc::new(LocalPreviewDeployer::new(config.preview_host.clone()));
    match config.mode {
        DeployMode::Local => local,
        DeployMode::Vercel => {
            let vercel: Arc<dyn DeploymentProvider> =
                Arc::new(VercelDeployer::new(config.vercel_bin.clone()));
            if config.fallback_to_local {
                Arc::new(FallbackDeployer::new(vercel, local))
            } else {
                vercel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForgeError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        result: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, result: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DeploymentProvider for Fixed {
        async fn deploy(&self, _workspace: &Path) -> ForgeResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .map_err(|e| ForgeError::Deploy(e.to_string()))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_fallback_used_on_primary_failure() {
        let primary = Fixed::new("vercel", Err("not logged in"));
        let fallback = Fixed::new("local", Ok("http://127.0.0.1:5000/"));
        let deployer = FallbackDeployer::new(primary.clone(), fallback.clone());

        let url = deployer.deploy(Path::new("/tmp/x")).await.unwrap();
        assert_eq!(url, "http://127.0.0.1:5000/");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_skipped_on_success() {
        let primary = Fixed::new("vercel", Ok("https://app.vercel.app"));
        let fallback = Fixed::new("local", Ok("http://127.0.0.1:5000/"));
        let deployer = FallbackDeployer::new(primary, fallback.clone());

        assert_eq!(
            deployer.deploy(Path::new("/tmp/x")).await.unwrap(),
            "https://app.vercel.app"
        );
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_failing_is_deploy_error() {
        let deployer = FallbackDeployer::new(
            Fixed::new("vercel", Err("a")),
            Fixed::new("local", Err("b")),
        );
        let err = deployer.deploy(Path::new("/tmp/x")).await.unwrap_err();
        assert_eq!(err.kind(), "deploy");
    }

    #[test]
    fn test_create_deployer_by_mode() {
        let mut config = DeployConfig::default();
        assert_eq!(create_deployer(&config).name(), "local");
        config.mode = DeployMode::Vercel;
        assert_eq!(create_deployer(&config).name(), "vercel");
        config.fallback_to_local = false;
        assert_eq!(create_deployer(&config).name(), "vercel");
    }
}
