// Error taxonomy for the build pipeline
//
// Every collaborator the convergence loop talks to reports failures through
// one of these variants. A test *failing* is not an error; it is a
// `TestResult { passed: false, .. }`. `Validation` is reserved for the test
// infrastructure itself breaking.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    /// Generation backend failure or malformed generator output
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Review backend failure or unparseable review
    #[error("Review failed: {0}")]
    Analysis(String),

    /// Test execution infrastructure failure
    #[error("Validation infrastructure failed: {0}")]
    Validation(String),

    #[error("Deploy failed: {0}")]
    Deploy(String),

    /// Workspace or version persistence I/O failure
    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Namespace provisioning failed: {0}")]
    Provision(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ForgeResult<T> = Result<T, ForgeError>;

impl ForgeError {
    /// Short machine-readable kind, used in session logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Synthesis(_) => "synthesis",
            ForgeError::Analysis(_) => "analysis",
            ForgeError::Validation(_) => "validation",
            ForgeError::Deploy(_) => "deploy",
            ForgeError::Store(_) => "store",
            ForgeError::Provision(_) => "provision",
            ForgeError::Config(_) => "config",
        }
    }

    /// Wrap an anyhow chain into a synthesis error, keeping every cause.
    pub fn synthesis(err: anyhow::Error) -> Self {
        ForgeError::Synthesis(format!("{:#}", err))
    }

    pub fn analysis(err: anyhow::Error) -> Self {
        ForgeError::Analysis(format!("{:#}", err))
    }

    pub fn validation(err: anyhow::Error) -> Self {
        ForgeError::Validation(format!("{:#}", err))
    }

    pub fn deploy(err: anyhow::Error) -> Self {
        ForgeError::Deploy(format!("{:#}", err))
    }

    pub fn store(err: anyhow::Error) -> Self {
        ForgeError::Store(format!("{:#}", err))
    }
}
