// AppForge - prompt-to-web-app generator
// Library exports

pub mod agents;
pub mod artifacts;
pub mod build;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod forge;
pub mod providers;
pub mod server;
pub mod session;

pub use build::{BuildAgents, BuildService, ServiceError};
pub use errors::{ForgeError, ForgeResult};
pub use forge::{ConvergenceLoop, LoopConfig, LoopOutcome, LoopStatus};
