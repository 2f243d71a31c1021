// Build orchestration
//
// Turns create/iterate requests into background build tasks: persistence
// detection, first synthesis, the convergence loop, then deployment.

mod service;

pub use service::{BuildAgents, BuildService, ServiceError};
