// Build convergence
//
// Drives generated code through review and test rounds, asking the
// synthesizer for fixes until the snapshot is accepted, the loop stops
// making progress, or the iteration budget runs out.

pub mod convergence;
pub mod policy;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use convergence::{ConvergenceLoop, LoopConfig, LoopObserver};
pub use policy::{decide, Decision, IssuePartition, IterationSignal};
pub use types::{
    Issue, LoopOutcome, LoopStatus, NamespaceContext, Review, Severity, TaskContext, TestResult,
    WarningReason,
};
