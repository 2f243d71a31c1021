// Exit policy for the convergence loop
//
// Pure, synchronous decisions: no I/O happens here, so the loop never
// suspends between classifying issues and choosing a branch.

use super::types::{Issue, Severity, TestResult, WarningReason};

/// Review issues split by severity
#[derive(Debug, Clone, Default)]
pub struct IssuePartition {
    pub critical: Vec<Issue>,
    pub important: Vec<Issue>,
    pub minor: Vec<Issue>,
}

impl IssuePartition {
    pub fn new(issues: &[Issue]) -> Self {
        let mut partition = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Critical => partition.critical.push(issue.clone()),
                Severity::Important => partition.important.push(issue.clone()),
                Severity::Minor => partition.minor.push(issue.clone()),
            }
        }
        partition
    }

    /// critical ∪ important, critical first
    pub fn blocking(&self) -> Vec<Issue> {
        self.critical
            .iter()
            .chain(self.important.iter())
            .cloned()
            .collect()
    }

    pub fn blocking_count(&self) -> usize {
        self.critical.len() + self.important.len()
    }
}

/// What one iteration observed, kept for the next iteration's stuck check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSignal {
    pub critical: usize,
    pub blocking: usize,
    pub tests_passed: bool,
}

impl IterationSignal {
    pub fn new(partition: &IssuePartition, test: &TestResult) -> Self {
        Self {
            critical: partition.critical.len(),
            blocking: partition.blocking_count(),
            tests_passed: test.passed,
        }
    }
}

/// Branch chosen at the end of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No blocking issues and tests pass
    Accept,
    /// Stop with warnings (stuck or out of budget)
    AcceptWithWarnings(WarningReason),
    /// Ask the synthesizer for a fix and go round again
    Fix,
}

/// Decide how iteration `iteration` (0-based) of `max_iterations` ends.
///
/// Order matters: accept, then stuck, then budget, then fix. Stuck detection
/// requires passing tests in this and the previous iteration, no critical
/// issues, and a blocking count that did not drop.
pub fn decide(
    iteration: usize,
    max_iterations: usize,
    current: IterationSignal,
    previous: Option<IterationSignal>,
) -> Decision {
    if current.blocking == 0 && current.tests_passed {
        return Decision::Accept;
    }

    if is_stuck(current, previous) {
        return Decision::AcceptWithWarnings(WarningReason::Stuck);
    }

    if iteration + 1 >= max_iterations {
        return Decision::AcceptWithWarnings(WarningReason::Budget);
    }

    Decision::Fix
}

fn is_stuck(current: IterationSignal, previous: Option<IterationSignal>) -> bool {
    let Some(prev) = previous else {
        return false;
    };
    current.tests_passed
        && prev.tests_passed
        && current.blocking > 0
        && current.critical == 0
        && current.blocking >= prev.blocking
}
