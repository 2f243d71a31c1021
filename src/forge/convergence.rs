// Convergence loop: review -> test -> decide -> fix, bounded by the budget

use std::sync::Arc;

use crate::agents::{CodeSynthesizer, DynamicValidator, StaticAnalyzer};
use crate::artifacts::{ArtifactStore, FileSnapshot};
use crate::config::constants::MAX_ITERATIONS;
use crate::errors::ForgeResult;

use super::policy::{decide, Decision, IssuePartition, IterationSignal};
use super::types::{LoopOutcome, LoopStatus, TaskContext, WarningReason};

/// Receives the loop's human-readable trace and iteration counter.
///
/// Implemented by the build session so status polling can follow along.
pub trait LoopObserver: Send + Sync {
    fn log(&self, message: &str);

    /// Called at the start of every iteration with its 1-based number
    fn iteration(&self, _iteration: usize) {}
}

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Upper bound on loop-body executions per build/iterate call, capped
    /// at `MAX_ITERATIONS`
    pub max_iterations: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// The generate/review/test/fix convergence loop.
///
/// Expects the initial snapshot to be written to the store already; every
/// fix it obtains is written and archived before the next iteration starts.
pub struct ConvergenceLoop {
    synthesizer: Arc<dyn CodeSynthesizer>,
    analyzer: Arc<dyn StaticAnalyzer>,
    validator: Arc<dyn DynamicValidator>,
    store: Arc<dyn ArtifactStore>,
    config: LoopConfig,
}

impl ConvergenceLoop {
    pub fn new(
        synthesizer: Arc<dyn CodeSynthesizer>,
        analyzer: Arc<dyn StaticAnalyzer>,
        validator: Arc<dyn DynamicValidator>,
        store: Arc<dyn ArtifactStore>,
        config: LoopConfig,
    ) -> Self {
        Self {
            synthesizer,
            analyzer,
            validator,
            store,
            config,
        }
    }

    /// Drive the loop until an exit rule fires.
    ///
    /// Analyzer, validator and store errors propagate as `Err`. A failing fix
    /// call is not an error: it ends the loop with `LoopStatus::Failed`.
    pub async fn run(
        &self,
        initial: FileSnapshot,
        task: &TaskContext,
        observer: &dyn LoopObserver,
    ) -> ForgeResult<LoopOutcome> {
        let max = self.config.max_iterations.clamp(1, MAX_ITERATIONS);
        let session = task.session_id.as_str();
        let workspace = self.store.materialized_path(session)?;

        let mut current = initial;
        let mut previous: Option<IterationSignal> = None;
        let mut fix_attempts = 0;

        for iteration in 0..max {
            let number = iteration + 1;
            observer.iteration(number);
            tracing::info!(session = %session, iteration = number, "Convergence iteration started");

            // ── 1. Review ───────────────────────────────────────────────────
            observer.log(&format!("Iteration {}/{}: reviewing code", number, max));
            let review = self.analyzer.review(&current).await?;
            let partition = IssuePartition::new(&review.issues);
            observer.log(&format!(
                "Review: {} critical, {} important, {} minor",
                partition.critical.len(),
                partition.important.len(),
                partition.minor.len()
            ));
            if review.approved && partition.blocking_count() > 0 {
                tracing::debug!(
                    session = %session,
                    blocking = partition.blocking_count(),
                    "Reviewer approved despite blocking issues; verdict ignored"
                );
            }

            // ── 2. Test ─────────────────────────────────────────────────────
            observer.log("Running tests");
            let test = self.validator.test(&workspace).await?;
            if test.passed {
                observer.log("Tests passed");
            } else {
                observer.log(&format!("Tests failed: {} error(s)", test.errors.len()));
                for error in &test.errors {
                    observer.log(&format!("  - {}", error));
                }
            }

            // ── 3. Decide ───────────────────────────────────────────────────
            let signal = IterationSignal::new(&partition, &test);
            tracing::info!(
                session = %session,
                iteration = number,
                blocking = signal.blocking,
                passed = signal.tests_passed,
                "Iteration evaluated"
            );

            match decide(iteration, max, signal, previous) {
                Decision::Accept => {
                    observer.log(&format!("Accepted after {} iteration(s)", number));
                    return Ok(LoopOutcome {
                        snapshot: current,
                        status: LoopStatus::Accepted,
                        iterations_used: number,
                        fix_attempts,
                    });
                }
                Decision::AcceptWithWarnings(reason) => {
                    observer.log(&match reason {
                        WarningReason::Stuck => format!(
                            "Tests pass but {} blocking issue(s) are not decreasing; accepting with warnings",
                            signal.blocking
                        ),
                        WarningReason::Budget => format!(
                            "Iteration budget of {} exhausted; accepting with warnings",
                            max
                        ),
                    });
                    return Ok(LoopOutcome {
                        snapshot: current,
                        status: warnings(reason, signal),
                        iterations_used: number,
                        fix_attempts,
                    });
                }
                Decision::Fix => {}
            }

            // ── 4. Fix ──────────────────────────────────────────────────────
            fix_attempts += 1;
            let blocking = partition.blocking();
            observer.log(&format!(
                "Fix attempt {}: {} blocking issue(s), {} test error(s)",
                fix_attempts,
                blocking.len(),
                test.errors.len()
            ));

            let fixed = match self
                .synthesizer
                .fix(&current, &blocking, &test.errors, task.namespace.as_ref())
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(session = %session, iteration = number, "Fix failed: {}", e);
                    observer.log(&format!("Fix failed: {}", e));
                    return Ok(LoopOutcome {
                        snapshot: current,
                        status: LoopStatus::Failed {
                            error: e.to_string(),
                        },
                        iterations_used: number,
                        fix_attempts,
                    });
                }
            };

            self.store.write(session, &fixed).await?;
            self.store
                .snapshot_version(session, &fixed, &format!("Fix {}", fix_attempts))
                .await?;

            current = fixed;
            previous = Some(signal);
        }

        // `decide` never returns Fix on the last iteration
        let last = previous.unwrap_or(IterationSignal {
            critical: 0,
            blocking: 0,
            tests_passed: false,
        });
        Ok(LoopOutcome {
            snapshot: current,
            status: warnings(WarningReason::Budget, last),
            iterations_used: max,
            fix_attempts,
        })
    }
}

fn warnings(reason: WarningReason, signal: IterationSignal) -> LoopStatus {
    LoopStatus::AcceptedWithWarnings {
        reason,
        open_issues: signal.blocking,
        tests_passed: signal.tests_passed,
    }
}
