//! Bounded-concurrency fan-out/fan-in over enhanced steps.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::EnhancedStep;
use crate::context::{FlowControl, PipelineContext};
use crate::errors::LorebookError;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Outcome of one settled branch.
struct BranchOutcome {
    name: String,
    duration_ms: u64,
    /// The branch's final context, or an error message for the fatal
    /// (never-converged) path.
    result: Result<PipelineContext, String>,
}

/// Executes several independently-configured enhanced steps concurrently
/// and merges their results into one consolidated context.
///
/// Branches start in declaration order, gated by a counting semaphore
/// sized `max_concurrency`; completion order is unconstrained. Branches
/// communicate results exclusively through their name-scoped
/// `"{branch}_result"` / `"{branch}_status"` keys — any other key a
/// branch writes into its forked context is discarded by the merge.
pub struct CompositeParallelStep {
    name: String,
    branches: Vec<Arc<EnhancedStep>>,
    max_concurrency: usize,
    fail_fast: bool,
}

impl CompositeParallelStep {
    /// Creates an empty composite step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            fail_fast: false,
        }
    }

    /// Adds a branch. Branches start in the order they are added.
    #[must_use]
    pub fn with_branch(mut self, branch: EnhancedStep) -> Self {
        self.branches.push(Arc::new(branch));
        self
    }

    /// Sets the concurrency ceiling.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Cancels still-pending branches on the first observed failure.
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Returns the composite name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fans the branches out, waits for them to settle, and merges.
    ///
    /// Only a panicked branch task surfaces as `Err`; branch failures
    /// (graceful or fatal) are aggregated into the merged context.
    pub async fn process(&self, ctx: PipelineContext) -> Result<PipelineContext, LorebookError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<BranchOutcome> = JoinSet::new();

        // Every branch task is spawned up front and acquires its permit
        // inside the task: the semaphore is fair, so starts stay in
        // declaration order, while settling below can begin before the
        // whole fan-out has made it through the concurrency gate.
        for branch in &self.branches {
            let semaphore = Arc::clone(&semaphore);
            let branch = Arc::clone(branch);
            let child_ctx = ctx.with_step(branch.name());

            tasks.spawn(async move {
                let name = branch.name().to_string();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        return BranchOutcome {
                            name,
                            duration_ms: 0,
                            result: Err(format!("semaphore closed: {err}")),
                        }
                    }
                };
                let started = Instant::now();
                let result = branch.process(child_ctx).await.map_err(|e| e.to_string());
                BranchOutcome {
                    name,
                    duration_ms: u64::try_from(started.elapsed().as_millis())
                        .unwrap_or(u64::MAX),
                    result,
                }
            });
        }

        // Settle incrementally so a failure can be reacted to as soon
        // as it is observed, not only after every branch finishes.
        let mut completed: Vec<(String, u64, PipelineContext)> = Vec::new();
        let mut failures: Vec<(String, String)> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => {
                    return Err(LorebookError::Internal(format!(
                        "branch task panicked: {err}"
                    )))
                }
            };

            match outcome.result {
                Ok(child) if child.flow_control == FlowControl::Continue => {
                    completed.push((outcome.name, outcome.duration_ms, child));
                }
                Ok(child) => {
                    let key = format!("{}_error", outcome.name);
                    let message = child
                        .metadata(&key)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("branch failed")
                        .to_string();
                    failures.push((outcome.name, message));
                }
                Err(message) => failures.push((outcome.name, message)),
            }

            if self.fail_fast && !failures.is_empty() {
                tracing::warn!(
                    composite = %self.name,
                    failed = %failures[0].0,
                    "Fail-fast triggered, canceling pending branches"
                );
                tasks.abort_all();
            }
        }

        Ok(self.merge(&ctx, completed, failures))
    }

    /// Builds the consolidated context from the settled branches.
    fn merge(
        &self,
        parent: &PipelineContext,
        completed: Vec<(String, u64, PipelineContext)>,
        failures: Vec<(String, String)>,
    ) -> PipelineContext {
        // Fresh context carrying the parent's data and metadata.
        let mut merged = parent.with_step(&self.name);

        for (name, duration_ms, child) in completed {
            if let Some(value) = child.result_of(&name) {
                merged.set(PipelineContext::result_key(&name), value.clone());
            }
            if let Some(status) = child.status_of(&name) {
                merged.set(PipelineContext::status_key(&name), json!(status));
            }
            merged.set_metadata(format!("{name}_duration_ms"), json!(duration_ms));
            merged.set_metadata(format!("{name}_success"), json!(true));
        }

        for (name, message) in &failures {
            merged.record_error(name, message.clone());
            merged.set_metadata(format!("{name}_success"), json!(false));
        }

        if let Some((_, first_error)) = failures.first() {
            merged.set_metadata(format!("{}_failed", self.name), json!(true));
            merged.set_metadata(format!("{}_error", self.name), json!(first_error));
            merged.flow_control = FlowControl::End;
        } else {
            merged.flow_control = FlowControl::Continue;
        }

        merged
    }
}

impl std::fmt::Debug for CompositeParallelStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeParallelStep")
            .field("name", &self.name)
            .field("branches", &self.branches.len())
            .field("max_concurrency", &self.max_concurrency)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}
