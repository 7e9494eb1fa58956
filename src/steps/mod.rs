//! Pipeline steps: the units of generation work.
//!
//! A step's logic is an async trait object; [`EnhancedStep`] wraps it in
//! a bounded retry loop driven by a stopping condition, and
//! [`CompositeParallelStep`] fans several enhanced steps out across a
//! bounded concurrency pool.

mod composite;
mod enhanced;
mod result;

pub use composite::CompositeParallelStep;
pub use enhanced::EnhancedStep;
pub use result::{StepOutput, StepResult, StepStatus};

use crate::context::PipelineContext;
use async_trait::async_trait;

/// The step-specific generation logic run on every iteration.
///
/// Errors returned from [`execute`](StepLogic::execute) are converted
/// into error results and end the pipeline gracefully; they never
/// propagate as panics or raised errors.
#[async_trait]
pub trait StepLogic: Send + Sync {
    /// Produces one iteration's output for the given context.
    async fn execute(&self, ctx: &PipelineContext) -> anyhow::Result<StepOutput>;

    /// Hook invoked when an iteration resolves to
    /// [`StepStatus::Continue`] — neither complete, error, nor retry.
    /// Returning [`StepOutput::Classified`] with `Continue` status
    /// routes here directly, skipping the stopping condition.
    ///
    /// This is the extension point for multi-turn interaction (agentic
    /// tool-call loops) layered on top of a single model call. The
    /// default is a no-op.
    async fn continue_processing(
        &self,
        _ctx: &mut PipelineContext,
        _result: &StepResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A function-based step logic.
pub struct FnStepLogic<F>
where
    F: Fn(&PipelineContext) -> anyhow::Result<StepOutput> + Send + Sync,
{
    func: F,
}

impl<F> FnStepLogic<F>
where
    F: Fn(&PipelineContext) -> anyhow::Result<StepOutput> + Send + Sync,
{
    /// Creates a step logic from a synchronous function.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> StepLogic for FnStepLogic<F>
where
    F: Fn(&PipelineContext) -> anyhow::Result<StepOutput> + Send + Sync,
{
    async fn execute(&self, ctx: &PipelineContext) -> anyhow::Result<StepOutput> {
        (self.func)(ctx)
    }
}
