//! The bounded retry loop around a single unit of generation work.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use super::{StepLogic, StepOutput, StepResult, StepStatus};
use crate::conditions::{CompletionCondition, StoppingCondition};
use crate::context::{FlowControl, PipelineContext};
use crate::errors::LorebookError;

const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// A named unit of generation work wrapped in a bounded retry loop.
///
/// Each call to [`process`](EnhancedStep::process) repeatedly invokes
/// the step logic until the stopping condition reports completion, an
/// unrecoverable error, or the iteration budget is exhausted.
///
/// The stopping condition keeps its retry counter across `process`
/// calls; construct a fresh step per run or call
/// [`reset_condition`](EnhancedStep::reset_condition) when reusing one.
pub struct EnhancedStep {
    name: String,
    logic: Arc<dyn StepLogic>,
    condition: Mutex<Box<dyn StoppingCondition>>,
    max_iterations: u32,
}

impl EnhancedStep {
    /// Creates a step with the default completion condition.
    pub fn new(name: impl Into<String>, logic: impl StepLogic + 'static) -> Self {
        Self {
            name: name.into(),
            logic: Arc::new(logic),
            condition: Mutex::new(Box::new(CompletionCondition::new(3))),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the stopping condition.
    #[must_use]
    pub fn with_condition(self, condition: impl StoppingCondition + 'static) -> Self {
        *self.condition.lock() = Box::new(condition);
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clears the stopping condition's retry counter.
    pub fn reset_condition(&self) {
        self.condition.lock().reset();
    }

    /// Runs the retry loop over the given context.
    ///
    /// On completion or a graceful step failure the context is returned
    /// with its flow control set; only an exhausted iteration budget
    /// surfaces as `Err` ([`LorebookError::MaxIterationsExceeded`]), so
    /// callers can tell "the step decided it failed" apart from "the
    /// step never converged".
    pub async fn process(
        &self,
        mut ctx: PipelineContext,
    ) -> Result<PipelineContext, LorebookError> {
        ctx.step_id = self.name.clone();
        let started = Instant::now();
        let mut iteration: u32 = 0;

        while iteration < self.max_iterations {
            iteration += 1;

            // Explicitly classified results bypass the stopping
            // condition entirely, a classified Continue included; only
            // raw output is handed to the condition for classification.
            let (result, classified) = match self.logic.execute(&ctx).await {
                Ok(StepOutput::Classified(result)) => (result, true),
                Ok(StepOutput::Raw(value)) => (StepResult::pending(value), false),
                Err(err) => (StepResult::error(err.to_string()), true),
            };

            let status = if classified {
                result.status
            } else {
                self.condition.lock().evaluate(&result, &ctx)
            };

            match status {
                StepStatus::Complete => {
                    ctx.record_result(&self.name, result.value, StepStatus::Complete);
                    ctx.set_metadata(
                        format!("{}_duration_ms", self.name),
                        json!(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
                    );
                    ctx.set_metadata(format!("{}_iterations", self.name), json!(iteration));
                    ctx.flow_control = FlowControl::Continue;
                    tracing::debug!(step = %self.name, iteration, "Step complete");
                    return Ok(ctx);
                }
                StepStatus::Error => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "Step resolved to error".to_string());
                    tracing::warn!(step = %self.name, iteration, error = %message, "Step failed");
                    ctx.record_error(&self.name, message);
                    ctx.flow_control = FlowControl::End;
                    return Ok(ctx);
                }
                StepStatus::Retry => {
                    tracing::debug!(step = %self.name, iteration, "Step retrying");
                }
                StepStatus::Continue => {
                    if let Err(err) = self.logic.continue_processing(&mut ctx, &result).await {
                        ctx.record_error(&self.name, err.to_string());
                        ctx.flow_control = FlowControl::End;
                        return Ok(ctx);
                    }
                }
            }
        }

        Err(LorebookError::MaxIterationsExceeded {
            step: self.name.clone(),
            iterations: self.max_iterations,
        })
    }
}

impl std::fmt::Debug for EnhancedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancedStep")
            .field("name", &self.name)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
