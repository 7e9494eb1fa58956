//! Stopping conditions: stateful classifiers deciding whether a step's
//! output is final, needs retrying, or is a fatal failure.
//!
//! Every condition shares the same retry-budget contract: a recoverable
//! failure consumes one retry, and the failure after the budget is
//! exhausted resolves to [`StepStatus::Error`]. Conditions are
//! failure-safe: internal parse/validate problems consume a retry
//! rather than propagating.
//!
//! The retry counter lives as long as the condition value and is never
//! reset implicitly between pipeline runs. Construct conditions fresh
//! per step invocation, or call [`StoppingCondition::reset`] explicitly
//! when reusing one.

mod content;

pub use content::{JsonCondition, PatternCondition, PatternMatcher, TypedRecordCondition};

use crate::context::PipelineContext;
use crate::steps::{StepResult, StepStatus};

/// Stateful predicate classifying a step iteration's result.
pub trait StoppingCondition: Send {
    /// Classifies a result, consuming a retry on recoverable failure.
    fn evaluate(&mut self, result: &StepResult, ctx: &PipelineContext) -> StepStatus;

    /// Clears the retry counter.
    fn reset(&mut self);

    /// The number of retries consumed so far.
    fn retry_count(&self) -> u32;
}

/// Shared retry accounting for stopping conditions.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// Maximum recoverable failures before resolving to error.
    pub max_retries: u32,
    /// Retries consumed so far.
    retry_count: u32,
    /// Message attached when the budget is exhausted.
    pub error_message: String,
}

impl RetryBudget {
    /// Creates a budget allowing `max_retries` recoverable failures.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_count: 0,
            error_message: "Retry budget exhausted".to_string(),
        }
    }

    /// Sets the message used when the budget is exhausted.
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Consumes one retry.
    ///
    /// Returns [`StepStatus::Retry`] while the counter is within budget,
    /// [`StepStatus::Error`] once it is exhausted.
    pub fn consume(&mut self) -> StepStatus {
        self.retry_count += 1;
        if self.retry_count <= self.max_retries {
            tracing::debug!(
                retry = self.retry_count,
                max_retries = self.max_retries,
                "Stopping condition consumed a retry"
            );
            StepStatus::Retry
        } else {
            StepStatus::Error
        }
    }

    /// Retries consumed so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Clears the counter.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }
}

/// Completes when the result carries any non-null value.
///
/// The default condition for one-shot generation steps.
#[derive(Debug, Clone)]
pub struct CompletionCondition {
    budget: RetryBudget,
}

impl CompletionCondition {
    /// Creates a completion condition with the given retry budget.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            budget: RetryBudget::new(max_retries)
                .with_error_message("Step produced no result".to_string()),
        }
    }
}

impl StoppingCondition for CompletionCondition {
    fn evaluate(&mut self, result: &StepResult, _ctx: &PipelineContext) -> StepStatus {
        if result.value.is_null() {
            self.budget.consume()
        } else {
            StepStatus::Complete
        }
    }

    fn reset(&mut self) {
        self.budget.reset();
    }

    fn retry_count(&self) -> u32 {
        self.budget.retry_count()
    }
}

/// Classifier function type for [`CustomCondition`].
pub type Classifier =
    Box<dyn Fn(&StepResult, &PipelineContext) -> anyhow::Result<StepStatus> + Send + Sync>;

/// Wraps an injectable classifier function.
///
/// A classifier error consumes a retry; a returned
/// [`StepStatus::Retry`] is still subject to the budget, so either
/// collapses to error once the budget is gone.
pub struct CustomCondition {
    budget: RetryBudget,
    classifier: Classifier,
}

impl CustomCondition {
    /// Creates a custom condition from a fallible classifier.
    pub fn new<F>(max_retries: u32, classifier: F) -> Self
    where
        F: Fn(&StepResult, &PipelineContext) -> anyhow::Result<StepStatus> + Send + Sync + 'static,
    {
        Self {
            budget: RetryBudget::new(max_retries),
            classifier: Box::new(classifier),
        }
    }
}

impl std::fmt::Debug for CustomCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCondition")
            .field("budget", &self.budget)
            .finish()
    }
}

impl StoppingCondition for CustomCondition {
    fn evaluate(&mut self, result: &StepResult, ctx: &PipelineContext) -> StepStatus {
        match (self.classifier)(result, ctx) {
            Ok(StepStatus::Retry) => self.budget.consume(),
            Ok(status) => status,
            Err(err) => {
                tracing::debug!(error = %err, "Custom classifier failed");
                self.budget.consume()
            }
        }
    }

    fn reset(&mut self) {
        self.budget.reset();
    }

    fn retry_count(&self) -> u32 {
        self.budget.retry_count()
    }
}
