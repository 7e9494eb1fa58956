//! Step result and status types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Classification of a single step iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The result is not final; hand it to the continue-processing hook.
    Continue,
    /// The step produced its final output.
    Complete,
    /// The iteration failed in a recoverable way; try again.
    Retry,
    /// The step failed; end the pipeline gracefully.
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Continue => "continue",
            Self::Complete => "complete",
            Self::Retry => "retry",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The outcome of one step iteration.
///
/// Created fresh per iteration; it only outlives the owning loop as an
/// accumulation into the [`crate::context::PipelineContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Opaque payload, or the raw step output if not explicitly classified.
    pub value: Value,
    /// Iteration classification.
    pub status: StepStatus,
    /// Cause, for error results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional diagnostics.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl StepResult {
    /// Creates a result pending stopping-condition evaluation.
    #[must_use]
    pub fn pending(value: Value) -> Self {
        Self {
            value,
            status: StepStatus::Continue,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a completed result.
    #[must_use]
    pub fn complete(value: Value) -> Self {
        Self {
            value,
            status: StepStatus::Complete,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates an error result with a cause.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            status: StepStatus::Error,
            error: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Renders the result value as a string for pattern matching.
    ///
    /// Strings render unquoted; other values render as compact JSON.
    #[must_use]
    pub fn value_as_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// What a step's `execute` hands back: either a raw value awaiting
/// classification, or an already-classified result that bypasses the
/// stopping condition.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// Unclassified payload; treated as [`StepStatus::Continue`] pending
    /// stopping-condition evaluation.
    Raw(Value),
    /// Explicitly classified result.
    Classified(StepResult),
}

impl StepOutput {
    /// Normalizes into a [`StepResult`].
    #[must_use]
    pub fn into_result(self) -> StepResult {
        match self {
            Self::Raw(value) => StepResult::pending(value),
            Self::Classified(result) => result,
        }
    }
}

impl From<Value> for StepOutput {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

impl From<StepResult> for StepOutput {
    fn from(result: StepResult) -> Self {
        Self::Classified(result)
    }
}
