//! The mutable data/metadata carrier threaded through a pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::steps::StepStatus;

/// Directive controlling whether the pipeline keeps flowing after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// Continue to the next step.
    #[default]
    Continue,
    /// End the pipeline.
    End,
}

/// The context threaded through every pipeline step.
///
/// A context instance is exclusively owned by the step currently
/// processing it. Parallel composites fork one child context per branch
/// with [`PipelineContext::with_step`] and merge children back into a
/// fresh consolidated context they own; contexts are never shared
/// between concurrently-running branches.
///
/// Steps write their outcome under the deterministic keys
/// `"{step}_result"` and `"{step}_status"`, so downstream steps can read
/// prior output without a compile-time dependency on the producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Opaque correlation id for the whole workflow run.
    pub workflow_id: String,
    /// Name of the currently (or most recently) executing step.
    pub step_id: String,
    /// Insertion-ordered step data, keyed by string.
    data: serde_json::Map<String, Value>,
    /// Diagnostic annotations (durations, success flags, error text).
    metadata: HashMap<String, Value>,
    /// Flow directive for the pipeline driver.
    pub flow_control: FlowControl,
}

impl PipelineContext {
    /// Creates a new context for a workflow run.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            step_id: String::new(),
            data: serde_json::Map::new(),
            metadata: HashMap::new(),
            flow_control: FlowControl::Continue,
        }
    }

    /// Forks a child context for the named step.
    ///
    /// Copy-on-branch: the child carries a copy of the parent's data and
    /// metadata and a fresh `Continue` flow directive.
    #[must_use]
    pub fn with_step(&self, step: impl Into<String>) -> Self {
        Self {
            workflow_id: self.workflow_id.clone(),
            step_id: step.into(),
            data: self.data.clone(),
            metadata: self.metadata.clone(),
            flow_control: FlowControl::Continue,
        }
    }

    /// Sets a raw data value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Gets a raw data value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a data value deserialized into a concrete type.
    ///
    /// Returns `None` if the key is absent or the value does not fit the
    /// requested type.
    #[must_use]
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns an iterator over the data entries in insertion order.
    pub fn data_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Sets a metadata annotation.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Gets a metadata annotation.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Returns all metadata annotations.
    #[must_use]
    pub fn all_metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Records a step's outcome under its deterministic keys.
    pub fn record_result(&mut self, step: &str, value: Value, status: StepStatus) {
        self.data.insert(Self::result_key(step), value);
        self.data
            .insert(Self::status_key(step), Value::String(status.to_string()));
    }

    /// Records a step's error annotation under `"{step}_error"`.
    pub fn record_error(&mut self, step: &str, message: impl Into<String>) {
        self.metadata
            .insert(format!("{step}_error"), Value::String(message.into()));
    }

    /// Reads a prior step's result value.
    #[must_use]
    pub fn result_of(&self, step: &str) -> Option<&Value> {
        self.data.get(&Self::result_key(step))
    }

    /// Reads a prior step's recorded status.
    #[must_use]
    pub fn status_of(&self, step: &str) -> Option<&str> {
        self.data.get(&Self::status_key(step)).and_then(Value::as_str)
    }

    /// The deterministic result key for a step name.
    #[must_use]
    pub fn result_key(step: &str) -> String {
        format!("{step}_result")
    }

    /// The deterministic status key for a step name.
    #[must_use]
    pub fn status_key(step: &str) -> String {
        format!("{step}_status")
    }
}
