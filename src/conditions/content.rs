//! Content-shape stopping conditions: JSON documents, typed records,
//! and pattern matches over model output.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::{RetryBudget, StoppingCondition};
use crate::context::PipelineContext;
use crate::steps::{StepResult, StepStatus};

/// Greedy match for the first bracket-delimited block in a string.
///
/// Models often wrap JSON in prose; the greedy span covers nested
/// brackets because the outermost pair wins.
fn json_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?s)\{.*\}|\[.*\]").unwrap()
    })
}

/// Extracts a structured JSON value from a step result.
///
/// Structured values pass through untouched. Strings are first scanned
/// for a bracket-delimited block; if that fails, the whole string is
/// parsed. Everything else fails extraction.
fn extract_structured(value: &Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value.clone()),
        Value::String(text) => {
            if let Some(found) = json_block_pattern().find(text) {
                if let Ok(parsed) = serde_json::from_str::<Value>(found.as_str()) {
                    return Some(parsed);
                }
            }
            serde_json::from_str::<Value>(text)
                .ok()
                .filter(|v| v.is_object() || v.is_array())
        }
        _ => None,
    }
}

/// Completes when the result parses as a JSON document carrying all
/// required keys.
#[derive(Debug, Clone)]
pub struct JsonCondition {
    budget: RetryBudget,
    required_keys: Vec<String>,
}

impl JsonCondition {
    /// Creates a JSON condition with the given retry budget.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            budget: RetryBudget::new(max_retries)
                .with_error_message("Result never parsed as valid JSON".to_string()),
            required_keys: Vec::new(),
        }
    }

    /// Requires the parsed object to carry all of the given keys.
    #[must_use]
    pub fn with_required_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    fn satisfies(&self, parsed: &Value) -> bool {
        if self.required_keys.is_empty() {
            return true;
        }
        match parsed {
            Value::Object(map) => self.required_keys.iter().all(|k| map.contains_key(k)),
            _ => false,
        }
    }
}

impl StoppingCondition for JsonCondition {
    fn evaluate(&mut self, result: &StepResult, _ctx: &PipelineContext) -> StepStatus {
        match extract_structured(&result.value) {
            Some(parsed) if self.satisfies(&parsed) => StepStatus::Complete,
            _ => self.budget.consume(),
        }
    }

    fn reset(&mut self) {
        self.budget.reset();
    }

    fn retry_count(&self) -> u32 {
        self.budget.retry_count()
    }
}

/// Validator function type for [`TypedRecordCondition`].
pub type RecordValidator = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Completes when the result parses as JSON and deserializes into a
/// registered record type.
pub struct TypedRecordCondition {
    budget: RetryBudget,
    type_name: &'static str,
    validator: RecordValidator,
}

impl TypedRecordCondition {
    /// Creates a condition validating against the record type `T`.
    #[must_use]
    pub fn of<T: serde::de::DeserializeOwned>(max_retries: u32) -> Self {
        Self {
            budget: RetryBudget::new(max_retries),
            type_name: std::any::type_name::<T>(),
            validator: Box::new(|value| {
                serde_json::from_value::<T>(value.clone())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        }
    }
}

impl std::fmt::Debug for TypedRecordCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedRecordCondition")
            .field("type_name", &self.type_name)
            .field("budget", &self.budget)
            .finish()
    }
}

impl StoppingCondition for TypedRecordCondition {
    fn evaluate(&mut self, result: &StepResult, _ctx: &PipelineContext) -> StepStatus {
        let Some(parsed) = extract_structured(&result.value) else {
            return self.budget.consume();
        };

        match (self.validator)(&parsed) {
            Ok(()) => StepStatus::Complete,
            Err(reason) => {
                tracing::debug!(
                    record_type = self.type_name,
                    reason = %reason,
                    "Result did not validate as the expected record"
                );
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

/// A single pattern to check against stringified output.
#[derive(Debug, Clone)]
pub enum PatternMatcher {
    /// A compiled regular expression.
    Regex(Regex),
    /// A literal substring.
    Substring(String),
}

impl PatternMatcher {
    /// Compiles a regex matcher.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Creates a substring matcher.
    #[must_use]
    pub fn substring(needle: impl Into<String>) -> Self {
        Self::Substring(needle.into())
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            Self::Substring(needle) => text.contains(needle.as_str()),
        }
    }
}

/// Completes when the stringified result matches the configured
/// patterns and clears the minimum-length floor.
#[derive(Debug, Clone)]
pub struct PatternCondition {
    budget: RetryBudget,
    patterns: Vec<PatternMatcher>,
    min_length: Option<usize>,
    require_all: bool,
}

impl PatternCondition {
    /// Creates a pattern condition with the given retry budget.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            budget: RetryBudget::new(max_retries),
            patterns: Vec::new(),
            min_length: None,
            require_all: true,
        }
    }

    /// Adds a pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: PatternMatcher) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Sets the minimum length floor for the stringified result.
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Toggles AND (`true`, default) vs OR semantics over the pattern list.
    #[must_use]
    pub fn require_all(mut self, require_all: bool) -> Self {
        self.require_all = require_all;
        self
    }

    fn satisfied(&self, text: &str) -> bool {
        if let Some(min) = self.min_length {
            if text.len() < min {
                return false;
            }
        }
        if self.patterns.is_empty() {
            return true;
        }
        if self.require_all {
            self.patterns.iter().all(|p| p.matches(text))
        } else {
            self.patterns.iter().any(|p| p.matches(text))
        }
    }
}

impl StoppingCondition for PatternCondition {
    fn evaluate(&mut self, result: &StepResult, _ctx: &PipelineContext) -> StepStatus {
        if self.satisfied(&result.value_as_text()) {
            StepStatus::Complete
        } else {
            self.budget.consume()
        }
    }

    fn reset(&mut self) {
        self.budget.reset();
    }

    fn retry_count(&self) -> u32 {
        self.budget.retry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> PipelineContext {
        PipelineContext::new("wf-test")
    }

    #[test]
    fn test_json_extraction_from_prose() {
        let mut cond = JsonCondition::new(2).with_required_keys(["a", "b"]);
        let result = StepResult::pending(json!(r#"Sure! {"a":1,"b":2} thanks"#));

        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Complete);
    }

    #[test]
    fn test_json_missing_required_key_exhausts() {
        let mut cond = JsonCondition::new(1).with_required_keys(["c"]);
        let result = StepResult::pending(json!(r#"Sure! {"a":1,"b":2} thanks"#));

        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Retry);
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Error);
    }

    #[test]
    fn test_json_structured_value_skips_parsing() {
        let mut cond = JsonCondition::new(0).with_required_keys(["name"]);
        let result = StepResult::pending(json!({"name": "Kelen", "role": "smith"}));

        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Complete);
    }

    #[test]
    fn test_json_whole_string_fallback() {
        // No prose wrapper; the whole string is the document.
        let mut cond = JsonCondition::new(0);
        let result = StepResult::pending(json!(r#"[1, 2, 3]"#));
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Complete);
    }

    #[test]
    fn test_json_array_fails_required_keys() {
        let mut cond = JsonCondition::new(0).with_required_keys(["a"]);
        let result = StepResult::pending(json!("[1, 2]"));
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Error);
    }

    #[test]
    fn test_json_non_string_scalar_fails() {
        let mut cond = JsonCondition::new(0);
        let result = StepResult::pending(json!(42));
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Error);
    }

    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct ArticleStub {
        title: String,
        summary: String,
    }

    #[test]
    fn test_typed_record_valid() {
        let mut cond = TypedRecordCondition::of::<ArticleStub>(1);
        let result = StepResult::pending(json!(
            r#"Here you go: {"title":"The Forge","summary":"A smith's rise."}"#
        ));
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Complete);
    }

    #[test]
    fn test_typed_record_invalid_consumes_retry() {
        let mut cond = TypedRecordCondition::of::<ArticleStub>(1);
        let result = StepResult::pending(json!(r#"{"title":"The Forge"}"#));

        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Retry);
        assert_eq!(cond.retry_count(), 1);
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Error);
    }

    #[test]
    fn test_pattern_require_all() {
        let mut cond = PatternCondition::new(0)
            .with_pattern(PatternMatcher::substring("# "))
            .with_pattern(PatternMatcher::regex(r"\bKelen\b").unwrap());

        let good = StepResult::pending(json!("# Kelen\nA smith of the northern quarter."));
        assert_eq!(cond.evaluate(&good, &ctx()), StepStatus::Complete);

        let mut cond = PatternCondition::new(0)
            .with_pattern(PatternMatcher::substring("# "))
            .with_pattern(PatternMatcher::regex(r"\bKelen\b").unwrap());
        let partial = StepResult::pending(json!("# Someone else"));
        assert_eq!(cond.evaluate(&partial, &ctx()), StepStatus::Error);
    }

    #[test]
    fn test_pattern_any_semantics() {
        let mut cond = PatternCondition::new(0)
            .require_all(false)
            .with_pattern(PatternMatcher::substring("missing"))
            .with_pattern(PatternMatcher::substring("present"));

        let result = StepResult::pending(json!("the word present appears"));
        assert_eq!(cond.evaluate(&result, &ctx()), StepStatus::Complete);
    }

    #[test]
    fn test_pattern_min_length_floor() {
        let mut cond = PatternCondition::new(1).with_min_length(20);
        let short = StepResult::pending(json!("too short"));

        assert_eq!(cond.evaluate(&short, &ctx()), StepStatus::Retry);
        assert_eq!(cond.retry_count(), 1);
    }
}
