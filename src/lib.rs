//! # Lorebook
//!
//! The pipeline-execution and streaming-session engine behind a
//! spoiler-free encyclopedia generator for serialized fiction.
//!
//! Lorebook runs multi-step, LLM-backed generation pipelines over story
//! chapters and exposes long-lived streaming sessions for interactive
//! consumption:
//!
//! - **Stopping conditions**: stateful classifiers that decide whether a
//!   step's output is final, needs retrying, or is a fatal failure
//! - **Enhanced steps**: named units of generation work wrapped in a
//!   bounded retry loop
//! - **Composite parallel steps**: bounded-concurrency fan-out/fan-in
//!   with optional fail-fast
//! - **Streaming sessions**: queue-backed, cancellable wrappers over a
//!   provider's incremental token stream
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lorebook::prelude::*;
//!
//! let step = EnhancedStep::new("summarize", logic)
//!     .with_condition(CompletionCondition::new(3));
//!
//! let ctx = PipelineContext::new("workflow-1");
//! let ctx = step.process(ctx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod conditions;
pub mod context;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod steps;
pub mod streaming;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancelToken;
    pub use crate::conditions::{
        CompletionCondition, CustomCondition, JsonCondition, PatternCondition, PatternMatcher,
        RetryBudget, StoppingCondition, TypedRecordCondition,
    };
    pub use crate::context::{FlowControl, PipelineContext};
    pub use crate::errors::{LorebookError, ProviderError};
    pub use crate::provider::{
        ChatMessage, GenerationConfig, Provider, ProviderCache, ProviderResponse, StreamEvent,
        Usage,
    };
    pub use crate::steps::{
        CompositeParallelStep, EnhancedStep, FnStepLogic, StepLogic, StepOutput, StepResult,
        StepStatus,
    };
    pub use crate::streaming::{
        SessionRegistry, SessionStatus, StreamChunk, StreamResultStore, StreamSession,
        StreamingService,
    };
    pub use crate::utils::{generate_id, now};
}
