//! The language-model provider seam.
//!
//! The engine consumes providers as capability objects: given a model
//! name and message list they return either a completed response or an
//! incremental event stream. Wire protocols are entirely the
//! collaborator's responsibility.

mod cache;

pub use cache::{ProviderCache, ProviderKey};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ProviderError;

/// A single chat message handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role ("system", "user", "assistant").
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Generation parameters forwarded to the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Provider-specific extras, passed through opaquely.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced by the completion.
    pub completion_tokens: u32,
}

impl Usage {
    /// Total tokens across prompt and completion.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A completed (non-streaming) provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced it.
    pub model: String,
    /// Token accounting, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
}

/// One incremental event from a provider stream.
///
/// Completion is signaled by stream exhaustion; failures arrive as
/// `Err` items.
#[derive(Debug, Clone, Default)]
pub struct StreamEvent {
    /// Incremental text delta.
    pub delta: String,
    /// Usage totals, typically only on the last event.
    pub usage: Option<Usage>,
    /// Tool calls carried by this event.
    pub tool_calls: Vec<serde_json::Value>,
}

/// The incremental event stream a provider returns.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ProviderError>>;

/// Capability object for a language-model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The provider's name (used for cache keying and logs).
    fn name(&self) -> &str;

    /// Runs a generation to completion.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        config: &GenerationConfig,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Opens an incremental event stream for a generation.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        config: &GenerationConfig,
    ) -> Result<EventStream, ProviderError>;

    /// Cleanup hook invoked when the handle is evicted from the cache.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
