//! Scripted provider and in-memory result store.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::provider::{
    ChatMessage, EventStream, GenerationConfig, Provider, ProviderResponse, StreamEvent, Usage,
};
use crate::streaming::StreamResultStore;

/// A provider that replays a scripted sequence of deltas.
///
/// The stream emits one event per delta, attaching usage totals to the
/// last one. [`fail_after`](ScriptedProvider::fail_after) truncates the
/// script after `n` successful events and ends the stream with an error
/// item instead.
pub struct ScriptedProvider {
    name: String,
    deltas: Vec<String>,
    event_delay: Duration,
    fail_after: Option<usize>,
    fail_close: bool,
}

impl ScriptedProvider {
    /// Creates a provider that streams the given deltas in order.
    #[must_use]
    pub fn new(name: impl Into<String>, deltas: Vec<String>) -> Self {
        Self {
            name: name.into(),
            deltas,
            event_delay: Duration::ZERO,
            fail_after: None,
            fail_close: false,
        }
    }

    /// Emits `n` successful events, then a stream error.
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Delays each event by `delay`, so tests can interleave consumer
    /// actions with an in-flight stream.
    #[must_use]
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Makes the cleanup hook fail.
    #[must_use]
    pub fn fail_on_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn usage(&self, messages: &[ChatMessage]) -> Usage {
        let chars = |s: &str| u32::try_from(s.len()).unwrap_or(u32::MAX);
        Usage {
            prompt_tokens: messages.iter().map(|m| chars(&m.content)).sum(),
            completion_tokens: self.deltas.iter().map(|d| chars(d)).sum(),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        _config: &GenerationConfig,
    ) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            content: self.deltas.concat(),
            model: model.to_string(),
            usage: Some(self.usage(messages)),
            finish_reason: Some("stop".to_string()),
            tool_calls: Vec::new(),
        })
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _config: &GenerationConfig,
    ) -> Result<EventStream, ProviderError> {
        let mut events: Vec<Result<StreamEvent, ProviderError>> = Vec::new();

        if let Some(n) = self.fail_after {
            for delta in self.deltas.iter().take(n) {
                events.push(Ok(StreamEvent {
                    delta: delta.clone(),
                    ..StreamEvent::default()
                }));
            }
            events.push(Err(ProviderError::Stream(
                "scripted stream failure".to_string(),
            )));
        } else {
            let last = self.deltas.len().saturating_sub(1);
            let usage = self.usage(messages);
            for (i, delta) in self.deltas.iter().enumerate() {
                events.push(Ok(StreamEvent {
                    delta: delta.clone(),
                    usage: (i == last).then_some(usage),
                    tool_calls: Vec::new(),
                }));
            }
        }

        let delay = self.event_delay;
        Ok(futures::stream::iter(events)
            .then(move |event| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                event
            })
            .boxed())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if self.fail_close {
            return Err(ProviderError::Cleanup(
                "scripted cleanup failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// An in-memory [`StreamResultStore`].
#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<String, String>>,
    fail: bool,
}

impl MemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save fail, for exercising the best-effort path.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Returns the saved text for a session, if any.
    #[must_use]
    pub fn saved(&self, session_id: &str) -> Option<String> {
        self.results.lock().get(session_id).cloned()
    }
}

#[async_trait]
impl StreamResultStore for MemoryResultStore {
    async fn save_stream_result(
        &self,
        session_id: &str,
        accumulated_text: &str,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("scripted store failure");
        }
        self.results
            .lock()
            .insert(session_id.to_string(), accumulated_text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_stream_replays_deltas() {
        let provider = ScriptedProvider::new("mock", vec!["a".to_string(), "b".to_string()]);
        let mut stream = provider
            .generate_stream(&[], "m", &GenerationConfig::default())
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "a");
        assert!(first.usage.is_none());

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.delta, "b");
        assert!(second.usage.is_some());

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fail_after_truncates_script() {
        let provider =
            ScriptedProvider::new("mock", vec!["a".to_string(), "b".to_string()]).fail_after(1);
        let mut stream = provider
            .generate_stream(&[], "m", &GenerationConfig::default())
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryResultStore::new();
        store.save_stream_result("s1", "hello").await.unwrap();
        assert_eq!(store.saved("s1").as_deref(), Some("hello"));
        assert!(store.saved("s2").is_none());
    }

    #[tokio::test]
    async fn test_failing_store_errors() {
        let store = MemoryResultStore::new().failing();
        assert!(store.save_stream_result("s1", "x").await.is_err());
    }
}
