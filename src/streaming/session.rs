//! A single streaming-response session.

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use super::service::StreamResultStore;
use crate::cancellation::CancelToken;
use crate::errors::LorebookError;
use crate::provider::{ChatMessage, GenerationConfig, Provider, Usage};
use crate::utils::generate_id;

const CANCEL_MESSAGE: &str = "Stream canceled by user";

/// Lifecycle state of a streaming session.
///
/// `Complete` and `Error` are terminal; once terminal the session
/// refuses further iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet producing.
    Initializing,
    /// Producer running, consumer free to pull.
    Active,
    /// Consumer-side hold; the producer keeps filling the queue.
    Paused,
    /// The provider stream was exhausted normally.
    Complete,
    /// The stream failed or was canceled.
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One chunk of a streaming response.
///
/// `accumulated_text` and `usage` are populated only on the terminal
/// chunk; intermediate chunks carry just their delta so the running
/// buffer is not re-sent on every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Incremental text for this chunk.
    pub text: String,
    /// Full accumulated text, terminal chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated_text: Option<String>,
    /// Token accounting, terminal chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Session status at emission time.
    pub status: SessionStatus,
    /// Error cause, terminal error chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool calls carried by this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    /// Additional annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl StreamChunk {
    /// An intermediate delta chunk.
    #[must_use]
    pub fn delta(text: impl Into<String>, tool_calls: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            accumulated_text: None,
            usage: None,
            status: SessionStatus::Active,
            error: None,
            tool_calls,
            metadata: HashMap::new(),
        }
    }

    /// The terminal chunk of a normally-completed stream.
    #[must_use]
    pub fn terminal_complete(accumulated_text: String, usage: Option<Usage>) -> Self {
        Self {
            text: String::new(),
            accumulated_text: Some(accumulated_text),
            usage,
            status: SessionStatus::Complete,
            error: None,
            tool_calls: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// The terminal chunk of a failed or canceled stream.
    #[must_use]
    pub fn terminal_error(message: impl Into<String>, accumulated_text: String) -> Self {
        Self {
            text: String::new(),
            accumulated_text: Some(accumulated_text),
            usage: None,
            status: SessionStatus::Error,
            error: Some(message.into()),
            tool_calls: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Returns true for the stream-ending chunk.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SessionStatus::Complete | SessionStatus::Error)
    }
}

/// A stateful, queue-backed wrapper over a provider's token stream.
///
/// The background producer appends deltas to the accumulated buffer and
/// enqueues chunks; the consumer pulls them with
/// [`next_chunk`](StreamSession::next_chunk). Producer and consumer
/// synchronize exclusively through the chunk queue (single producer,
/// single consumer). Both sides refresh `last_active`, so idle
/// detection reflects either side going quiet.
pub struct StreamSession {
    session_id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    status: RwLock<SessionStatus>,
    accumulated: RwLock<String>,
    last_active: RwLock<DateTime<Utc>>,
    error: RwLock<Option<String>>,
    chunk_tx: mpsc::UnboundedSender<StreamChunk>,
    chunk_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StreamChunk>>,
    drained: AtomicBool,
    cancel: Arc<CancelToken>,
    producer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    resume_notify: Notify,
}

impl StreamSession {
    /// Creates a session for a user, in the `Initializing` state.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Arc<Self> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        Arc::new(Self {
            session_id: generate_id(),
            user_id: user_id.into(),
            created_at: now,
            status: RwLock::new(SessionStatus::Initializing),
            accumulated: RwLock::new(String::new()),
            last_active: RwLock::new(now),
            error: RwLock::new(None),
            chunk_tx,
            chunk_rx: tokio::sync::Mutex::new(chunk_rx),
            drained: AtomicBool::new(false),
            cancel: CancelToken::new(),
            producer: tokio::sync::Mutex::new(None),
            resume_notify: Notify::new(),
        })
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last-active timestamp.
    #[must_use]
    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.read()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Returns the accumulated text so far.
    #[must_use]
    pub fn accumulated_text(&self) -> String {
        self.accumulated.read().clone()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// True while the session is active or paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status(), SessionStatus::Active | SessionStatus::Paused)
    }

    /// True once the stream completed normally.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status() == SessionStatus::Complete
    }

    /// True once the stream failed or was canceled.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.status() == SessionStatus::Error
    }

    /// True if the session qualifies for idle eviction: already
    /// terminal, or quiet on both sides for longer than `max_idle`.
    #[must_use]
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        if matches!(self.status(), SessionStatus::Complete | SessionStatus::Error) {
            return true;
        }
        Utc::now() - self.last_active() > max_idle
    }

    fn touch(&self) {
        *self.last_active.write() = Utc::now();
    }

    /// Launches the background producer against a provider stream.
    ///
    /// Legal only once, from the `Initializing` state.
    pub async fn start(
        self: &Arc<Self>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        config: GenerationConfig,
        store: Option<Arc<dyn StreamResultStore>>,
    ) -> Result<(), LorebookError> {
        {
            let mut status = self.status.write();
            if *status != SessionStatus::Initializing {
                return Err(LorebookError::InvalidSessionState {
                    session_id: self.session_id.clone(),
                    expected: SessionStatus::Initializing.to_string(),
                    actual: status.to_string(),
                });
            }
            *status = SessionStatus::Active;
        }
        self.touch();

        let session = Arc::clone(self);
        let model = model.into();
        let handle = tokio::spawn(async move {
            session.produce(provider, model, messages, config, store).await;
        });
        *self.producer.lock().await = Some(handle);

        tracing::info!(session_id = %self.session_id, user_id = %self.user_id, "Stream session started");
        Ok(())
    }

    /// The producer loop: pulls provider events, grows the buffer, and
    /// enqueues chunks until exhaustion, failure, or cancellation.
    async fn produce(
        self: Arc<Self>,
        provider: Arc<dyn Provider>,
        model: String,
        messages: Vec<ChatMessage>,
        config: GenerationConfig,
        store: Option<Arc<dyn StreamResultStore>>,
    ) {
        let mut stream = match provider.generate_stream(&messages, &model, &config).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(err.to_string());
                return;
            }
        };

        let mut usage: Option<Usage> = None;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    // Clean early return; cancel() enqueues the terminal
                    // chunk once this acknowledgement lands.
                    tracing::info!(session_id = %self.session_id, "Producer acknowledged cancellation");
                    return;
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        if !event.delta.is_empty() {
                            self.accumulated.write().push_str(&event.delta);
                        }
                        if event.usage.is_some() {
                            usage = event.usage;
                        }
                        self.touch();
                        let _ = self.chunk_tx.send(StreamChunk::delta(event.delta, event.tool_calls));
                    }
                    Some(Err(err)) => {
                        self.fail(err.to_string());
                        return;
                    }
                    None => {
                        // A cancel can land while the final event is in
                        // flight; whichever side claims the terminal
                        // transition under the status lock enqueues the
                        // terminal chunk, the other backs off.
                        {
                            let mut status = self.status.write();
                            if matches!(
                                *status,
                                SessionStatus::Complete | SessionStatus::Error
                            ) {
                                return;
                            }
                            *status = SessionStatus::Complete;
                        }
                        let accumulated = self.accumulated.read().clone();
                        self.touch();
                        let _ = self
                            .chunk_tx
                            .send(StreamChunk::terminal_complete(accumulated.clone(), usage));
                        tracing::info!(
                            session_id = %self.session_id,
                            chars = accumulated.len(),
                            "Stream session complete"
                        );

                        if let Some(store) = store {
                            if let Err(err) =
                                store.save_stream_result(&self.session_id, &accumulated).await
                            {
                                tracing::warn!(
                                    session_id = %self.session_id,
                                    error = %err,
                                    "Best-effort stream result save failed"
                                );
                            }
                        }
                        return;
                    }
                },
            }
        }
    }

    /// Marks the session failed and enqueues the terminal error chunk.
    ///
    /// Backs off if another path (cancel, completion) already claimed
    /// the terminal transition.
    fn fail(&self, message: String) {
        {
            let mut status = self.status.write();
            if matches!(*status, SessionStatus::Complete | SessionStatus::Error) {
                return;
            }
            *status = SessionStatus::Error;
        }
        let accumulated = self.accumulated.read().clone();
        *self.error.write() = Some(message.clone());
        self.touch();
        self.resume_notify.notify_waiters();
        tracing::warn!(session_id = %self.session_id, error = %message, "Stream session failed");
        let _ = self
            .chunk_tx
            .send(StreamChunk::terminal_error(message, accumulated));
    }

    /// Pulls the next chunk.
    ///
    /// Single-pass and non-restartable: after the terminal chunk has
    /// been yielded every further call returns `None`, and a session
    /// that was never started yields nothing (no producer will ever
    /// fill the queue). Waits while the session is paused. Each pull
    /// refreshes `last_active`.
    pub async fn next_chunk(&self) -> Option<StreamChunk> {
        if self.drained.load(Ordering::SeqCst) || self.status() == SessionStatus::Initializing {
            return None;
        }

        loop {
            let status = self.status();
            if status != SessionStatus::Paused {
                break;
            }
            let notified = self.resume_notify.notified();
            if self.status() != SessionStatus::Paused {
                break;
            }
            notified.await;
        }

        let chunk = self.chunk_rx.lock().await.recv().await?;
        self.touch();
        if chunk.is_terminal() {
            self.drained.store(true, Ordering::SeqCst);
        }
        Some(chunk)
    }

    /// Pauses consumption. Legal only from `Active`.
    ///
    /// A consumer-side signal only: the producer keeps filling the
    /// queue, so this is not backpressure on the provider.
    pub fn pause(&self) -> Result<(), LorebookError> {
        let mut status = self.status.write();
        if *status != SessionStatus::Active {
            return Err(LorebookError::InvalidSessionState {
                session_id: self.session_id.clone(),
                expected: SessionStatus::Active.to_string(),
                actual: status.to_string(),
            });
        }
        *status = SessionStatus::Paused;
        Ok(())
    }

    /// Resumes consumption. Legal only from `Paused`.
    pub fn resume(&self) -> Result<(), LorebookError> {
        {
            let mut status = self.status.write();
            if *status != SessionStatus::Paused {
                return Err(LorebookError::InvalidSessionState {
                    session_id: self.session_id.clone(),
                    expected: SessionStatus::Paused.to_string(),
                    actual: status.to_string(),
                });
            }
            *status = SessionStatus::Active;
        }
        self.resume_notify.notify_waiters();
        Ok(())
    }

    /// Cancels the session.
    ///
    /// Legal from any non-terminal state (a no-op on terminal
    /// sessions). Awaits the producer's acknowledgement before
    /// enqueueing the terminal error chunk, so nothing is enqueued
    /// after it.
    pub async fn cancel(&self) {
        {
            let mut status = self.status.write();
            if matches!(*status, SessionStatus::Complete | SessionStatus::Error) {
                return;
            }
            *status = SessionStatus::Error;
        }
        *self.error.write() = Some(CANCEL_MESSAGE.to_string());
        self.cancel.cancel(CANCEL_MESSAGE);
        self.resume_notify.notify_waiters();

        if let Some(handle) = self.producer.lock().await.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %err,
                        "Producer task ended abnormally during cancel"
                    );
                }
            }
        }

        self.touch();
        let accumulated = self.accumulated.read().clone();
        let _ = self
            .chunk_tx
            .send(StreamChunk::terminal_error(CANCEL_MESSAGE, accumulated));
        tracing::info!(session_id = %self.session_id, "Stream session canceled");
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MemoryResultStore, ScriptedProvider};
    use pretty_assertions::assert_eq;
    use std::time::Duration as StdDuration;

    fn deltas(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    async fn drain(session: &Arc<StreamSession>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = session.next_chunk().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_three_events_yield_four_chunks() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["Kel", "en ", "smiths"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "test-model", vec![ChatMessage::user("go")], GenerationConfig::default(), None)
            .await
            .unwrap();

        let chunks = drain(&session).await;

        assert_eq!(chunks.len(), 4);
        // Intermediate chunks omit the accumulated buffer.
        for chunk in &chunks[..3] {
            assert!(chunk.accumulated_text.is_none());
            assert!(!chunk.is_terminal());
        }
        let terminal = &chunks[3];
        assert!(terminal.is_terminal());
        assert_eq!(terminal.status, SessionStatus::Complete);
        assert_eq!(terminal.accumulated_text.as_deref(), Some("Kelen smiths"));
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_consumption_is_single_pass() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["a"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        let chunks = drain(&session).await;
        assert_eq!(chunks.len(), 2);
        // Terminal already yielded; iteration has ended for good.
        assert!(session.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_provider_error_yields_terminal_error_chunk() {
        let provider =
            Arc::new(ScriptedProvider::new("mock", deltas(&["par", "tial", "lost"])).fail_after(2));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        let chunks = drain(&session).await;
        let terminal = chunks.last().unwrap();

        assert_eq!(terminal.status, SessionStatus::Error);
        assert!(terminal.error.is_some());
        // Whatever accumulated before the failure rides on the terminal chunk.
        assert_eq!(terminal.accumulated_text.as_deref(), Some("partial"));
        assert!(session.has_error());
    }

    #[tokio::test]
    async fn test_cancel_active_session() {
        let provider = Arc::new(
            ScriptedProvider::new("mock", deltas(&["a", "b", "c", "d", "e", "f"]))
                .with_event_delay(StdDuration::from_millis(20)),
        );
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        session.cancel().await;

        assert!(session.has_error());
        assert_eq!(session.error().as_deref(), Some(CANCEL_MESSAGE));

        // The queue ends with exactly one terminal error chunk.
        let chunks = drain(&session).await;
        let terminal = chunks.last().unwrap();
        assert_eq!(terminal.status, SessionStatus::Error);
        assert_eq!(terminal.error.as_deref(), Some(CANCEL_MESSAGE));
        assert!(session.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_racing_completion_keeps_one_terminal_state() {
        // Cancel while the final event may be in flight: whichever side
        // wins, the status settles terminally once, the error field
        // matches it, and exactly one terminal chunk is queued.
        let provider = Arc::new(
            ScriptedProvider::new("mock", deltas(&["a", "b"]))
                .with_event_delay(StdDuration::from_millis(5)),
        );
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(8)).await;
        session.cancel().await;

        let status = session.status();
        assert!(matches!(status, SessionStatus::Complete | SessionStatus::Error));
        if status == SessionStatus::Error {
            assert_eq!(session.error().as_deref(), Some(CANCEL_MESSAGE));
        } else {
            assert!(session.error().is_none());
        }

        let chunks = drain(&session).await;
        let terminals = chunks.iter().filter(|c| c.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(chunks.last().unwrap().is_terminal());
        assert_eq!(chunks.last().unwrap().status, status);
    }

    #[tokio::test]
    async fn test_next_chunk_before_start_yields_nothing() {
        let session = StreamSession::new("user-1");
        // No producer exists yet; iteration must not hang.
        assert!(session.next_chunk().await.is_none());
        assert_eq!(session.status(), SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn test_cancel_is_noop_on_terminal_session() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["x"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();
        let _ = drain(&session).await;
        assert!(session.is_complete());

        session.cancel().await;
        // Still complete, not flipped to error.
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_pause_resume_legality() {
        let provider = Arc::new(
            ScriptedProvider::new("mock", deltas(&["a", "b"]))
                .with_event_delay(StdDuration::from_millis(30)),
        );
        let session = StreamSession::new("user-1");

        // Pause before start is illegal.
        assert!(session.pause().is_err());

        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        session.pause().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        assert!(session.is_active());
        // Double pause is illegal.
        assert!(session.pause().is_err());

        session.resume().unwrap();
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.resume().is_err());

        let chunks = drain(&session).await;
        assert!(chunks.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_paused_consumer_waits_until_resume() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["a"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();
        // Let the producer finish filling the queue before pausing.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        // Producer has completed; the session status is terminal, so
        // pause is no longer legal and pulls proceed normally.
        if session.pause().is_ok() {
            let puller = {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.next_chunk().await })
            };
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            assert!(!puller.is_finished());
            session.resume().unwrap();
            assert!(puller.await.unwrap().is_some());
        } else {
            assert!(session.next_chunk().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_completed_stream_saves_result() {
        let store = Arc::new(MemoryResultStore::new());
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["ab", "cd"])));
        let session = StreamSession::new("user-1");
        session
            .start(
                provider,
                "m",
                vec![],
                GenerationConfig::default(),
                Some(store.clone() as Arc<dyn StreamResultStore>),
            )
            .await
            .unwrap();

        let _ = drain(&session).await;
        assert_eq!(store.saved(session.session_id()).as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_stream() {
        let store = Arc::new(MemoryResultStore::new().failing());
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["ok"])));
        let session = StreamSession::new("user-1");
        session
            .start(
                provider,
                "m",
                vec![],
                GenerationConfig::default(),
                Some(store as Arc<dyn StreamResultStore>),
            )
            .await
            .unwrap();

        let chunks = drain(&session).await;
        assert_eq!(chunks.last().unwrap().status, SessionStatus::Complete);
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["x"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider.clone(), "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();

        let err = session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LorebookError::InvalidSessionState { .. }));
    }

    #[tokio::test]
    async fn test_idle_detection() {
        let provider = Arc::new(ScriptedProvider::new("mock", deltas(&["x"])));
        let session = StreamSession::new("user-1");
        session
            .start(provider, "m", vec![], GenerationConfig::default(), None)
            .await
            .unwrap();
        let _ = drain(&session).await;

        // Terminal sessions are always idle.
        assert!(session.is_idle(Duration::hours(1)));

        // An untouched fresh session is only idle past the window.
        let fresh = StreamSession::new("user-2");
        assert!(!fresh.is_idle(Duration::hours(1)));
        assert!(fresh.is_idle(Duration::zero() - Duration::seconds(1)));
    }
}
