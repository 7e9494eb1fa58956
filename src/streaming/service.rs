//! Service facade tying sessions, the registry, and provider handles
//! together.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use super::{SessionRegistry, StreamSession};
use crate::cancellation::CancelToken;
use crate::errors::LorebookError;
use crate::provider::{ChatMessage, GenerationConfig, Provider, ProviderCache};

/// Persistence hook for completed stream results.
///
/// Saving is best-effort: a failing store never fails the stream that
/// produced the text.
#[async_trait]
pub trait StreamResultStore: Send + Sync {
    /// Persists the full accumulated text of a completed session.
    async fn save_stream_result(
        &self,
        session_id: &str,
        accumulated_text: &str,
    ) -> anyhow::Result<()>;
}

/// Owns the session registry and provider cache, and enforces session
/// ownership on every lookup.
pub struct StreamingService {
    registry: SessionRegistry,
    providers: Arc<ProviderCache>,
    store: Option<Arc<dyn StreamResultStore>>,
}

impl StreamingService {
    /// Creates a service around a provider cache, with no result store.
    #[must_use]
    pub fn new(providers: Arc<ProviderCache>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            providers,
            store: None,
        }
    }

    /// Attaches a result store for completed streams.
    #[must_use]
    pub fn with_result_store(mut self, store: Arc<dyn StreamResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the provider cache.
    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderCache> {
        &self.providers
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Creates, registers, and starts a session for a user.
    pub async fn open_session(
        &self,
        user_id: &str,
        provider: Arc<dyn Provider>,
        model: &str,
        messages: Vec<ChatMessage>,
        config: GenerationConfig,
    ) -> Result<Arc<StreamSession>, LorebookError> {
        let session = StreamSession::new(user_id);
        self.registry.add(Arc::clone(&session));

        if let Err(err) = session
            .start(provider, model, messages, config, self.store.clone())
            .await
        {
            self.registry.remove(session.session_id());
            return Err(err);
        }
        Ok(session)
    }

    /// Looks up a session, enforcing ownership.
    ///
    /// A session belonging to another user is reported as not found, so
    /// callers cannot distinguish "absent" from "not yours".
    pub fn session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Arc<StreamSession>, LorebookError> {
        self.registry
            .get(session_id)
            .filter(|s| s.user_id() == user_id)
            .ok_or_else(|| LorebookError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Cancels a user's session and removes it from the registry.
    pub async fn cancel_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), LorebookError> {
        let session = self.session(user_id, session_id)?;
        session.cancel().await;
        self.registry.remove(session_id);
        Ok(())
    }

    /// Evicts sessions quiet for longer than `max_idle`.
    ///
    /// Stalled non-terminal sessions are canceled first so their
    /// producers shut down. Returns the number of evicted sessions.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let idle = self.registry.idle_sessions(max_idle);
        let count = idle.len();
        for session in idle {
            if session.is_active() {
                session.cancel().await;
            }
            self.registry.remove(session.session_id());
            tracing::info!(session_id = %session.session_id(), "Evicted idle stream session");
        }
        count
    }

    /// Drives the periodic sweeps until the token is canceled.
    ///
    /// Each tick evicts sessions quiet past `max_idle` and sweeps
    /// provider handles past the cache's idle threshold. Spawn this on
    /// a shared service handle as the process's maintenance task.
    pub async fn run_maintenance(
        &self,
        period: StdDuration,
        max_idle: Duration,
        cancel: Arc<CancelToken>,
    ) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Maintenance loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let evicted = self.evict_idle(max_idle).await;
                    let swept = self.providers.sweep_idle().await;
                    if evicted > 0 || swept > 0 {
                        tracing::info!(
                            sessions_evicted = evicted,
                            providers_swept = swept,
                            "Maintenance sweep"
                        );
                    }
                }
            }
        }
    }

    /// Cancels every live session and tears down all provider handles.
    pub async fn shutdown(&self) {
        for session in self.registry.all_sessions() {
            session.cancel().await;
            self.registry.remove(session.session_id());
        }
        let swept = self.providers.sweep_all().await;
        tracing::info!(providers_swept = swept, "Streaming service shut down");
    }
}

impl std::fmt::Debug for StreamingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingService")
            .field("registry", &self.registry)
            .field("providers", &self.providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::SessionStatus;
    use crate::testing::mocks::{MemoryResultStore, ScriptedProvider};
    use pretty_assertions::assert_eq;
    use std::time::Duration as StdDuration;

    fn provider(parts: &[&str]) -> Arc<dyn Provider> {
        Arc::new(ScriptedProvider::new(
            "mock",
            parts.iter().map(ToString::to_string).collect(),
        ))
    }

    fn slow_provider(parts: &[&str]) -> Arc<dyn Provider> {
        Arc::new(
            ScriptedProvider::new("mock", parts.iter().map(ToString::to_string).collect())
                .with_event_delay(StdDuration::from_millis(30)),
        )
    }

    fn service() -> StreamingService {
        StreamingService::new(Arc::new(ProviderCache::new()))
    }

    async fn drain(session: &Arc<StreamSession>) {
        while session.next_chunk().await.is_some() {}
    }

    #[tokio::test]
    async fn test_open_session_registers_and_starts() {
        let service = service();
        let session = service
            .open_session(
                "user-1",
                provider(&["hi"]),
                "m",
                vec![ChatMessage::user("go")],
                GenerationConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(service.registry().len(), 1);
        drain(&session).await;
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_session_lookup_enforces_ownership() {
        let service = service();
        let session = service
            .open_session("user-1", provider(&["x"]), "m", vec![], GenerationConfig::default())
            .await
            .unwrap();
        let id = session.session_id().to_string();

        assert!(service.session("user-1", &id).is_ok());

        // Another user's lookup is indistinguishable from absence.
        let err = service.session("user-2", &id).unwrap_err();
        assert!(matches!(err, LorebookError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_session_removes_from_registry() {
        let service = service();
        let session = service
            .open_session(
                "user-1",
                slow_provider(&["a", "b", "c", "d"]),
                "m",
                vec![],
                GenerationConfig::default(),
            )
            .await
            .unwrap();
        let id = session.session_id().to_string();

        service.cancel_session("user-1", &id).await.unwrap();

        assert_eq!(session.status(), SessionStatus::Error);
        assert!(service.registry().is_empty());
        // Second cancel: the session is gone.
        let err = service.cancel_session("user-1", &id).await.unwrap_err();
        assert!(matches!(err, LorebookError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_evict_idle_reaps_terminal_sessions() {
        let service = service();
        let session = service
            .open_session("user-1", provider(&["x"]), "m", vec![], GenerationConfig::default())
            .await
            .unwrap();
        drain(&session).await;
        assert!(session.is_complete());

        let evicted = service.evict_idle(Duration::hours(1)).await;

        assert_eq!(evicted, 1);
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_evict_idle_cancels_stalled_sessions() {
        let service = service();
        let session = service
            .open_session(
                "user-1",
                slow_provider(&["a", "b", "c", "d", "e", "f"]),
                "m",
                vec![],
                GenerationConfig::default(),
            )
            .await
            .unwrap();

        // A negative window treats every quiet session as stalled.
        let evicted = service
            .evict_idle(Duration::zero() - Duration::seconds(1))
            .await;

        assert_eq!(evicted, 1);
        assert!(service.registry().is_empty());
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all_and_sweeps_providers() {
        let service = service();
        service
            .open_session(
                "user-1",
                slow_provider(&["a", "b", "c"]),
                "m",
                vec![],
                GenerationConfig::default(),
            )
            .await
            .unwrap();
        service
            .open_session(
                "user-2",
                slow_provider(&["d", "e", "f"]),
                "m",
                vec![],
                GenerationConfig::default(),
            )
            .await
            .unwrap();

        service.shutdown().await;

        assert!(service.registry().is_empty());
        assert!(service.providers().is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_loop_sweeps_until_canceled() {
        use crate::provider::ProviderKey;

        let cache = Arc::new(ProviderCache::with_idle_threshold(Duration::zero()));
        cache
            .get_or_create(&ProviderKey::new("mock", "key-1"), || Ok(provider(&["x"])))
            .unwrap();
        let service = Arc::new(StreamingService::new(Arc::clone(&cache)));

        let session = service
            .open_session("user-1", provider(&["x"]), "m", vec![], GenerationConfig::default())
            .await
            .unwrap();
        drain(&session).await;
        assert!(session.is_complete());

        let cancel = CancelToken::new();
        let task = {
            let service = Arc::clone(&service);
            let cancel = Arc::clone(&cancel);
            tokio::spawn(async move {
                service
                    .run_maintenance(StdDuration::from_millis(10), Duration::hours(1), cancel)
                    .await;
            })
        };

        // The loop reaps the terminal session and the idle provider
        // handle without any caller-driven sweep.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(service.registry().is_empty());
        assert!(service.providers().is_empty());

        cancel.cancel("shutting down");
        tokio::time::timeout(StdDuration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_result_store_receives_completed_text() {
        let store = Arc::new(MemoryResultStore::new());
        let service = StreamingService::new(Arc::new(ProviderCache::new()))
            .with_result_store(store.clone() as Arc<dyn StreamResultStore>);

        let session = service
            .open_session("user-1", provider(&["lo", "re"]), "m", vec![], GenerationConfig::default())
            .await
            .unwrap();
        drain(&session).await;

        assert_eq!(store.saved(session.session_id()).as_deref(), Some("lore"));
    }
}
