//! Process-wide bookkeeping of live streaming sessions.

use chrono::Duration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::StreamSession;

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, Arc<StreamSession>>,
    user_sessions: HashMap<String, Vec<String>>,
}

/// Tracks all live sessions per user.
///
/// Both maps live behind one lock so every mutation keeps them
/// consistent atomically: a session id present in a user's list always
/// exists in the session map, and vice versa.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its owning user.
    pub fn add(&self, session: Arc<StreamSession>) {
        let mut inner = self.inner.write();
        let id = session.session_id().to_string();
        inner
            .user_sessions
            .entry(session.user_id().to_string())
            .or_default()
            .push(id.clone());
        inner.sessions.insert(id, session);
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<StreamSession>> {
        self.inner.read().sessions.get(session_id).cloned()
    }

    /// Returns a user's sessions, in registration order.
    #[must_use]
    pub fn get_user_sessions(&self, user_id: &str) -> Vec<Arc<StreamSession>> {
        let inner = self.inner.read();
        inner
            .user_sessions
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes a session from both maps atomically.
    pub fn remove(&self, session_id: &str) -> Option<Arc<StreamSession>> {
        let mut inner = self.inner.write();
        let session = inner.sessions.remove(session_id)?;

        let user_id = session.user_id().to_string();
        if let Some(ids) = inner.user_sessions.get_mut(&user_id) {
            ids.retain(|id| id != session_id);
            if ids.is_empty() {
                inner.user_sessions.remove(&user_id);
            }
        }
        Some(session)
    }

    /// Returns every session qualifying for idle eviction.
    ///
    /// Terminal sessions always qualify; any session quiet for longer
    /// than `max_idle` qualifies regardless of status, so a stalled
    /// active session is still reclaimable.
    #[must_use]
    pub fn idle_sessions(&self, max_idle: Duration) -> Vec<Arc<StreamSession>> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.is_idle(max_idle))
            .cloned()
            .collect()
    }

    /// Returns every registered session.
    #[must_use]
    pub fn all_sessions(&self) -> Vec<Arc<StreamSession>> {
        self.inner.read().sessions.values().cloned().collect()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Returns true if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    /// Checks the cross-map invariant for a session id.
    #[cfg(test)]
    fn user_list_occurrences(&self, session_id: &str) -> usize {
        self.inner
            .read()
            .user_sessions
            .values()
            .map(|ids| ids.iter().filter(|id| id.as_str() == session_id).count())
            .sum()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
