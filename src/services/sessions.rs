use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{ContextDefaults, ConversationContext};

pub type SharedContext = Arc<tokio::sync::Mutex<ConversationContext>>;

/// Owns every conversation context. Turns for one session serialize on the
/// context's async mutex; different sessions never contend.
pub struct SessionStore {
    defaults: ContextDefaults,
    idle_timeout: TimeDelta,
    sessions: Mutex<HashMap<String, SharedContext>>,
}

impl SessionStore {
    pub fn new(defaults: ContextDefaults, idle_timeout: TimeDelta) -> Self {
        Self {
            defaults,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<SharedContext> {
        self.lock().get(id).cloned()
    }

    pub fn get_or_create(&self, id: &str) -> SharedContext {
        self.lock()
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session = %id, "new session");
                Arc::new(tokio::sync::Mutex::new(ConversationContext::new(
                    id,
                    &self.defaults,
                )))
            })
            .clone()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts sessions idle for longer than the timeout. Sessions in the
    /// middle of a turn are kept.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, ctx| match ctx.try_lock() {
            Ok(ctx) => now - ctx.last_activity <= self.idle_timeout,
            Err(_) => true,
        });
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::info!(expired, "evicted idle sessions");
        }
        expired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedContext>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(ContextDefaults::default(), TimeDelta::minutes(30))
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_context() {
        let store = store();
        assert!(store.get("abc").is_none());

        let first = store.get_or_create("abc");
        first.lock().await.record_user_message("hello", Utc::now());
        let second = store.get_or_create("abc");
        assert_eq!(second.lock().await.history().len(), 1);
        assert_eq!(store.len(), 1);

        assert!(store.remove("abc"));
        assert!(!store.remove("abc"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expire_idle() {
        let store = store();
        let now = Utc::now();
        store
            .get_or_create("stale")
            .lock()
            .await
            .record_user_message("hi", now - TimeDelta::minutes(45));
        store
            .get_or_create("fresh")
            .lock()
            .await
            .record_user_message("hi", now - TimeDelta::minutes(5));

        let busy = store.get_or_create("busy");
        busy.lock().await.last_activity = now - TimeDelta::hours(3);
        let _turn = busy.lock().await;

        assert_eq!(store.expire_idle(now), 1);
        assert!(store.get("stale").is_none());
        assert!(store.get("fresh").is_some());
        assert!(store.get("busy").is_some());
    }
}
