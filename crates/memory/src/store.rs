//! In-memory session store: one serialized history per session key.
//!
//! The key map is only held long enough to find or create a session. Each
//! session has its own async mutex, which the orchestrator holds for a whole
//! user turn, so messages for one key run in arrival order while other keys
//! proceed independently.

use chrono::{Duration, Utc};
use ichika_config::MemoryConfig;
use ichika_core::error::MemoryError;
use ichika_core::session::{Session, SessionKey, Turn};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

type SharedSession = Arc<Mutex<Session>>;

/// Bounded store of conversation sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SharedSession>>,
    max_turns: usize,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: config.max_turns_per_session,
            ttl: i64::try_from(config.session_ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::days(365 * 100)),
            max_sessions: config.max_sessions,
        }
    }

    /// Get the session for `key`, creating it on first access.
    pub async fn get(&self, key: &SessionKey) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(key) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(key) {
            return session.clone();
        }

        let now = Utc::now();
        Self::evict_idle(&mut sessions, self.ttl, now);
        while sessions.len() >= self.max_sessions {
            if !Self::evict_least_recent(&mut sessions) {
                break;
            }
        }

        debug!(session = %key, "Creating session");
        let session = Arc::new(Mutex::new(Session::new(key.clone())));
        sessions.insert(key.clone(), session.clone());
        session
    }

    /// Lock the session for `key`, waiting for any turn already in progress.
    pub async fn lock(&self, key: &SessionKey) -> SessionGuard {
        let session = self.get(key).await;
        SessionGuard {
            inner: session.lock_owned().await,
            max_turns: self.max_turns,
        }
    }

    /// Append one turn to the session for `key`.
    pub async fn append(&self, key: &SessionKey, turn: Turn) -> Result<(), MemoryError> {
        self.lock(key).await.append(turn)
    }

    /// A copy of the turns recorded for `key`; empty for unknown keys.
    pub async fn snapshot(&self, key: &SessionKey) -> Vec<Turn> {
        let session = self.sessions.read().await.get(key).cloned();
        match session {
            Some(session) => session.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Forget the session for `key`. Returns whether it was removed; a
    /// session that is locked or handed out is left in place.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(key) {
            Some(session) if idle_since(session).is_some() => {
                debug!(session = %key, "Removing session");
                sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drop sessions idle for longer than the configured TTL.
    pub async fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::evict_idle(&mut sessions, self.ttl, Utc::now())
    }

    fn evict_idle(
        sessions: &mut HashMap<SessionKey, SharedSession>,
        ttl: Duration,
        now: chrono::DateTime<Utc>,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|key, session| {
            let Some(last_active) = idle_since(session) else {
                return true;
            };
            let expired = now - last_active > ttl;
            if expired {
                debug!(session = %key, "Evicting idle session");
            }
            !expired
        });
        before - sessions.len()
    }

    fn evict_least_recent(sessions: &mut HashMap<SessionKey, SharedSession>) -> bool {
        let oldest = sessions
            .iter()
            .filter_map(|(key, session)| idle_since(session).map(|t| (key.clone(), t)))
            .min_by_key(|(_, t)| *t)
            .map(|(key, _)| key);

        match oldest {
            Some(key) => {
                debug!(session = %key, "Evicting least recently active session");
                sessions.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Last activity of a session nobody is using; `None` while it is locked or
/// handed out.
fn idle_since(session: &SharedSession) -> Option<chrono::DateTime<Utc>> {
    if Arc::strong_count(session) > 1 {
        return None;
    }
    session.try_lock().ok().map(|s| s.last_active)
}

/// Exclusive access to one session for the duration of a user turn.
pub struct SessionGuard {
    inner: OwnedMutexGuard<Session>,
    max_turns: usize,
}

impl SessionGuard {
    /// Append a turn, then drop whole leading exchanges beyond the turn cap.
    pub fn append(&mut self, turn: Turn) -> Result<(), MemoryError> {
        self.inner.push(turn)?;
        let dropped = self.inner.trim_front(self.max_turns);
        if dropped > 0 {
            debug!(session = %self.inner.key, dropped, "Trimmed session history");
        }
        Ok(())
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ichika_core::session::Role;
    use ichika_core::tool::ToolInvocation;

    fn store(max_turns: usize, ttl_secs: u64, max_sessions: usize) -> SessionStore {
        SessionStore::new(&MemoryConfig {
            max_turns_per_session: max_turns,
            session_ttl_secs: ttl_secs,
            max_sessions,
        })
    }

    #[tokio::test]
    async fn get_is_idempotent() {
        let store = store(100, 3600, 10);
        let key = SessionKey::from("traq:user:a");
        let first = store.get(&key).await;
        let second = store.get(&key).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn append_and_snapshot() {
        let store = store(100, 3600, 10);
        let key = SessionKey::from("traq:user:a");
        store.append(&key, Turn::user("q")).await.unwrap();
        store.append(&key, Turn::assistant("a")).await.unwrap();

        let turns = store.snapshot(&key).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "a");
        assert!(store.snapshot(&"unknown".into()).await.is_empty());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let store = store(100, 3600, 10);
        store.append(&"a".into(), Turn::user("for a")).await.unwrap();
        store.append(&"b".into(), Turn::user("for b")).await.unwrap();
        assert_eq!(store.snapshot(&"a".into()).await[0].content, "for a");
        assert_eq!(store.snapshot(&"b".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn append_trims_whole_exchanges() {
        let store = store(3, 3600, 10);
        let key = SessionKey::from("k");
        let call = ToolInvocation {
            id: "c1".into(),
            name: "wiki_search".into(),
            arguments: serde_json::json!({"query": "x"}),
        };

        let mut guard = store.lock(&key).await;
        guard.append(Turn::user("q1")).unwrap();
        guard.append(Turn::tool_request("", vec![call.clone()])).unwrap();
        guard.append(Turn::observation(&call, "obs")).unwrap();
        guard.append(Turn::assistant("a1")).unwrap();
        guard.append(Turn::user("q2")).unwrap();
        drop(guard);

        let turns = store.snapshot(&key).await;
        assert_eq!(turns[0].content, "q2");
        assert!(turns.iter().all(|t| t.role != Role::Tool));
    }

    #[tokio::test]
    async fn lock_serializes_same_key() {
        let store = Arc::new(store(100, 3600, 10));
        let key = SessionKey::from("k");
        let guard = store.lock(&key).await;

        let waiter = {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                store.append(&key, Turn::user("second")).await.unwrap();
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // Other keys are not blocked
        store.append(&"other".into(), Turn::user("x")).await.unwrap();

        let mut guard = guard;
        guard.append(Turn::user("first")).unwrap();
        drop(guard);
        waiter.await.unwrap();

        let turns = store.snapshot(&key).await;
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].content, "second");
    }

    #[tokio::test]
    async fn expired_sessions_are_evicted_unless_locked() {
        let store = store(100, 0, 10);
        let busy = store.lock(&"busy".into()).await;
        store.append(&"idle".into(), Turn::user("x")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let evicted = store.evict_expired().await;
        assert_eq!(evicted, 1);
        assert_eq!(store.len().await, 1);
        drop(busy);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let store = store(100, 3600, 2);
        store.append(&"a".into(), Turn::user("1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append(&"b".into(), Turn::user("2")).await.unwrap();
        store.append(&"c".into(), Turn::user("3")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.snapshot(&"a".into()).await.is_empty());
        assert_eq!(store.snapshot(&"b".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn remove_forgets_session() {
        let store = store(100, 3600, 10);
        store.append(&"a".into(), Turn::user("1")).await.unwrap();
        assert!(store.remove(&"a".into()).await);
        assert!(!store.remove(&"a".into()).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_leaves_locked_session_in_place() {
        let store = store(100, 3600, 10);
        let key = SessionKey::from("k");
        let mut guard = store.lock(&key).await;
        guard.append(Turn::user("first")).unwrap();

        assert!(!store.remove(&key).await);
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), store.lock(&key)).await;
        assert!(second.is_err(), "second lock acquired while first held");

        drop(guard);
        store.append(&key, Turn::user("second")).await.unwrap();
        let contents: Vec<String> = store.snapshot(&key).await.into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["first", "second"]);

        assert!(store.remove(&key).await);
        assert!(store.is_empty().await);
    }
}
