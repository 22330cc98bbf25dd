//! In-memory session registry
//!
//! Each session sits behind its own async mutex so at most one turn runs on
//! it at a time. Independent sessions never contend.
//!
//! Sessions left idle longer than the store's idle limit are dropped by
//! [`SessionStore::evict_idle`], and the store never holds more than its cap
//! of idle sessions: inserting past the cap evicts the least recently used
//! one. Sessions with a turn in flight are never evicted.

use crate::types::Session;
use crate::{DataChatError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_TOKEN_LEN: usize = 128;

/// Idle time after which a session is dropped, unless configured otherwise
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

/// Live sessions kept before the least recently used idle one is dropped
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

struct Slot {
    session: Arc<Mutex<Session>>,
    /// Milliseconds since the store's origin
    last_used: AtomicU64,
}

impl Slot {
    fn is_busy(&self) -> bool {
        self.session.try_lock().is_err()
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

/// Sessions keyed by their token
pub struct SessionStore {
    assistant_id: String,
    origin: Instant,
    idle_ttl: Duration,
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<Slot>>>,
}

impl SessionStore {
    /// Empty store whose sessions run against `assistant_id`
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            origin: Instant::now(),
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Override the idle limit and the session cap
    pub fn with_limits(mut self, idle_ttl: Duration, max_sessions: usize) -> Self {
        self.idle_ttl = idle_ttl;
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Assistant new sessions are bound to
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Idle time after which a session may be evicted
    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Create a session with a fresh token
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(&id).await;
        id
    }

    /// Resolve a client token, creating the session on first sight
    ///
    /// Missing or malformed tokens get a fresh session.
    pub async fn get_or_create(&self, token: Option<&str>) -> String {
        match token.filter(|t| is_valid_token(t)) {
            Some(token) => {
                if !self.sessions.read().await.contains_key(token) {
                    self.insert(token).await;
                }
                token.to_string()
            }
            None => self.create().await,
        }
    }

    /// Whether a session exists for `token`
    pub async fn contains(&self, token: &str) -> bool {
        self.sessions.read().await.contains_key(token)
    }

    /// Lock an existing session, waiting for any outstanding turn
    ///
    /// Unknown tokens yield `None`; no session is created.
    pub async fn acquire_existing(&self, token: &str) -> Option<OwnedMutexGuard<Session>> {
        let session = {
            let sessions = self.sessions.read().await;
            let slot = sessions.get(token)?;
            self.touch(slot);
            slot.session.clone()
        };
        Some(session.lock_owned().await)
    }

    /// Lock a session for a turn, failing with `SessionBusy` if one is outstanding
    pub async fn try_acquire(&self, token: &str) -> Result<OwnedMutexGuard<Session>> {
        let session = self.slot(token).await;
        session.try_lock_owned().map_err(|_| {
            debug!("Session {} rejected: run outstanding", token);
            DataChatError::SessionBusy(token.to_string())
        })
    }

    /// Lock a session, waiting for any outstanding turn
    pub async fn acquire(&self, token: &str) -> OwnedMutexGuard<Session> {
        self.slot(token).await.lock_owned().await
    }

    /// Drop a session
    pub async fn remove(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every session idle for longer than the idle limit
    ///
    /// Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let now = self.elapsed_ms();
        let ttl = self.idle_ttl.as_millis() as u64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|token, slot| {
            let keep = slot.is_busy() || now.saturating_sub(slot.last_used()) <= ttl;
            if !keep {
                debug!("Evicting idle session {}", token);
            }
            keep
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle session(s), {} left", evicted, sessions.len());
        }
        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `every` until the task is aborted
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.evict_idle().await;
            }
        })
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session exists
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn touch(&self, slot: &Slot) {
        slot.last_used.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    async fn slot(&self, token: &str) -> Arc<Mutex<Session>> {
        if let Some(slot) = self.sessions.read().await.get(token) {
            self.touch(slot);
            return slot.session.clone();
        }
        self.insert(token).await
    }

    async fn insert(&self, token: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().await;
        if let Some(slot) = sessions.get(token) {
            self.touch(slot);
            return slot.session.clone();
        }

        if sessions.len() >= self.max_sessions {
            self.evict_least_recent(&mut sessions);
        }

        info!("Created session {}", token);
        let slot = Arc::new(Slot {
            session: Arc::new(Mutex::new(Session::new(token, &self.assistant_id))),
            last_used: AtomicU64::new(self.elapsed_ms()),
        });
        let session = slot.session.clone();
        sessions.insert(token.to_string(), slot);
        session
    }

    fn evict_least_recent(&self, sessions: &mut HashMap<String, Arc<Slot>>) {
        let oldest = sessions
            .iter()
            .filter(|(_, slot)| !slot.is_busy())
            .min_by_key(|(_, slot)| slot.last_used())
            .map(|(token, _)| token.clone());
        match oldest {
            Some(token) => {
                debug!("Session cap {} reached, evicting {}", self.max_sessions, token);
                sessions.remove(&token);
            }
            None => warn!(
                "Session cap {} reached with every session busy",
                self.max_sessions
            ),
        }
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reuses_valid_token() {
        let store = SessionStore::new("asst-1");
        let id = store.get_or_create(Some("abc-123")).await;
        assert_eq!(id, "abc-123");
        assert_eq!(store.get_or_create(Some("abc-123")).await, "abc-123");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_token_gets_fresh_session() {
        let store = SessionStore::new("asst-1");
        let id = store.get_or_create(Some("../../etc/passwd")).await;
        assert_ne!(id, "../../etc/passwd");
        let guard = store.acquire(&id).await;
        assert_eq!(guard.assistant_id(), "asst-1");
    }

    #[tokio::test]
    async fn test_busy_session_rejected() {
        let store = SessionStore::new("asst-1");
        let id = store.create().await;

        let held = store.try_acquire(&id).await.unwrap();
        let err = store.try_acquire(&id).await.unwrap_err();
        assert!(matches!(err, DataChatError::SessionBusy(_)));

        drop(held);
        assert!(store.try_acquire(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_do_not_contend() {
        let store = SessionStore::new("asst-1");
        let a = store.create().await;
        let b = store.create().await;

        let _held = store.try_acquire(&a).await.unwrap();
        assert!(store.try_acquire(&b).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new("asst-1");
        let id = store.create().await;
        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lookup_does_not_create() {
        let store = SessionStore::new("asst-1");
        assert!(store.acquire_existing("never-seen").await.is_none());
        assert!(!store.contains("never-seen").await);
        assert!(store.is_empty().await);

        let id = store.create().await;
        assert!(store.acquire_existing(&id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_evicted() {
        let store = SessionStore::new("asst-1").with_limits(Duration::from_secs(60), 100);
        let stale = store.create().await;
        let fresh = store.create().await;

        tokio::time::advance(Duration::from_secs(45)).await;
        drop(store.acquire(&fresh).await);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.evict_idle().await, 1);
        assert!(!store.contains(&stale).await);
        assert!(store.contains(&fresh).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_session_survives_eviction() {
        let store = SessionStore::new("asst-1").with_limits(Duration::from_secs(60), 100);
        let id = store.create().await;
        let _held = store.try_acquire(&id).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(store.evict_idle().await, 0);
        assert!(store.contains(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_evicts_least_recently_used() {
        let store = SessionStore::new("asst-1").with_limits(Duration::from_secs(3600), 2);
        let first = store.create().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = store.create().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(store.acquire(&first).await);
        tokio::time::advance(Duration::from_secs(1)).await;

        let third = store.create().await;
        assert_eq!(store.len().await, 2);
        assert!(store.contains(&first).await);
        assert!(!store.contains(&second).await);
        assert!(store.contains(&third).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let store = Arc::new(SessionStore::new("asst-1").with_limits(Duration::from_secs(10), 100));
        store.create().await;
        let sweeper = store.spawn_sweeper(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(store.is_empty().await);
        sweeper.abort();
    }
}
