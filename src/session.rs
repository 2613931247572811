//! Per-browser-session state: the pending query text and the transcript
//!
//! A session is created the first time a browser without a session cookie
//! talks to us, and torn down when the browser ends it or after it has been
//! idle for too long. Idle sessions are dropped lazily whenever the store is
//! touched; there is no sweeper task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One question (or uploaded image) and the reply shown for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub query: String,
    pub response: String,
    pub asked_at: DateTime<Utc>,
}

/// State of one UI session
#[derive(Debug, Default)]
pub struct Session {
    pending_input: String,
    transcript: Vec<ChatTurn>,
}

impl Session {
    /// Append a turn to the end of the transcript. Turns are never
    /// reordered, merged or removed.
    pub fn append_turn(&mut self, query: impl Into<String>, response: impl Into<String>) -> &ChatTurn {
        self.transcript.push(ChatTurn {
            query: query.into(),
            response: response.into(),
            asked_at: Utc::now(),
        });
        &self.transcript[self.transcript.len() - 1]
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
    }

    pub fn clear_pending_input(&mut self) {
        self.pending_input.clear();
    }
}

/// Shared handle to one session. Holding its lock serializes submissions
/// for that session.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct SessionEntry {
    session: SessionHandle,
    last_seen: Instant,
}

/// All live sessions, keyed by session id
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Get the session for `id`, creating it on first use
    pub fn open(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        let before = sessions.len();
        sessions.retain(|key, entry| key == id || now.duration_since(entry.last_seen) < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "Dropped idle sessions");
        }

        let entry = sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::info!(session = %id, "Session started");
            SessionEntry {
                session: SessionHandle::default(),
                last_seen: now,
            }
        });

        // An id that outlived its idle window starts over
        if now.duration_since(entry.last_seen) >= self.idle_timeout {
            tracing::info!(session = %id, "Session expired, starting over");
            entry.session = SessionHandle::default();
        }
        entry.last_seen = now;
        entry.session.clone()
    }

    /// Tear down a session. Returns whether it existed.
    ///
    /// Waits for the session's lock first, so a submission already in flight
    /// records its turn before the session goes away.
    pub async fn end(&self, id: &str) -> bool {
        let handle = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.session.clone());
        let Some(handle) = handle else {
            return false;
        };

        let _session = handle.lock().await;
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            // Expiry may have replaced the entry while we waited
            let current = sessions
                .get(id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.session, &handle));
            if current {
                sessions.remove(id);
            }
            current
        };
        if removed {
            tracing::info!(session = %id, "Session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_keeps_insertion_order() {
        let mut session = Session::default();
        let t1 = session.append_turn("first", "one").clone();
        let t2 = session.append_turn("second", "two").clone();
        assert_eq!(session.transcript(), &[t1, t2]);
    }

    #[test]
    fn test_transcript_keeps_duplicates() {
        let mut session = Session::default();
        session.append_turn("same", "answer");
        session.append_turn("same", "answer");
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_pending_input() {
        let mut session = Session::default();
        assert_eq!(session.pending_input(), "");
        session.set_pending_input("What is a Kerley B line?");
        assert_eq!(session.pending_input(), "What is a Kerley B line?");
        session.clear_pending_input();
        assert_eq!(session.pending_input(), "");
    }

    #[tokio::test]
    async fn test_open_returns_same_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.open("a").lock().await.append_turn("q", "r");

        assert_eq!(store.open("a").lock().await.transcript().len(), 1);
        assert!(store.open("b").lock().await.transcript().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_end_tears_down_state() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.open("a").lock().await.set_pending_input("draft");

        assert!(store.end("a").await);
        assert!(!store.end("a").await);
        assert_eq!(store.len(), 0);
        assert_eq!(store.open("a").lock().await.pending_input(), "");
    }

    #[tokio::test]
    async fn test_end_waits_for_in_flight_submission() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let mut session = store.open("a").lock_owned().await;

        let ending = tokio::spawn({
            let store = store.clone();
            async move { store.end("a").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ending.is_finished());
        assert_eq!(store.len(), 1);

        // The submission completes, then the teardown goes through
        session.append_turn("q", "r");
        drop(session);
        assert!(ending.await.unwrap());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_dropped() {
        let store = SessionStore::new(Duration::from_millis(20));
        store.open("old").lock().await.append_turn("q", "r");
        std::thread::sleep(Duration::from_millis(40));

        // Touching another session evicts the idle one
        store.open("new");
        assert_eq!(store.len(), 1);

        // Coming back with the old id starts from scratch
        assert!(store.open("old").lock().await.transcript().is_empty());
    }
}
