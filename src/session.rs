use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::settings::DEFAULT_SESSION_TTL_SECS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Local wall clock, `HH:MM:SS`.
    pub timestamp: String,
    pub user_text: String,
    pub assistant_text: String,
}

impl ConversationTurn {
    pub fn now(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
        }
    }
}

/// Chronological, append-only. The only other mutation is `clear`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self { Self::default() }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize { self.turns.len() }
    pub fn is_empty(&self) -> bool { self.turns.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> { self.turns.iter() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub log: ConversationLog,
}

impl Session {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), created_at: Utc::now(), log: ConversationLog::new() }
    }
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}

pub type SessionHandle = Arc<Mutex<Session>>;

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// In-memory sessions. Each session sits behind its own mutex so a submission
/// holds it for the whole agent call without blocking other sessions.
/// Sessions not seen for `idle_ttl` are dropped by `reap_idle`.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::with_idle_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECS)) }
}

impl SessionStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), idle_ttl }
    }

    pub fn idle_ttl(&self) -> Duration { self.idle_ttl }

    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let mut sessions = self.sessions.write().await;
        insert_new(&mut sessions, Instant::now())
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).map(|e| e.handle.clone())
    }

    /// Existing session for `id`, or a fresh one when absent or unknown.
    /// The flag is true when a session was created. Either way the session
    /// counts as seen now.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SessionHandle, bool) {
        self.get_or_create_at(id, Instant::now()).await
    }

    async fn get_or_create_at(&self, id: Option<Uuid>, now: Instant) -> (Uuid, SessionHandle, bool) {
        let mut sessions = self.sessions.write().await;
        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, entry.handle.clone(), false);
            }
        }
        let (id, h) = insert_new(&mut sessions, now);
        (id, h, true)
    }

    /// Waits for a submission in flight on the session, so its turn is
    /// recorded before the session goes away.
    pub async fn end(&self, id: Uuid) -> bool {
        let Some(handle) = self.get(id).await else {
            return false;
        };
        let session = handle.lock().await;
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(
                session_id = %id,
                turns = session.log.len(),
                age_secs = (Utc::now() - session.created_at).num_seconds(),
                "session ended"
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn reap_idle(&self) -> usize {
        self.reap_idle_at(Instant::now()).await
    }

    /// Drops sessions idle longer than the TTL as of `now`. A session whose
    /// mutex is held has a submission in flight and is kept.
    async fn reap_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| {
            now.saturating_duration_since(e.last_seen) <= self.idle_ttl || e.handle.try_lock().is_err()
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            tracing::info!(reaped, remaining = sessions.len(), "idle sessions dropped");
        }
        reaped
    }

    /// Sweeps idle sessions periodically until the returned task is aborted.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = (self.idle_ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                store.reap_idle().await;
            }
        })
    }
}

fn insert_new(sessions: &mut HashMap<Uuid, SessionEntry>, now: Instant) -> (Uuid, SessionHandle) {
    let session = Session::new();
    let id = session.id;
    let handle = Arc::new(Mutex::new(session));
    sessions.insert(id, SessionEntry { handle: handle.clone(), last_seen: now });
    tracing::info!(session_id = %id, "session started");
    (id, handle)
}
