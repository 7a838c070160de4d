use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::storage::{entities::Session, SerializedStore, Store};

/// Sessions older than this are rotated on the next tick.
pub const SESSION_MAX_AGE: Duration = Duration::hours(4);
pub use crate::storage::entities::SESSION_RETENTION;

/// Owns the open session and persists closed ones.
pub struct SessionManager<S> {
    store: Arc<SerializedStore<S>>,
    current: Option<Session>,
}

impl<S: Store> SessionManager<S> {
    pub fn new(store: Arc<SerializedStore<S>>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Allocates a fresh session starting at `now`.
    pub fn start_session(now: DateTime<Utc>) -> Session {
        let session = Session::start(now);
        info!("Started session {}", session.id);
        session
    }

    /// Opens a session if none is open.
    pub fn begin(&mut self, now: DateTime<Utc>) -> &Session {
        self.current.get_or_insert_with(|| Self::start_session(now))
    }

    /// Closes `session`, appends it to the history and drops history entries that started 30
    /// days or more before `now`.
    pub async fn end_session(&self, mut session: Session, now: DateTime<Utc>) -> Result<Session> {
        if !session.is_open() {
            bail!("Session {} is already closed", session.id);
        }
        session.close(now);

        self.store.append_session(session.clone(), now).await?;

        info!(
            "Closed session {} after {}ms",
            session.id, session.total_time
        );
        Ok(session)
    }

    pub fn should_rotate(&self, now: DateTime<Utc>) -> bool {
        self.current
            .as_ref()
            .is_some_and(|session| session.age(now) >= SESSION_MAX_AGE)
    }

    /// Replaces the open session with a new one, then persists the old one. The manager never
    /// holds zero open sessions in between.
    pub async fn rotate(&mut self, now: DateTime<Utc>) -> Result<()> {
        let previous = self.current.replace(Self::start_session(now));
        if let Some(previous) = previous {
            self.end_session(previous, now).await?;
        }
        Ok(())
    }

    /// Closes the open session for good, used at shutdown.
    pub async fn close(&mut self, now: DateTime<Utc>) -> Result<Option<Session>> {
        match self.current.take() {
            Some(session) => self.end_session(session, now).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn record(&mut self, domain: &str, elapsed_ms: u64) {
        if let Some(session) = self.current.as_mut() {
            session.add(domain, elapsed_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::storage::memory::MemoryStore;

    fn manager(store: MemoryStore) -> SessionManager<MemoryStore> {
        SessionManager::new(Arc::new(SerializedStore::new(store)))
    }

    #[tokio::test]
    async fn end_session_prunes_history_older_than_retention() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let boundary = (now - Duration::days(30)).timestamp_millis();
        let store = MemoryStore::with_fields(json!({
            "sessions": [
                {"id": "old", "startTime": boundary - 1, "endTime": boundary, "sites": {}, "totalTime": 1},
                {"id": "boundary", "startTime": boundary, "endTime": boundary + 5, "sites": {}, "totalTime": 5},
                {"id": "recent", "startTime": boundary + 1, "endTime": boundary + 5, "sites": {}, "totalTime": 4},
            ],
        }));
        let sessions = manager(store);

        let closed = sessions
            .end_session(Session::start(now - Duration::hours(1)), now)
            .await?;

        assert_eq!(closed.total_time, 3_600_000);
        let history = sessions.store.read().await?.sessions;
        let ids = history.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["recent", closed.id.as_str()]);
        assert!(history.iter().all(|s| s.start_time > now - SESSION_RETENTION));
        Ok(())
    }

    #[tokio::test]
    async fn closed_sessions_cannot_end_again() -> Result<()> {
        let sessions = manager(MemoryStore::default());
        let now = Utc::now();
        let closed = sessions.end_session(Session::start(now), now).await?;

        assert!(sessions.end_session(closed, now).await.is_err());
        assert_eq!(sessions.store.read().await?.sessions.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rotation_always_leaves_one_open_session() -> Result<()> {
        let mut sessions = manager(MemoryStore::default());
        let start = Utc.with_ymd_and_hms(2024, 6, 30, 8, 0, 0).unwrap();
        let first_id = sessions.begin(start).id.clone();
        sessions.record("github.com", 5000);

        assert!(!sessions.should_rotate(start + Duration::minutes(239)));
        let later = start + SESSION_MAX_AGE;
        assert!(sessions.should_rotate(later));

        sessions.rotate(later).await?;

        let current = sessions.current().expect("a session stays open");
        assert!(current.is_open());
        assert_ne!(current.id, first_id);
        assert_eq!(current.start_time, later);

        let history = sessions.store.read().await?.sessions;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, first_id);
        assert_eq!(history[0].sites["github.com"], 5000);
        assert_eq!(history[0].end_time, Some(later));
        Ok(())
    }

    #[tokio::test]
    async fn failed_persist_still_rotates() -> Result<()> {
        let memory = MemoryStore::default();
        memory.set_fail_writes(true);
        let mut sessions = manager(memory);
        let start = Utc::now();
        sessions.begin(start);

        assert!(sessions.rotate(start + SESSION_MAX_AGE).await.is_err());
        assert!(sessions.current().is_some_and(Session::is_open));
        Ok(())
    }
}
