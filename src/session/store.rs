//! In-memory session store with background expiry.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;
use uuid::Uuid;

use crate::session::{SessionRef, SessionStore};

#[derive(Debug, Clone)]
struct SessionEntry {
    domain: String,
    client: IpAddr,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Client address that opened the session.
    pub fn client(&self, session: &SessionRef) -> Option<IpAddr> {
        self.sessions.get(&session.id).map(|entry| entry.client)
    }

    /// Drop sessions expired at `now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    /// Periodically sweep expired sessions until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_expired(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Expired sessions removed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn new_session(&self, domain: &str, client: IpAddr, timeout: Duration) -> SessionRef {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                domain: domain.to_string(),
                client,
                expires_at: Instant::now() + timeout,
            },
        );
        tracing::debug!(session = %id, domain, client = %client, "Session created");
        SessionRef {
            id,
            domain: domain.to_string(),
        }
    }

    fn lookup(&self, domain: &str, id: &str) -> Option<SessionRef> {
        let id = Uuid::parse_str(id).ok()?;
        let entry = self.sessions.get(&id)?;
        if entry.domain != domain || entry.expires_at <= Instant::now() {
            return None;
        }
        Some(SessionRef {
            id,
            domain: entry.domain.clone(),
        })
    }

    fn refresh(&self, session: &SessionRef, timeout: Duration) -> bool {
        match self.sessions.get_mut(&session.id) {
            Some(mut entry) => {
                entry.expires_at = Instant::now() + timeout;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IpAddr {
        "10.0.0.7".parse().unwrap()
    }

    #[test]
    fn sessions_are_scoped_to_their_domain() {
        let store = MemorySessionStore::new();
        let session = store.new_session("shop", client(), Duration::from_secs(60));
        let id = session.id.to_string();

        assert_eq!(store.lookup("shop", &id), Some(session.clone()));
        assert_eq!(store.lookup("blog", &id), None);
        assert_eq!(store.lookup("shop", "not-a-uuid"), None);
        assert_eq!(store.client(&session), Some(client()));
    }

    #[test]
    fn expired_sessions_are_invisible_and_swept() {
        let store = MemorySessionStore::new();
        let session = store.new_session("shop", client(), Duration::ZERO);
        assert_eq!(store.lookup("shop", &session.id.to_string()), None);

        assert_eq!(store.sweep_expired(Instant::now() + Duration::from_millis(1)), 1);
        assert!(store.is_empty());
        assert!(!store.refresh(&session, Duration::from_secs(60)));
    }

    #[test]
    fn refresh_extends_expiry() {
        let store = MemorySessionStore::new();
        let session = store.new_session("shop", client(), Duration::ZERO);
        assert!(store.refresh(&session, Duration::from_secs(60)));
        assert!(store.lookup("shop", &session.id.to_string()).is_some());
        assert_eq!(store.sweep_expired(Instant::now()), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let store = Arc::new(MemorySessionStore::new());
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&store).run_sweeper(Duration::from_millis(10), rx));

        store.new_session("shop", client(), Duration::ZERO);
        time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
