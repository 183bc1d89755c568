//! Session lifetime of the local private key.
//!
//! The key store is cleared when the session ends: explicit logout, an idle
//! timeout, or the backend reporting the session as unauthorized. Subscribers
//! (the CLI, a UI shell) are told why through a broadcast channel.
//!
//! A short-lived process (one CLI command) never sees its own idle timeout,
//! so activity can also be stamped to a file and checked on the next start
//! with [`Session::expire_if_idle`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sbx_crypto::{CryptoError, KeyPairManager};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 16;

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Logout,
    IdleTimeout,
    Unauthorized,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Logout => write!(f, "logout"),
            SessionEvent::IdleTimeout => write!(f, "idle timeout"),
            SessionEvent::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

#[derive(Clone)]
pub struct Session {
    keys: KeyPairManager,
    events: broadcast::Sender<SessionEvent>,
    last_activity: Arc<Mutex<Instant>>,
    idle_timeout: Option<Duration>,
    /// unix seconds of the last activity, shared across processes
    activity_file: Option<PathBuf>,
}

impl Session {
    /// `idle_timeout` of `None` (or zero) disables idle expiry.
    pub fn new(keys: KeyPairManager, idle_timeout: Option<Duration>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            keys,
            events,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            idle_timeout: idle_timeout.filter(|d| !d.is_zero()),
            activity_file: None,
        }
    }

    /// Persist activity to `path` so a later process can tell how long the
    /// key has been idle.
    pub fn with_activity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.activity_file = Some(path.into());
        self
    }

    pub fn keys(&self) -> &KeyPairManager {
        &self.keys
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Record activity, pushing back the idle deadline.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        if let Some(path) = &self.activity_file {
            if let Err(e) = write_stamp(path, unix_now()) {
                tracing::warn!(path = %path.display(), "failed to record session activity: {e}");
            }
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Expire the session if the persisted activity stamp is older than the
    /// idle timeout. Returns whether a local key was cleared.
    ///
    /// A key with no stamp yet (first run with an activity file) starts its
    /// idle clock now.
    pub fn expire_if_idle(&self) -> Result<bool, CryptoError> {
        let (Some(timeout), Some(path)) = (self.idle_timeout, &self.activity_file) else {
            return Ok(false);
        };
        if !self.keys.has_local_key()? {
            return Ok(false);
        }
        let Some(stamp) = read_stamp(path) else {
            self.touch();
            return Ok(false);
        };
        let idle = Duration::from_secs(unix_now().saturating_sub(stamp));
        if idle < timeout {
            return Ok(false);
        }
        tracing::debug!(idle_secs = idle.as_secs(), "key idle past timeout");
        self.expire(SessionEvent::IdleTimeout)?;
        Ok(true)
    }

    /// End the session: clear the key store, then notify subscribers.
    pub fn expire(&self, event: SessionEvent) -> Result<(), CryptoError> {
        self.keys.forget()?;
        if let Some(path) = &self.activity_file {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "failed to remove activity stamp: {e}"),
            }
        }
        match event {
            SessionEvent::Logout => tracing::info!(reason = %event, "session ended"),
            _ => tracing::warn!(reason = %event, "session expired, local key cleared"),
        }
        // no subscribers is fine
        let _ = self.events.send(event);
        Ok(())
    }

    /// Spawn a task that expires the session after `idle_timeout` without
    /// activity. Returns `None` when idle expiry is disabled.
    pub fn spawn_idle_watchdog(&self) -> Option<JoinHandle<()>> {
        let timeout = self.idle_timeout?;
        let session = self.clone();
        let check_every = (timeout / 4).max(Duration::from_millis(10));

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_every);
            loop {
                interval.tick().await;
                if session.idle_for() < timeout {
                    continue;
                }
                if let Err(e) = session.expire(SessionEvent::IdleTimeout) {
                    tracing::error!("failed to clear key store on idle timeout: {e}");
                }
                break;
            }
        }))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("idle_timeout", &self.idle_timeout)
            .field("activity_file", &self.activity_file)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn read_stamp(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn write_stamp(path: &Path, secs: u64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = crate::file::create_private_file(&tmp)?;
        writeln!(file, "{secs}")?;
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_crypto::{KeySlot, KeyStore, MemoryKeyStore};

    fn session_with_key(idle: Option<Duration>) -> (Session, Arc<MemoryKeyStore>) {
        let store = Arc::new(MemoryKeyStore::new());
        store.set(KeySlot::PrivateKey, b"pkcs8").unwrap();
        let session = Session::new(KeyPairManager::new(store.clone()), idle);
        (session, store)
    }

    #[tokio::test]
    async fn test_expire_clears_store_and_notifies() {
        let (session, store) = session_with_key(None);
        let mut rx = session.subscribe();

        session.expire(SessionEvent::Unauthorized).unwrap();

        assert!(store.get(KeySlot::PrivateKey).unwrap().is_none());
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Unauthorized);
    }

    #[tokio::test]
    async fn test_expire_without_subscribers() {
        let (session, store) = session_with_key(None);
        session.expire(SessionEvent::Logout).unwrap();
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watchdog_disabled_without_timeout() {
        let (session, _) = session_with_key(Some(Duration::ZERO));
        assert!(session.spawn_idle_watchdog().is_none());
    }

    #[tokio::test]
    async fn test_idle_watchdog_expires_session() {
        let (session, store) = session_with_key(Some(Duration::from_millis(50)));
        let mut rx = session.subscribe();

        let handle = session.spawn_idle_watchdog().unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event, SessionEvent::IdleTimeout);
        handle.await.unwrap();
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_none());
    }

    #[test]
    fn test_stale_activity_stamp_expires_on_start() {
        let tmp = tempfile::TempDir::new().unwrap();
        let stamp = tmp.path().join("last-activity");
        let (session, store) = session_with_key(Some(Duration::from_secs(600)));
        let session = session.with_activity_file(stamp.clone());
        let mut rx = session.subscribe();

        write_stamp(&stamp, unix_now() - 601).unwrap();

        assert!(session.expire_if_idle().unwrap());
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_none());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::IdleTimeout);
        assert!(!stamp.exists());
    }

    #[test]
    fn test_recent_activity_stamp_keeps_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let stamp = tmp.path().join("last-activity");
        let (session, store) = session_with_key(Some(Duration::from_secs(600)));
        let session = session.with_activity_file(stamp.clone());

        write_stamp(&stamp, unix_now() - 30).unwrap();
        assert!(!session.expire_if_idle().unwrap());
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_some());
    }

    #[test]
    fn test_missing_stamp_starts_idle_clock() {
        let tmp = tempfile::TempDir::new().unwrap();
        let stamp = tmp.path().join("nested/last-activity");
        let (session, store) = session_with_key(Some(Duration::from_secs(600)));
        let session = session.with_activity_file(stamp.clone());

        assert!(!session.expire_if_idle().unwrap());
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_some());
        assert!(read_stamp(&stamp).unwrap() <= unix_now());
    }

    #[test]
    fn test_touch_resets_idle_clock() {
        let (session, _) = session_with_key(None);
        std::thread::sleep(Duration::from_millis(20));
        session.touch();
        assert!(session.idle_for() < Duration::from_millis(20));
    }
}
