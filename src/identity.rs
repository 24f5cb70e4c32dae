//! Session identity management.

use crate::backend::RealtimeBackend;
use crate::error::{FeedError, Result};
use crate::types::{Credential, Identity};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session lifecycle.
#[derive(Clone, Debug)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Identifier for a registered session watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

type Watcher = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Establishes and tracks the caller's session identity.
///
/// Exactly one identity is active at a time; switching accounts requires
/// [`sign_out`](Self::sign_out) before establishing a new session. Dependents
/// register watchers and are notified on every state transition.
pub struct IdentityManager {
    backend: Arc<dyn RealtimeBackend>,
    state: RwLock<SessionState>,
    watchers: RwLock<HashMap<WatcherId, Watcher>>,
    next_watcher: AtomicU64,
}

impl IdentityManager {
    pub fn new(backend: Arc<dyn RealtimeBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(SessionState::Unauthenticated),
            watchers: RwLock::new(HashMap::new()),
            next_watcher: AtomicU64::new(1),
        }
    }

    /// Establish a session, anonymous unless a credential is supplied.
    ///
    /// Fails with [`FeedError::Auth`] on an invalid credential, an
    /// unreachable identity service, or when a session is already active or
    /// in progress. On failure the state returns to `Unauthenticated`. No
    /// automatic retry.
    pub fn establish_session(&self, credential: Option<Credential>) -> Result<Identity> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Authenticated(_) => {
                    return Err(FeedError::Auth("session already established".to_string()));
                }
                SessionState::Authenticating => {
                    return Err(FeedError::Auth("authentication already in progress".to_string()));
                }
                SessionState::Unauthenticated => {}
            }
            *state = SessionState::Authenticating;
        }
        self.notify(SessionState::Authenticating);

        match self.backend.authenticate(credential) {
            Ok(identity) => {
                *self.state.write() = SessionState::Authenticated(identity.clone());
                debug!(uid = %identity.id, "authenticated");
                self.notify(SessionState::Authenticated(identity.clone()));
                Ok(identity)
            }
            Err(error) => {
                *self.state.write() = SessionState::Unauthenticated;
                warn!(%error, "authentication failed");
                self.notify(SessionState::Unauthenticated);
                Err(error)
            }
        }
    }

    /// Teardown hook: clears the active identity and notifies watchers.
    pub fn sign_out(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Unauthenticated) {
                return;
            }
            *state = SessionState::Unauthenticated;
        }
        debug!("signed out");
        self.notify(SessionState::Unauthenticated);
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// The active identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.state.read().identity().cloned()
    }

    /// Register a watcher invoked on every session transition.
    pub fn watch(&self, watcher: impl Fn(&SessionState) + Send + Sync + 'static) -> WatcherId {
        let id = WatcherId(self.next_watcher.fetch_add(1, Ordering::SeqCst));
        self.watchers.write().insert(id, Arc::new(watcher));
        id
    }

    /// Remove a watcher. Synchronous: once this returns, the watcher will
    /// not be invoked again. Unknown ids are ignored.
    pub fn unwatch(&self, id: WatcherId) {
        self.watchers.write().remove(&id);
    }

    /// Invoke all watchers outside the state lock.
    fn notify(&self, state: SessionState) {
        let watchers: Vec<Watcher> = self.watchers.read().values().cloned().collect();
        for watcher in watchers {
            watcher(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use parking_lot::Mutex;

    fn manager() -> (Arc<MemoryBackend>, IdentityManager) {
        let backend = Arc::new(MemoryBackend::new());
        let manager = IdentityManager::new(backend.clone());
        (backend, manager)
    }

    #[test]
    fn test_anonymous_session() {
        let (_backend, manager) = manager();

        let identity = manager.establish_session(None).unwrap();
        assert!(identity.is_anonymous);
        assert_eq!(manager.identity(), Some(identity));
    }

    #[test]
    fn test_failure_returns_to_unauthenticated() {
        let (backend, manager) = manager();
        backend.reject_next_auth("token expired");

        let result = manager.establish_session(Some(Credential("bad".to_string())));
        assert!(matches!(result, Err(FeedError::Auth(_))));
        assert!(matches!(manager.state(), SessionState::Unauthenticated));

        // A later attempt may succeed; no lingering half-state.
        assert!(manager.establish_session(None).is_ok());
    }

    #[test]
    fn test_second_session_rejected_while_active() {
        let (_backend, manager) = manager();
        manager.establish_session(None).unwrap();

        let result = manager.establish_session(None);
        assert!(matches!(result, Err(FeedError::Auth(_))));
    }

    #[test]
    fn test_sign_out_then_new_session() {
        let (_backend, manager) = manager();
        let first = manager.establish_session(None).unwrap();
        manager.sign_out();
        assert!(manager.identity().is_none());

        let second = manager.establish_session(None).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_watchers_see_every_transition() {
        let (_backend, manager) = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.watch(move |state| {
            sink.lock().push(format!("{:?}", std::mem::discriminant(state)));
        });

        manager.establish_session(None).unwrap();
        manager.sign_out();

        // Authenticating, Authenticated, Unauthenticated.
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_unwatch_stops_notifications() {
        let (_backend, manager) = manager();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let id = manager.watch(move |_| *sink.lock() += 1);
        manager.unwatch(id);

        manager.establish_session(None).unwrap();
        assert_eq!(*seen.lock(), 0);
    }
}
