//! Live feed subscription and snapshot ordering.

use crate::backend::{Document, RealtimeBackend, SnapshotObserver, SubscriptionToken};
use crate::error::{FeedError, Result};
use crate::identity::{IdentityManager, SessionState, WatcherId};
use crate::store::CommentStore;
use crate::types::{derive_display_name, CollectionPath, Comment, CommentData, Identity, LocalState};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Max buffered feed events before new ones are dropped.
const EVENT_BUFFER: usize = 256;

/// Notifications emitted by the subscription.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// A snapshot was materialized into the store.
    Updated { comments: usize },
    /// The channel failed; the feed stays at its last good state.
    Frozen { reason: String },
}

/// One live attachment to the backend.
struct Attachment {
    identity_id: String,
    token: SubscriptionToken,
    /// Shared with the observer; cleared on teardown so late deliveries
    /// cannot mutate disposed state.
    active: Arc<AtomicBool>,
}

/// Backend-facing observer for one attachment.
struct FeedObserver {
    active: Arc<AtomicBool>,
    store: Arc<CommentStore>,
    events: Sender<FeedEvent>,
    frozen: Arc<Mutex<Option<String>>>,
}

impl SnapshotObserver for FeedObserver {
    fn on_snapshot(&self, documents: Vec<Document>) {
        if !self.active.load(Ordering::SeqCst) {
            debug!("ignoring snapshot for detached subscription");
            return;
        }

        let feed = compute_ordered_feed(documents);
        let comments = feed.len();
        self.store.replace(feed);
        let _ = self.events.try_send(FeedEvent::Updated { comments });
    }

    fn on_error(&self, message: String) {
        // First failure wins; delivery stops and the store keeps its last
        // good state.
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!(reason = %message, "feed channel failed, freezing");
        *self.frozen.lock() = Some(message.clone());
        let _ = self.events.try_send(FeedEvent::Frozen { reason: message });
    }
}

/// Maintains a live, consistently ordered view of remote comment records.
///
/// At most one attachment is live at a time. Attaching for a different
/// identity first tears the prior attachment down fully; attaching twice for
/// the same identity is an error. Every delivered snapshot is recomputed
/// wholesale and swapped into the [`CommentStore`].
pub struct FeedSubscription {
    backend: Arc<dyn RealtimeBackend>,
    store: Arc<CommentStore>,
    path: CollectionPath,
    attachment: Mutex<Option<Attachment>>,
    frozen: Arc<Mutex<Option<String>>>,
    events_tx: Sender<FeedEvent>,
    events_rx: Receiver<FeedEvent>,
    watcher: Mutex<Option<WatcherId>>,
}

impl FeedSubscription {
    pub fn new(
        backend: Arc<dyn RealtimeBackend>,
        store: Arc<CommentStore>,
        path: CollectionPath,
    ) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_BUFFER);
        Self {
            backend,
            store,
            path,
            attachment: Mutex::new(None),
            frozen: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx,
            watcher: Mutex::new(None),
        }
    }

    /// Attach a live listener for `identity`.
    ///
    /// A prior attachment for a different identity is torn down fully (all
    /// delivery stopped) before the new one attaches. Attaching again for
    /// the currently attached identity fails with
    /// [`FeedError::Subscription`].
    pub fn subscribe(&self, identity: &Identity) -> Result<()> {
        let mut attachment = self.attachment.lock();

        if let Some(existing) = attachment.take() {
            if existing.identity_id == identity.id {
                *attachment = Some(existing);
                return Err(FeedError::Subscription(
                    "already subscribed for this identity".to_string(),
                ));
            }
            existing.active.store(false, Ordering::SeqCst);
            self.backend.unsubscribe(&existing.token);
            debug!(from = %existing.identity_id, to = %identity.id, "switching feed identity");
        }

        *self.frozen.lock() = None;
        let active = Arc::new(AtomicBool::new(true));
        let observer = Arc::new(FeedObserver {
            active: Arc::clone(&active),
            store: Arc::clone(&self.store),
            events: self.events_tx.clone(),
            frozen: Arc::clone(&self.frozen),
        });

        let token = self.backend.subscribe(&self.path, observer)?;
        *attachment = Some(Attachment {
            identity_id: identity.id.clone(),
            token,
            active,
        });
        debug!(uid = %identity.id, path = %self.path, "feed attached");
        Ok(())
    }

    /// Detach the live listener. Idempotent; once this returns no remote
    /// event can alter the store.
    pub fn unsubscribe(&self) {
        let taken = self.attachment.lock().take();
        if let Some(attachment) = taken {
            attachment.active.store(false, Ordering::SeqCst);
            self.backend.unsubscribe(&attachment.token);
            debug!(uid = %attachment.identity_id, "feed detached");
        }
    }

    /// Drive attach/detach from session transitions: attach on
    /// `Authenticated`, tear down on `Unauthenticated`. Replaces any watcher
    /// registered by an earlier `follow`.
    pub fn follow(self: &Arc<Self>, identities: &IdentityManager) {
        let weak = Arc::downgrade(self);
        let id = identities.watch(move |state| {
            let Some(feed) = weak.upgrade() else { return };
            match state {
                SessionState::Authenticated(identity) => {
                    if let Err(error) = feed.subscribe(identity) {
                        warn!(%error, "feed attach failed");
                    }
                }
                SessionState::Unauthenticated => feed.unsubscribe(),
                SessionState::Authenticating => {}
            }
        });

        let previous = self.watcher.lock().replace(id);
        if let Some(previous) = previous {
            identities.unwatch(previous);
        }
    }

    /// Synchronously detach both the identity watcher and the feed listener.
    /// After this returns, no late-arriving event mutates the store.
    pub fn dispose(&self, identities: &IdentityManager) {
        if let Some(id) = self.watcher.lock().take() {
            identities.unwatch(id);
        }
        self.unsubscribe();
    }

    /// Receiver for feed notifications. Clones share one event stream.
    pub fn events(&self) -> Receiver<FeedEvent> {
        self.events_rx.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    /// Why the feed froze, if the channel has failed since the last attach.
    pub fn freeze_reason(&self) -> Option<String> {
        self.frozen.lock().clone()
    }
}

/// Materialize an ordered feed from a raw snapshot.
///
/// Normalizes each document (malformed ones are skipped), tags records
/// `Confirmed` when the store has assigned a creation time and `Pending`
/// otherwise, then sorts: newest first, records without a timestamp after
/// all records with one, ties stable on arrival order.
///
/// The sort runs client-side on every snapshot so the backing store needs no
/// compound index. O(n log n) per update; fine while feeds stay small.
pub fn compute_ordered_feed(documents: Vec<Document>) -> Vec<Comment> {
    let mut comments: Vec<Comment> = Vec::with_capacity(documents.len());

    for Document { id, data } in documents {
        let data: CommentData = match serde_json::from_value(data) {
            Ok(data) => data,
            Err(error) => {
                warn!(doc = %id, %error, "skipping malformed comment document");
                continue;
            }
        };

        let local_state = if data.created_at.is_some() {
            LocalState::Confirmed
        } else {
            LocalState::Pending
        };
        let display_name = match data.display_name {
            Some(name) if !name.is_empty() => name,
            _ => derive_display_name(&data.author_id),
        };

        comments.push(Comment {
            id,
            author_id: data.author_id,
            display_name,
            text: data.text,
            created_at: data.created_at,
            local_state,
        });
    }

    comments.sort_by_key(|comment| match comment.created_at {
        Some(at) => (false, Reverse(at.seconds)),
        None => (true, Reverse(i64::MIN)),
    });
    comments
}
