//! Top-level client tying the feed components together.

use crate::backend::RealtimeBackend;
use crate::error::{FeedError, Result};
use crate::feed::{FeedEvent, FeedSubscription};
use crate::identity::{IdentityManager, SessionState};
use crate::pipeline::SubmissionPipeline;
use crate::store::CommentStore;
use crate::types::{CollectionPath, Comment, Credential, Identity};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Client configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Tenant namespace for the comment collection. Never taken from user
    /// input.
    pub tenant_id: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tenant_id: "hash-rythm-v1".to_string(),
        }
    }
}

/// The feed client.
///
/// Constructed once at startup against a [`RealtimeBackend`]. Wires the
/// identity manager, live subscription, submission pipeline, and comment
/// store; the subscription follows session transitions automatically, so a
/// successful [`sign_in`](Self::sign_in) attaches the feed and
/// [`sign_out`](Self::sign_out) tears it down.
pub struct FeedClient {
    identities: IdentityManager,
    feed: Arc<FeedSubscription>,
    pipeline: SubmissionPipeline,
    store: Arc<CommentStore>,
}

impl FeedClient {
    pub fn new(backend: Arc<dyn RealtimeBackend>, config: FeedConfig) -> Self {
        let path = CollectionPath::comments(&config.tenant_id);
        let store = Arc::new(CommentStore::new());
        let feed = Arc::new(FeedSubscription::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            path.clone(),
        ));
        let identities = IdentityManager::new(Arc::clone(&backend));
        feed.follow(&identities);
        let pipeline = SubmissionPipeline::new(backend, path);

        Self {
            identities,
            feed,
            pipeline,
            store,
        }
    }

    /// Establish a session (anonymous without a credential) and attach the
    /// live feed.
    pub fn sign_in(&self, credential: Option<Credential>) -> Result<Identity> {
        self.identities.establish_session(credential)
    }

    /// Tear down the session and the live feed.
    pub fn sign_out(&self) {
        self.identities.sign_out();
    }

    /// Current session state.
    pub fn session(&self) -> SessionState {
        self.identities.state()
    }

    /// Submit a comment attributed to the active identity. See
    /// [`SubmissionPipeline::submit`] for the contract.
    pub fn submit(
        &self,
        text: &str,
        completion: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<()> {
        let identity = self
            .identities
            .identity()
            .ok_or_else(|| FeedError::Auth("no active session".to_string()))?;
        self.pipeline.submit(&identity, text, completion)
    }

    /// The current materialized feed view.
    pub fn comments(&self) -> Arc<Vec<Comment>> {
        self.store.snapshot()
    }

    /// Receiver for feed notifications.
    pub fn feed_events(&self) -> Receiver<FeedEvent> {
        self.feed.events()
    }

    pub fn feed(&self) -> &FeedSubscription {
        &self.feed
    }

    pub fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }

    pub fn identities(&self) -> &IdentityManager {
        &self.identities
    }

    /// Synchronously detach all listeners. Called on drop; safe to call
    /// more than once.
    pub fn shutdown(&self) {
        self.feed.dispose(&self.identities);
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
