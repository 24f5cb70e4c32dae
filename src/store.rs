//! Read-side cache of the last materialized feed view.

use crate::types::Comment;
use parking_lot::RwLock;
use std::sync::Arc;

/// The last feed view materialized by the subscription.
///
/// Written only by [`FeedSubscription`](crate::FeedSubscription); everything
/// else reads. The view behind the lock is swapped wholesale, so a reader
/// holding a [`snapshot`](Self::snapshot) always sees one internally
/// consistent ordering.
pub struct CommentStore {
    view: RwLock<Arc<Vec<Comment>>>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self {
            view: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The current view. Cheap; the returned `Arc` stays valid across later
    /// replacements.
    pub fn snapshot(&self) -> Arc<Vec<Comment>> {
        Arc::clone(&self.view.read())
    }

    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    /// Replace the entire view. The only mutation path.
    pub(crate) fn replace(&self, comments: Vec<Comment>) {
        *self.view.write() = Arc::new(comments);
    }
}

impl Default for CommentStore {
    fn default() -> Self {
        Self::new()
    }
}
