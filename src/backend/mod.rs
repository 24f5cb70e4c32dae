//! Seam to the external document-oriented realtime store.
//!
//! The client never talks to a concrete store directly; everything goes
//! through [`RealtimeBackend`], so the whole stack can run against the
//! in-memory backend in tests and local development.

pub mod memory;

pub use memory::MemoryBackend;

use crate::error::Result;
use crate::types::{CollectionPath, Credential, Identity, WriteRecord};
use std::fmt;
use std::sync::Arc;

/// A raw document as delivered by the store: opaque id plus untyped payload.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

/// Unique identifier for a live subscription on the backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionToken({})", self.0)
    }
}

/// Receives snapshot and failure callbacks for one live subscription.
///
/// Every delivery is a full snapshot of the collection, never a delta.
pub trait SnapshotObserver: Send + Sync {
    /// The full current document set under the subscribed path.
    fn on_snapshot(&self, documents: Vec<Document>);

    /// The channel failed. No further snapshots will be delivered.
    fn on_error(&self, message: String);
}

/// Terminal outcome of an `add`, delivered through the completion callback.
/// `Err` carries the backend's rejection message.
pub type WriteResult = std::result::Result<(), String>;

/// Continuation invoked exactly once when a write resolves.
pub type WriteCompletion = Box<dyn FnOnce(WriteResult) + Send>;

/// External document-oriented realtime store.
pub trait RealtimeBackend: Send + Sync {
    /// Establish a session. Anonymous when no credential is supplied.
    fn authenticate(&self, credential: Option<Credential>) -> Result<Identity>;

    /// Attach a live listener under `path`. The observer receives the full
    /// current document set immediately, then again on every change.
    fn subscribe(
        &self,
        path: &CollectionPath,
        observer: Arc<dyn SnapshotObserver>,
    ) -> Result<SubscriptionToken>;

    /// Detach a live listener. Unknown tokens are ignored.
    fn unsubscribe(&self, token: &SubscriptionToken);

    /// Write a record under `path`. The outcome is observed only through
    /// `completion`; an accepted write is later echoed back through any live
    /// subscription on the same path.
    fn add(&self, path: &CollectionPath, record: WriteRecord, completion: WriteCompletion);
}
