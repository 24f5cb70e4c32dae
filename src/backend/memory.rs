//! In-memory realtime backend.
//!
//! A complete [`RealtimeBackend`] over process memory, used by the test
//! suite and for local development. Beyond the trait it exposes manual
//! controls: writes can be held open and resolved later, documents can be
//! injected directly, and channel failures can be forced.

use super::{Document, RealtimeBackend, SnapshotObserver, SubscriptionToken, WriteCompletion};
use crate::error::{FeedError, Result};
use crate::types::{CollectionPath, Credential, Identity, Timestamp, WriteRecord};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct LiveSub {
    path: String,
    observer: Arc<dyn SnapshotObserver>,
}

struct PendingWrite {
    path: String,
    record: WriteRecord,
    completion: WriteCompletion,
}

#[derive(Default)]
struct Inner {
    next_uid: u64,
    next_doc: u64,
    next_token: u64,
    /// Logical commit clock; each committed write gets the next second.
    clock: i64,
    reject_auth: Option<String>,
    reject_next_write: Option<String>,
    hold_writes: bool,
    subs: HashMap<u64, LiveSub>,
    collections: HashMap<String, Vec<Document>>,
    pending: Vec<PendingWrite>,
    write_count: usize,
    max_concurrent_subs: usize,
}

impl Inner {
    /// Commit a write: assign a document id and a server timestamp, append.
    fn commit(&mut self, path: &str, record: &WriteRecord) -> Document {
        self.next_doc += 1;
        self.clock += 1;

        let mut data = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
        data["createdAt"] = json!({ "seconds": self.clock });

        let document = Document {
            id: format!("doc-{}", self.next_doc),
            data,
        };
        self.collections
            .entry(path.to_string())
            .or_default()
            .push(document.clone());
        document
    }

    /// Collect (observer, snapshot) pairs for `path`. Callbacks are invoked
    /// by the caller after the lock is released.
    fn snapshot_deliveries(&self, path: &str) -> Vec<(Arc<dyn SnapshotObserver>, Vec<Document>)> {
        let documents = self.collections.get(path).cloned().unwrap_or_default();
        self.subs
            .values()
            .filter(|sub| sub.path == path)
            .map(|sub| (Arc::clone(&sub.observer), documents.clone()))
            .collect()
    }
}

/// In-memory document store with realtime delivery.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                clock: 1000,
                ..Default::default()
            }),
        }
    }

    // --- Manual controls ---

    /// Fail the next `authenticate` call with `message`.
    pub fn reject_next_auth(&self, message: impl Into<String>) {
        self.inner.lock().reject_auth = Some(message.into());
    }

    /// Fail the next `add` call with `message`. The write has no effect and
    /// is never echoed back.
    pub fn reject_next_write(&self, message: impl Into<String>) {
        self.inner.lock().reject_next_write = Some(message.into());
    }

    /// Hold incoming writes open instead of committing them. Resolve later
    /// with [`commit_pending`](Self::commit_pending) or
    /// [`fail_pending`](Self::fail_pending).
    pub fn hold_writes(&self) {
        self.inner.lock().hold_writes = true;
    }

    /// Commit all held writes and deliver updated snapshots.
    pub fn commit_pending(&self) {
        let (completions, deliveries) = {
            let mut inner = self.inner.lock();
            inner.hold_writes = false;
            let pending: Vec<PendingWrite> = inner.pending.drain(..).collect();

            let mut completions = Vec::new();
            let mut touched = Vec::new();
            for write in pending {
                inner.commit(&write.path, &write.record);
                if !touched.contains(&write.path) {
                    touched.push(write.path.clone());
                }
                completions.push(write.completion);
            }

            let mut deliveries = Vec::new();
            for path in &touched {
                deliveries.extend(inner.snapshot_deliveries(path));
            }
            (completions, deliveries)
        };

        for completion in completions {
            completion(Ok(()));
        }
        for (observer, documents) in deliveries {
            observer.on_snapshot(documents);
        }
    }

    /// Reject all held writes with `message`. Nothing is committed.
    pub fn fail_pending(&self, message: impl Into<String>) {
        let message = message.into();
        let completions: Vec<WriteCompletion> = {
            let mut inner = self.inner.lock();
            inner.hold_writes = false;
            inner
                .pending
                .drain(..)
                .map(|write| write.completion)
                .collect()
        };

        for completion in completions {
            completion(Err(message.clone()));
        }
    }

    /// Insert a document directly and deliver updated snapshots. Returns the
    /// assigned document id.
    pub fn inject(&self, path: &CollectionPath, data: serde_json::Value) -> String {
        let key = path.to_string();
        let (id, deliveries) = {
            let mut inner = self.inner.lock();
            inner.next_doc += 1;
            let id = format!("doc-{}", inner.next_doc);
            inner.collections.entry(key.clone()).or_default().push(Document {
                id: id.clone(),
                data,
            });
            (id, inner.snapshot_deliveries(&key))
        };

        for (observer, documents) in deliveries {
            observer.on_snapshot(documents);
        }
        id
    }

    /// Fail every live channel under `path`.
    pub fn emit_channel_error(&self, path: &CollectionPath, message: impl Into<String>) {
        let key = path.to_string();
        let message = message.into();
        let observers: Vec<Arc<dyn SnapshotObserver>> = {
            let inner = self.inner.lock();
            inner
                .subs
                .values()
                .filter(|sub| sub.path == key)
                .map(|sub| Arc::clone(&sub.observer))
                .collect()
        };

        for observer in observers {
            observer.on_error(message.clone());
        }
    }

    // --- Introspection ---

    /// Number of writes that reached the backend (committed, held, or failed
    /// after acceptance). Rejections before `add` never count.
    pub fn write_count(&self) -> usize {
        self.inner.lock().write_count
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subs.len()
    }

    /// High-water mark of simultaneously live subscriptions.
    pub fn max_concurrent_subscriptions(&self) -> usize {
        self.inner.lock().max_concurrent_subs
    }

    /// Current documents under `path`, in commit order.
    pub fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.inner
            .lock()
            .collections
            .get(&path.to_string())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeBackend for MemoryBackend {
    fn authenticate(&self, credential: Option<Credential>) -> Result<Identity> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.reject_auth.take() {
            return Err(FeedError::Auth(message));
        }

        let identity = match credential {
            Some(credential) => Identity {
                id: credential.0,
                is_anonymous: false,
                established_at: Timestamp::now(),
            },
            None => {
                inner.next_uid += 1;
                Identity {
                    id: format!("anon-{:04}", inner.next_uid),
                    is_anonymous: true,
                    established_at: Timestamp::now(),
                }
            }
        };
        debug!(uid = %identity.id, anonymous = identity.is_anonymous, "session established");
        Ok(identity)
    }

    fn subscribe(
        &self,
        path: &CollectionPath,
        observer: Arc<dyn SnapshotObserver>,
    ) -> Result<SubscriptionToken> {
        let key = path.to_string();
        let (token, documents) = {
            let mut inner = self.inner.lock();
            inner.next_token += 1;
            let token = SubscriptionToken(inner.next_token);
            inner.subs.insert(
                token.0,
                LiveSub {
                    path: key.clone(),
                    observer: Arc::clone(&observer),
                },
            );
            inner.max_concurrent_subs = inner.max_concurrent_subs.max(inner.subs.len());
            let documents = inner.collections.get(&key).cloned().unwrap_or_default();
            (token, documents)
        };

        // Initial delivery: the full current set, outside the lock.
        observer.on_snapshot(documents);
        Ok(token)
    }

    fn unsubscribe(&self, token: &SubscriptionToken) {
        self.inner.lock().subs.remove(&token.0);
    }

    fn add(&self, path: &CollectionPath, record: WriteRecord, completion: WriteCompletion) {
        let key = path.to_string();
        enum Outcome {
            Rejected(String, WriteCompletion),
            Held,
            Committed(
                Vec<(Arc<dyn SnapshotObserver>, Vec<Document>)>,
                WriteCompletion,
            ),
        }

        let outcome = {
            let mut inner = self.inner.lock();
            if let Some(message) = inner.reject_next_write.take() {
                Outcome::Rejected(message, completion)
            } else {
                inner.write_count += 1;
                if inner.hold_writes {
                    inner.pending.push(PendingWrite {
                        path: key.clone(),
                        record,
                        completion,
                    });
                    Outcome::Held
                } else {
                    inner.commit(&key, &record);
                    Outcome::Committed(inner.snapshot_deliveries(&key), completion)
                }
            }
        };

        match outcome {
            Outcome::Rejected(message, completion) => completion(Err(message)),
            Outcome::Held => {}
            Outcome::Committed(deliveries, completion) => {
                completion(Ok(()));
                for (observer, documents) in deliveries {
                    observer.on_snapshot(documents);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{derive_display_name, ServerTimestamp};
    use parking_lot::Mutex as PlMutex;

    struct Collector {
        snapshots: PlMutex<Vec<Vec<Document>>>,
        errors: PlMutex<Vec<String>>,
    }

    impl Collector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                snapshots: PlMutex::new(Vec::new()),
                errors: PlMutex::new(Vec::new()),
            })
        }
    }

    impl SnapshotObserver for Collector {
        fn on_snapshot(&self, documents: Vec<Document>) {
            self.snapshots.lock().push(documents);
        }

        fn on_error(&self, message: String) {
            self.errors.lock().push(message);
        }
    }

    fn write_record(author: &str, text: &str) -> WriteRecord {
        WriteRecord {
            author_id: author.to_string(),
            display_name: derive_display_name(author),
            text: text.to_string(),
            created_at: ServerTimestamp,
        }
    }

    #[test]
    fn test_subscribe_delivers_current_set_immediately() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");
        backend.inject(&path, json!({"authorId": "a", "text": "hi"}));

        let collector = Collector::new();
        backend.subscribe(&path, collector.clone()).unwrap();

        let snapshots = collector.snapshots.lock();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].len(), 1);
    }

    #[test]
    fn test_committed_write_gets_id_and_timestamp() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");

        let collector = Collector::new();
        backend.subscribe(&path, collector.clone()).unwrap();
        backend.add(&path, write_record("uid-1", "hello"), Box::new(|r| assert!(r.is_ok())));

        let documents = backend.documents(&path);
        assert_eq!(documents.len(), 1);
        assert!(documents[0].id.starts_with("doc-"));
        assert!(documents[0].data["createdAt"]["seconds"].is_i64());
        // Initial empty snapshot plus the echo.
        assert_eq!(collector.snapshots.lock().len(), 2);
    }

    #[test]
    fn test_held_writes_resolve_on_commit_pending() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");
        backend.hold_writes();

        let resolved = Arc::new(PlMutex::new(false));
        let flag = Arc::clone(&resolved);
        backend.add(
            &path,
            write_record("uid-1", "hello"),
            Box::new(move |r| {
                assert!(r.is_ok());
                *flag.lock() = true;
            }),
        );

        assert!(!*resolved.lock());
        assert!(backend.documents(&path).is_empty());

        backend.commit_pending();
        assert!(*resolved.lock());
        assert_eq!(backend.documents(&path).len(), 1);
    }

    #[test]
    fn test_rejected_write_commits_nothing() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");
        backend.reject_next_write("quota exceeded");

        backend.add(
            &path,
            write_record("uid-1", "hello"),
            Box::new(|r| assert_eq!(r.unwrap_err(), "quota exceeded")),
        );

        assert!(backend.documents(&path).is_empty());
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");

        let collector = Collector::new();
        let token = backend.subscribe(&path, collector.clone()).unwrap();
        backend.unsubscribe(&token);
        backend.inject(&path, json!({"authorId": "a", "text": "late"}));

        assert_eq!(collector.snapshots.lock().len(), 1);
        assert_eq!(backend.subscription_count(), 0);
    }

    #[test]
    fn test_channel_error_reaches_observer() {
        let backend = MemoryBackend::new();
        let path = CollectionPath::comments("t");

        let collector = Collector::new();
        backend.subscribe(&path, collector.clone()).unwrap();
        backend.emit_channel_error(&path, "stream reset");

        assert_eq!(collector.errors.lock().as_slice(), ["stream reset"]);
    }

    #[test]
    fn test_anonymous_and_credentialed_identities() {
        let backend = MemoryBackend::new();

        let anon = backend.authenticate(None).unwrap();
        assert!(anon.is_anonymous);

        let named = backend
            .authenticate(Some(Credential("ops-7".to_string())))
            .unwrap();
        assert!(!named.is_anonymous);
        assert_eq!(named.id, "ops-7");
    }
}
