//! Comment submission pipeline.

use crate::backend::RealtimeBackend;
use crate::error::{FeedError, Result};
use crate::types::{derive_display_name, CollectionPath, Identity, ServerTimestamp, WriteRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Accepts new comment text and writes it upstream.
///
/// Holds no feed state, only a single-flight guard: at most one write may be
/// in flight per pipeline instance; a second call is rejected, never queued.
/// An accepted comment is not inserted locally; it appears once the live
/// subscription echoes it back.
pub struct SubmissionPipeline {
    backend: Arc<dyn RealtimeBackend>,
    path: CollectionPath,
    in_flight: Arc<AtomicBool>,
}

impl SubmissionPipeline {
    pub fn new(backend: Arc<dyn RealtimeBackend>, path: CollectionPath) -> Self {
        Self {
            backend,
            path,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submit `text` attributed to `identity`.
    ///
    /// Returns `Ok(())` once the write is accepted and in flight; the
    /// terminal outcome arrives through `completion` exactly once. Fails
    /// immediately with [`FeedError::Validation`] when the trimmed text is
    /// empty (no remote effect) or [`FeedError::Busy`] while a prior write
    /// is unresolved. A rejected write releases the guard and hands the
    /// original text back inside [`FeedError::RemoteWrite`].
    pub fn submit(
        &self,
        identity: &Identity,
        text: &str,
        completion: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(FeedError::Validation("comment text is empty".to_string()));
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FeedError::Busy);
        }

        let record = WriteRecord {
            author_id: identity.id.clone(),
            display_name: derive_display_name(&identity.id),
            text: text.to_string(),
            created_at: ServerTimestamp,
        };
        debug!(uid = %identity.id, chars = text.len(), "submitting comment");

        let guard = Arc::clone(&self.in_flight);
        let preserved = text.to_string();
        self.backend.add(
            &self.path,
            record,
            Box::new(move |result| {
                guard.store(false, Ordering::SeqCst);
                completion(result.map_err(|message| FeedError::RemoteWrite {
                    message,
                    text: preserved,
                }));
            }),
        );
        Ok(())
    }

    /// Whether a write is currently unresolved.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}
