//! # Livefeed
//!
//! An identity-gated realtime comment feed client.
//!
//! ## Core Concepts
//!
//! - **Identity**: one session principal at a time, anonymous or
//!   credentialed, used to attribute writes
//! - **Feed**: a live subscription delivering full snapshots, re-sorted
//!   client-side and swapped wholesale into the comment store
//! - **Submission**: single-flight writes whose effects appear only once
//!   the subscription echoes them back
//!
//! ## Example
//!
//! ```ignore
//! use livefeed::{FeedClient, FeedConfig, MemoryBackend};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let client = FeedClient::new(backend, FeedConfig::default());
//!
//! client.sign_in(None)?;
//! client.submit("Hello, network!", |outcome| {
//!     if let Err(error) = outcome {
//!         eprintln!("submit failed: {error}");
//!     }
//! })?;
//!
//! for comment in client.comments().iter() {
//!     println!("{}: {}", comment.display_name, comment.text);
//! }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod feed;
pub mod identity;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-exports
pub use backend::{
    Document, MemoryBackend, RealtimeBackend, SnapshotObserver, SubscriptionToken,
    WriteCompletion, WriteResult,
};
pub use client::{FeedClient, FeedConfig};
pub use error::{FeedError, Result};
pub use feed::{compute_ordered_feed, FeedEvent, FeedSubscription};
pub use identity::{IdentityManager, SessionState, WatcherId};
pub use pipeline::SubmissionPipeline;
pub use store::CommentStore;
pub use types::*;
