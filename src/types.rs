//! Core types for the feed client.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of author-id characters included in a derived display name.
const DISPLAY_NAME_PREFIX_LEN: usize = 4;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Opaque credential token for a named session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(pub String);

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the token itself.
        write!(f, "Credential(***)")
    }
}

/// The resolved session principal used to attribute writes.
///
/// Created once per session by the identity manager and immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Opaque backend-assigned id.
    pub id: String,
    /// Whether the session was established without a credential.
    pub is_anonymous: bool,
    /// When the session was established.
    pub established_at: Timestamp,
}

/// A committed server timestamp, as it arrives on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreatedAt {
    pub seconds: i64,
}

/// Local lifecycle tag for a comment.
///
/// `Pending` until the backing store assigns an authoritative creation time,
/// `Confirmed` once the timestamp is observed in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalState {
    Pending,
    Confirmed,
}

/// A single comment in the materialized feed.
///
/// Comments are never mutated or deleted; each snapshot recomputes the full
/// view, so a comment only ever transitions Pending -> Confirmed by being
/// re-materialized with a committed timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Comment {
    /// Store-assigned opaque id, unique within a snapshot.
    pub id: String,
    pub author_id: String,
    pub display_name: String,
    pub text: String,
    /// Absent until the backing store assigns one.
    pub created_at: Option<CreatedAt>,
    pub local_state: LocalState,
}

/// Wire schema of a comment document, as read from a snapshot.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
    pub author_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<CreatedAt>,
}

/// Sentinel requesting a server-assigned timestamp on write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerTimestamp;

impl Serialize for ServerTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("__type__", "server_timestamp")?;
        map.end()
    }
}

/// Wire schema of a comment on write. `created_at` is always the
/// server-timestamp sentinel; the store assigns the committed value.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRecord {
    pub author_id: String,
    pub display_name: String,
    pub text: String,
    pub created_at: ServerTimestamp,
}

/// Logical path to a collection in the backing store.
///
/// The comment collection lives under a literal, tenant-scoped namespace and
/// is never parameterized by user input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// The comment collection for a tenant:
    /// `artifacts/{tenant_id}/public/data/comments`.
    pub fn comments(tenant_id: &str) -> Self {
        Self {
            segments: vec![
                "artifacts".to_string(),
                tenant_id.to_string(),
                "public".to_string(),
                "data".to_string(),
                "comments".to_string(),
            ],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Derive the human-legible label shown for an author.
///
/// Pure function of the author id: fixed `Node_` prefix plus the first four
/// characters of the id.
pub fn derive_display_name(author_id: &str) -> String {
    let prefix: String = author_id.chars().take(DISPLAY_NAME_PREFIX_LEN).collect();
    format!("Node_{}", prefix)
}
