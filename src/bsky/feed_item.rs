//! The data types shared by the fetcher, the diff engine, and the store.
//!
//! Upstream payloads are kept as raw JSON.  The poller never interprets a
//! post beyond its `post.uri` key, so items stay byte-for-byte what the
//! author feed returned and can be forwarded as events unchanged.
//!
//! ## Equality
//!
//! Both types derive [`PartialEq`] over the full JSON tree.  For
//! [`FeedSnapshot`] that includes every top-level field next to `feed`
//! (e.g. `cursor`), which is what the "nothing changed" short-circuit in
//! [`crate::diff`] relies on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One element of an author feed, e.g. `{"post": {...}, "reply": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedItem(Value);

impl FeedItem {
    #[cfg(test)]
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// Unique key of the item: the `at://` URI of the post.
    ///
    /// `None` when the payload has no `post.uri` string, which happens
    /// with unexpected payload shapes.  Such items can only ever match on
    /// exact equality.
    pub fn key(&self) -> Option<&str> {
        self.0.pointer("/post/uri").and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }
}

/// One fetched page of an author feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    /// Items in the order the source returned them (newest first by
    /// convention, but nothing depends on that).
    pub feed: Vec<FeedItem>,

    /// Every other top-level field of the response.
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl FeedSnapshot {
    #[cfg(test)]
    pub fn new(feed: Vec<FeedItem>) -> Self {
        Self {
            feed,
            meta: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
