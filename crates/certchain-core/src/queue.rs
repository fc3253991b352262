//! The in-process certification queue.
//!
//! Items wait here until a batch build drains them. The queue is keyed by
//! content hash: submitting content that is already queued is a no-op that
//! returns the existing hash.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::hash::ContentHasher;
use crate::types::{now_millis, ContentType, PayloadRef};

/// A request to certify a piece of content.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The raw content bytes.
    pub content: Bytes,
    /// What kind of content this is.
    pub content_type: ContentType,
    /// Caller-side reference carried through to the queue item.
    pub payload_ref: PayloadRef,
}

impl Submission {
    pub fn new(content: impl Into<Bytes>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
            payload_ref: PayloadRef::default(),
        }
    }

    pub fn with_payload_ref(mut self, payload_ref: impl Into<PayloadRef>) -> Self {
        self.payload_ref = payload_ref.into();
        self
    }
}

/// A pending certification awaiting batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub content_hash: Digest,
    pub content_type: ContentType,
    /// When the item was queued (Unix ms).
    pub submitted_at: i64,
    pub payload_ref: PayloadRef,
}

impl QueueItem {
    /// Create an item for content that has already been hashed.
    pub fn new(content_hash: Digest, content_type: ContentType, payload_ref: PayloadRef) -> Self {
        Self {
            content_hash,
            content_type,
            submitted_at: now_millis(),
            payload_ref,
        }
    }
}

/// Ordered buffer of pending certifications.
///
/// A single mutex guards the buffer. It is never held while hashing, and
/// `drain` holds it only long enough to swap the buffer out, so an item
/// enqueued concurrently with a drain lands either in the drained batch or
/// in the next one.
#[derive(Debug, Default)]
pub struct CertificationQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// Items in arrival order.
    items: Vec<QueueItem>,
    /// Content hashes currently queued.
    index: HashSet<Digest>,
}

impl CertificationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hash and enqueue a submission, returning its content hash.
    pub fn enqueue(&self, submission: Submission) -> Digest {
        let content_hash = ContentHasher::hash_content(&submission.content);
        let item = QueueItem::new(content_hash, submission.content_type, submission.payload_ref);
        self.push(item);
        content_hash
    }

    /// Enqueue an already-hashed item.
    ///
    /// Returns `false` if an item with the same content hash is already queued.
    pub fn push(&self, item: QueueItem) -> bool {
        let mut inner = self.lock();
        if !inner.index.insert(item.content_hash) {
            tracing::debug!(hash = %item.content_hash, "content already queued");
            return false;
        }
        inner.items.push(item);
        true
    }

    /// Number of queued items.
    pub fn size(&self) -> u32 {
        self.lock().items.len() as u32
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Whether content with this hash is currently queued.
    pub fn contains(&self, content_hash: &Digest) -> bool {
        self.lock().index.contains(content_hash)
    }

    /// Snapshot of the queued items in arrival order.
    pub fn peek(&self) -> Vec<QueueItem> {
        self.lock().items.clone()
    }

    /// Remove and return every queued item atomically.
    pub fn drain(&self) -> Vec<QueueItem> {
        let mut inner = self.lock();
        inner.index.clear();
        std::mem::take(&mut inner.items)
    }

    /// Drop every queued item, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let discarded = self.drain().len();
        if discarded > 0 {
            tracing::info!(discarded, "certification queue cleared");
        }
        discarded
    }
}
