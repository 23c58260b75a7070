//! Work items flowing through the engine's priority queues

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag. Setting it is idempotent; an in-flight
/// transfer observing it aborts without emitting an event.
pub type CancelFlag = Arc<AtomicBool>;

pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// User actions.
    High,
    /// Prefetch.
    Low,
}

#[derive(Debug, Clone)]
pub enum WorkKind {
    ListBuckets,
    ListObjects {
        bucket: String,
        prefix: String,
        continuation_token: String,
    },
    GetObject {
        bucket: String,
        key: String,
        /// Cap on bytes fetched via a `Range` header; 0 = whole object.
        max_bytes: u64,
    },
    GetObjectRange {
        bucket: String,
        key: String,
        start_byte: u64,
        end_byte: u64,
    },
    GetObjectStreaming {
        bucket: String,
        key: String,
        start_byte: u64,
        total_size: u64,
    },
    /// Sentinel that makes a worker exit its loop.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub kind: WorkKind,
    pub priority: Priority,
    pub queued_at: Instant,
    pub cancel_flag: Option<CancelFlag>,
}

impl WorkItem {
    pub fn new(kind: WorkKind, priority: Priority) -> Self {
        WorkItem {
            kind,
            priority,
            queued_at: Instant::now(),
            cancel_flag: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Does this item list the given folder (any continuation page)?
    pub fn matches_listing(&self, bucket: &str, prefix: &str) -> bool {
        matches!(
            &self.kind,
            WorkKind::ListObjects { bucket: b, prefix: p, .. } if b == bucket && p == prefix
        )
    }

    /// Does this item fetch the given object's content?
    pub fn matches_object(&self, bucket: &str, key: &str) -> bool {
        matches!(
            &self.kind,
            WorkKind::GetObject { bucket: b, key: k, .. } if b == bucket && k == key
        )
    }
}
