//! Result events flowing from engine workers to the UI thread
//!
//! Workers push tagged [`StateEvent`]s onto the [`EventBus`]; the consumer
//! drains the bus in bulk once per frame. Events produced by one worker
//! appear in the order that worker produced them; no ordering is promised
//! across workers.

use std::sync::Mutex;

/// A bucket entry from ListBuckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub creation_date: String,
}

/// An object or folder entry from ListObjectsV2.
///
/// Folders are derived from `CommonPrefixes` and carry `size == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub key: String,
    pub display_name: String,
    pub size: i64,
    pub last_modified: String,
    pub is_folder: bool,
}

impl Object {
    /// Build a folder entry from a common prefix like `"a/b/c/"`.
    pub fn folder(prefix: &str) -> Self {
        let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
        let display_name = match trimmed.rfind('/') {
            Some(pos) => trimmed[pos + 1..].to_string(),
            None => trimmed.to_string(),
        };
        Object {
            key: prefix.to_string(),
            display_name,
            size: 0,
            last_modified: String::new(),
            is_folder: true,
        }
    }

    /// Build a file entry from a full key like `"a/b/c.txt"`.
    pub fn file(key: &str, size: i64, last_modified: String) -> Self {
        let display_name = match key.rfind('/') {
            Some(pos) => key[pos + 1..].to_string(),
            None => key.to_string(),
        };
        Object {
            key: key.to_string(),
            display_name,
            size,
            last_modified,
            is_folder: false,
        }
    }
}

/// A state change produced by a backend worker.
#[derive(Debug, Clone)]
pub enum StateEvent {
    BucketsLoaded {
        buckets: Vec<Bucket>,
    },
    BucketsLoadError {
        error: String,
    },
    ObjectsLoaded {
        bucket: String,
        prefix: String,
        /// The continuation token this request was sent with; empty for the
        /// initial page. The model replaces on empty, appends otherwise.
        sent_token: String,
        objects: Vec<Object>,
        next_token: String,
        is_truncated: bool,
    },
    ObjectsLoadError {
        bucket: String,
        prefix: String,
        error: String,
    },
    ObjectContentLoaded {
        bucket: String,
        key: String,
        content: Vec<u8>,
        /// Total object size from Content-Range, when a ranged read saw one.
        total_size: Option<u64>,
    },
    ObjectContentLoadError {
        bucket: String,
        key: String,
        error: String,
    },
    ObjectRangeLoaded {
        bucket: String,
        key: String,
        start_byte: u64,
        total_size: u64,
        data: Vec<u8>,
    },
    ObjectRangeLoadError {
        bucket: String,
        key: String,
        start_byte: u64,
        error: String,
    },
}

type Waker = Box<dyn Fn() + Send + Sync>;

/// Multi-producer, single-consumer event queue.
///
/// Workers append under a mutex; the consumer moves the whole vector out
/// with [`EventBus::take`]. An optional waker is invoked after each push so
/// a blocked UI loop can be nudged; without one the consumer simply polls.
#[derive(Default)]
pub struct EventBus {
    events: Mutex<Vec<StateEvent>>,
    waker: Mutex<Option<Waker>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and nudge the consumer if a waker is installed.
    pub fn push(&self, event: StateEvent) {
        {
            let mut events = self.events.lock().unwrap();
            events.push(event);
        }
        if let Some(waker) = self.waker.lock().unwrap().as_ref() {
            waker();
        }
    }

    /// Move all queued events out, leaving the bus empty.
    pub fn take(&self) -> Vec<StateEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Install a wake callback invoked after each push.
    pub fn set_waker(&self, waker: Waker) {
        *self.waker.lock().unwrap() = Some(waker);
    }
}
