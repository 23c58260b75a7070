//! Folder nodes: one per `"bucket/prefix"`, owned by the browser model

use crate::events::Object;

/// Cached listing state for one folder. Created lazily on first reference,
/// mutated only by the consumer thread, destroyed on profile switch or
/// refresh.
#[derive(Debug, Clone, Default)]
pub struct FolderNode {
    pub bucket: String,
    pub prefix: String,
    pub objects: Vec<Object>,
    pub next_continuation_token: String,
    pub is_truncated: bool,
    pub loading: bool,
    pub loaded: bool,
    pub error: String,
}

/// Flat-table key: `"bucket/prefix"`.
pub fn node_key(bucket: &str, prefix: &str) -> String {
    format!("{}/{}", bucket, prefix)
}
