//! Preview management: selection, prefetch cache, streaming binding
//!
//! Owns the current selection, a small first-64-KiB content cache keyed by
//! `bucket/key`, and the active [`StreamingFilePreview`]. Selecting a file
//! reuses a pending hover prefetch when one exists (boosting it to high
//! priority) instead of issuing a duplicate request.

pub mod file;
pub mod jsonl;
pub mod streaming;
pub mod supported;
pub mod transform;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::work::{new_cancel_flag, CancelFlag};
use crate::engine::Backend;
use crate::preview::streaming::StreamingFilePreview;
use crate::preview::supported::{is_compressed, is_preview_supported};
use crate::preview::transform::transform_for_key;

/// Initial fetch cap for previews; also the threshold past which a
/// selection streams the rest of the object.
pub const PREVIEW_MAX_BYTES: u64 = 64 * 1024;
pub const STREAMING_THRESHOLD: u64 = 64 * 1024;

pub struct PreviewManager {
    backend: Arc<dyn Backend>,

    selected_bucket: String,
    selected_key: String,
    selected_file_size: u64,

    preview_content: Vec<u8>,
    preview_error: String,
    preview_loading: bool,
    preview_supported: bool,

    /// bucket/key -> first PREVIEW_MAX_BYTES of content.
    preview_cache: HashMap<String, Vec<u8>>,
    pending_requests: HashSet<String>,
    last_hovered_file: String,

    streaming: Option<StreamingFilePreview>,
    streaming_cancel: Option<CancelFlag>,
}

fn cache_key(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

impl PreviewManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        PreviewManager {
            backend,
            selected_bucket: String::new(),
            selected_key: String::new(),
            selected_file_size: 0,
            preview_content: Vec::new(),
            preview_error: String::new(),
            preview_loading: false,
            preview_supported: false,
            preview_cache: HashMap::new(),
            pending_requests: HashSet::new(),
            last_hovered_file: String::new(),
            streaming: None,
            streaming_cancel: None,
        }
    }

    /// Current preview bytes: the live streamed view when one exists, else
    /// the buffered initial content.
    pub fn preview_content(&self) -> Vec<u8> {
        match &self.streaming {
            Some(streaming) => streaming.get_all_content(),
            None => self.preview_content.clone(),
        }
    }

    pub fn preview_error(&self) -> &str {
        &self.preview_error
    }

    pub fn preview_loading(&self) -> bool {
        self.preview_loading
    }

    pub fn preview_supported(&self) -> bool {
        self.preview_supported
    }

    pub fn selection(&self) -> Option<(&str, &str)> {
        if self.selected_key.is_empty() {
            None
        } else {
            Some((&self.selected_bucket, &self.selected_key))
        }
    }

    pub fn streaming_preview(&self) -> Option<&StreamingFilePreview> {
        self.streaming.as_ref()
    }

    /// Select a file for preview.
    ///
    /// Resolution order: same selection is a no-op; cached content is used
    /// immediately (streaming the remainder when compressed or large); a
    /// pending prefetch is boosted; otherwise a fresh high-priority fetch
    /// of the first 64 KiB is issued.
    pub fn select_file(&mut self, bucket: &str, key: &str, file_size: u64) {
        if self.selected_bucket == bucket && self.selected_key == key {
            return;
        }
        self.cancel_streaming();

        info!(bucket, key, file_size, "selecting file");
        self.selected_bucket = bucket.to_string();
        self.selected_key = key.to_string();
        self.selected_file_size = file_size;
        self.preview_content.clear();
        self.preview_error.clear();
        self.preview_supported = is_preview_supported(key);

        if !self.preview_supported {
            self.preview_loading = false;
            return;
        }

        let cache_key = cache_key(bucket, key);
        if let Some(content) = self.preview_cache.get(&cache_key).cloned() {
            debug!(bucket, key, "preview cache hit");
            self.preview_content = content;
            self.preview_loading = false;

            if is_compressed(key) || file_size > STREAMING_THRESHOLD {
                self.start_streaming();
            }
            return;
        }

        if self.backend.prioritize_object_request(bucket, key) {
            debug!(bucket, key, "boosted pending prefetch for selection");
            self.preview_loading = true;
            return;
        }

        self.preview_loading = true;
        self.pending_requests.insert(cache_key);
        self.backend.get_object(bucket, key, PREVIEW_MAX_BYTES, false, false);
    }

    pub fn clear_selection(&mut self) {
        self.cancel_streaming();
        self.selected_bucket.clear();
        self.selected_key.clear();
        self.selected_file_size = 0;
        self.preview_content.clear();
        self.preview_error.clear();
        self.preview_loading = false;
        self.preview_supported = false;
    }

    /// Drop everything, cache included (profile switch, refresh).
    pub fn clear_all(&mut self) {
        self.clear_selection();
        self.preview_cache.clear();
        self.pending_requests.clear();
        self.last_hovered_file.clear();
    }

    /// Hover prefetch: queue one cancellable low-priority fetch of the
    /// first 64 KiB, only when the hovered file changes.
    pub fn prefetch_file_preview(&mut self, bucket: &str, key: &str) {
        if !is_preview_supported(key) {
            return;
        }
        let cache_key = cache_key(bucket, key);
        if self.preview_cache.contains_key(&cache_key) {
            return;
        }
        if self.selected_bucket == bucket && self.selected_key == key {
            return;
        }
        if self.last_hovered_file == cache_key {
            return;
        }

        self.last_hovered_file = cache_key;
        debug!(bucket, key, "prefetching file preview on hover");
        self.backend.get_object(bucket, key, PREVIEW_MAX_BYTES, true, true);
    }

    pub fn on_object_content_loaded(
        &mut self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        _total_size: Option<u64>,
    ) {
        let cache_key = cache_key(bucket, key);
        self.preview_cache.insert(cache_key.clone(), content.clone());
        self.pending_requests.remove(&cache_key);

        if bucket != self.selected_bucket || key != self.selected_key {
            return;
        }

        let content_len = content.len() as u64;
        self.preview_content = content;
        self.preview_loading = false;
        self.preview_error.clear();

        let needs_streaming = is_compressed(key)
            || (self.selected_file_size > STREAMING_THRESHOLD && self.selected_file_size > content_len);
        let already_streaming = self
            .streaming
            .as_ref()
            .map(|s| s.bucket() == bucket && s.key() == key)
            .unwrap_or(false);
        if needs_streaming && !already_streaming {
            self.start_streaming();
        }
    }

    pub fn on_object_content_error(&mut self, bucket: &str, key: &str, error: &str) {
        self.pending_requests.remove(&cache_key(bucket, key));
        if bucket == self.selected_bucket && key == self.selected_key {
            self.preview_loading = false;
            self.preview_error = error.to_string();
        }
    }

    pub fn on_object_range_loaded(&mut self, bucket: &str, key: &str, start_byte: u64, data: &[u8]) {
        if let Some(streaming) = &self.streaming {
            if streaming.bucket() == bucket && streaming.key() == key {
                streaming.append_chunk(data, start_byte);
            }
        }
    }

    pub fn on_object_range_error(&mut self, bucket: &str, key: &str, start_byte: u64, error: &str) {
        if let Some(streaming) = &self.streaming {
            if streaming.bucket() == bucket && streaming.key() == key {
                // Partial data stays readable; the stream just stops here.
                warn!(bucket, key, start_byte, error, "streaming error, keeping partial preview");
            }
        }
    }

    /// Bind the current selection to a streaming preview and request the
    /// bytes past the initial content.
    fn start_streaming(&mut self) {
        if self.selected_bucket.is_empty() || self.selected_key.is_empty() {
            return;
        }
        self.cancel_streaming();

        let total = self.selected_file_size;
        info!(
            bucket = %self.selected_bucket,
            key = %self.selected_key,
            total,
            "starting streaming download"
        );

        let transform = match transform_for_key(&self.selected_key) {
            Ok(transform) => transform,
            Err(err) => {
                self.preview_error = err.to_string();
                return;
            }
        };
        let preview = match StreamingFilePreview::new(
            &self.selected_bucket,
            &self.selected_key,
            &self.preview_content,
            total,
            transform,
        ) {
            Ok(preview) => preview,
            Err(err) => {
                self.preview_error = err.to_string();
                return;
            }
        };

        let start_byte = preview.next_byte_needed();
        let cancel = new_cancel_flag();
        self.streaming = Some(preview);
        self.streaming_cancel = Some(cancel.clone());

        if start_byte < total {
            self.backend.get_object_streaming(
                &self.selected_bucket,
                &self.selected_key,
                start_byte,
                total,
                Some(cancel),
            );
        }
    }

    fn cancel_streaming(&mut self) {
        if let Some(flag) = self.streaming_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
        self.streaming = None;
    }
}

impl Drop for PreviewManager {
    fn drop(&mut self) {
        if let Some(flag) = self.streaming_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
