//! A live, newline-indexed view of a possibly-compressed object
//!
//! Chunks from the streaming download are pushed through the transform,
//! appended to the mapped temp file and scanned for newlines. Readers query
//! lines and content concurrently with the writer: metadata sits behind a
//! short-lived mutex, file bytes are copied out under the map's read lock.
//!
//! Line offset invariants:
//! - `line_offsets[0] == 0` as soon as any byte is written
//! - offsets are strictly increasing byte positions in the *post-transform*
//!   file where each line starts
//! - a newline that ends the file does not open a new line until more data
//!   arrives (or ever, if the stream completes there) — the deferred start
//!   is parked in `pending_line_start`

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::preview::file::StreamingFile;
use crate::preview::transform::StreamTransform;

struct PreviewState {
    bytes_downloaded: u64,
    bytes_written: u64,
    complete: bool,
    line_offsets: Vec<u64>,
    pending_line_start: Option<u64>,
    transform: Box<dyn StreamTransform>,
    transform_failed: bool,
}

pub struct StreamingFilePreview {
    bucket: String,
    key: String,
    total_source_bytes: u64,
    file: StreamingFile,
    state: Mutex<PreviewState>,
}

impl StreamingFilePreview {
    /// Create a preview seeded with whatever initial bytes are already on
    /// hand (typically the 64 KiB prefetch), counted at source offset 0.
    pub fn new(
        bucket: &str,
        key: &str,
        initial_data: &[u8],
        total_source_bytes: u64,
        transform: Box<dyn StreamTransform>,
    ) -> Result<Self> {
        let preview = StreamingFilePreview {
            bucket: bucket.to_string(),
            key: key.to_string(),
            total_source_bytes,
            file: StreamingFile::create()?,
            state: Mutex::new(PreviewState {
                bytes_downloaded: 0,
                bytes_written: 0,
                complete: false,
                line_offsets: Vec::new(),
                pending_line_start: None,
                transform,
                transform_failed: false,
            }),
        };
        if !initial_data.is_empty() {
            preview.append_chunk(initial_data, 0);
        }
        Ok(preview)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Feed one chunk of source bytes at its source offset. Chunks arrive
    /// in order from the single streaming request; anything else is stale
    /// and dropped.
    pub fn append_chunk(&self, data: &[u8], source_offset: u64) {
        let mut state = self.state.lock().unwrap();
        if source_offset != state.bytes_downloaded {
            warn!(
                expected = state.bytes_downloaded,
                got = source_offset,
                "dropping out-of-order chunk"
            );
            return;
        }
        state.bytes_downloaded += data.len() as u64;

        let decoded = match state.transform.transform(data) {
            Ok(decoded) => decoded,
            Err(err) => {
                if !state.transform_failed {
                    warn!(key = %self.key, error = %err, "transform failed, preview truncated");
                    state.transform_failed = true;
                }
                Vec::new()
            }
        };
        self.write_and_index(&mut state, &decoded);

        if state.bytes_downloaded >= self.total_source_bytes && !state.complete {
            self.complete_locked(&mut state);
        }
        drop(state);

        if let Err(err) = self.file.remap() {
            warn!(key = %self.key, error = %err, "remap failed");
        }
    }

    /// Mark the stream finished: flush the transform, index the residue.
    pub fn finish_stream(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.complete {
            self.complete_locked(&mut state);
        }
        drop(state);
        if let Err(err) = self.file.remap() {
            warn!(key = %self.key, error = %err, "remap failed");
        }
    }

    fn complete_locked(&self, state: &mut PreviewState) {
        state.complete = true;
        let residue = match state.transform.flush() {
            Ok(residue) => residue,
            Err(err) => {
                warn!(key = %self.key, error = %err, "transform flush failed");
                Vec::new()
            }
        };
        self.write_and_index(state, &residue);
        // A trailing newline at end of a completed stream opens no line.
        state.pending_line_start = None;
        debug!(
            key = %self.key,
            written = state.bytes_written,
            lines = state.line_offsets.len(),
            "stream complete"
        );
    }

    fn write_and_index(&self, state: &mut PreviewState, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let base = state.bytes_written;
        if let Err(err) = self.file.append(data) {
            warn!(key = %self.key, error = %err, "temp file append failed");
            return;
        }

        if state.line_offsets.is_empty() {
            state.line_offsets.push(0);
        }
        if let Some(deferred) = state.pending_line_start.take() {
            state.line_offsets.push(deferred);
        }

        let end = base + data.len() as u64;
        for (i, byte) in data.iter().enumerate() {
            if *byte == b'\n' {
                let next = base + i as u64 + 1;
                if next < end {
                    state.line_offsets.push(next);
                } else {
                    state.pending_line_start = Some(next);
                }
            }
        }
        state.bytes_written = end;
    }

    /// Number of indexed lines; at least 1 once any byte exists.
    pub fn line_count(&self) -> usize {
        self.state.lock().unwrap().line_offsets.len()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.state.lock().unwrap().bytes_downloaded
    }

    pub fn bytes_written(&self) -> u64 {
        self.state.lock().unwrap().bytes_written
    }

    pub fn total_source_bytes(&self) -> u64 {
        self.total_source_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().complete
    }

    /// Source offset the next range request should start from.
    pub fn next_byte_needed(&self) -> u64 {
        self.state.lock().unwrap().bytes_downloaded
    }

    /// A line is complete once a later line has started, or the stream has.
    pub fn is_line_complete(&self, index: usize) -> bool {
        let state = self.state.lock().unwrap();
        index + 1 < state.line_offsets.len() || state.complete
    }

    /// Copy line `index`, stripped of its trailing `\n` / `\r`. Empty when
    /// the line does not exist (yet) or its bytes are not mapped yet.
    pub fn get_line(&self, index: usize) -> String {
        let (start, end) = {
            let state = self.state.lock().unwrap();
            let Some(&start) = state.line_offsets.get(index) else {
                return String::new();
            };
            let end = match state.line_offsets.get(index + 1) {
                Some(&next) => next,
                None => state.pending_line_start.unwrap_or(state.bytes_written),
            };
            (start, end)
        };

        let mut bytes = self.file.read_range(start, end);
        while matches!(bytes.last(), Some(b'\n') | Some(b'\r')) {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Copy of everything readable so far.
    pub fn get_all_content(&self) -> Vec<u8> {
        self.file.read_range(0, self.file.readable_len())
    }
}

impl Drop for StreamingFilePreview {
    fn drop(&mut self) {
        debug!(key = %self.key, "dropping streaming preview");
    }
}
