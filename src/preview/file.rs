//! Memory-mapped append-only temp file backing a streaming preview
//!
//! The file is created and immediately unlinked, so it disappears with the
//! process even on a crash. One worker appends with positional writes and
//! publishes the new length with a release store; the UI thread reads
//! through a lazily extended read-only mapping. Readers must stay within
//! [`StreamingFile::readable_len`], which is the intersection of what has
//! been written and what the current mapping covers.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use memmap2::{Mmap, MmapOptions};

use crate::errors::Result;

const INITIAL_CAPACITY: u64 = 64 * 1024;
const GROWTH_CHUNK: u64 = 1024 * 1024;
const PAGE_SIZE: u64 = 4096;

pub struct StreamingFile {
    file: File,
    /// Bytes written so far; release-stored after each append.
    size: AtomicU64,
    /// Allocated file length. Only the writer grows it.
    capacity: AtomicU64,
    /// Current read-only mapping. The write lock is held only during
    /// remap so the pointer is never swapped mid-read.
    map: RwLock<Option<Mmap>>,
}

impl StreamingFile {
    /// Create an anonymous temp file pre-allocated to 64 KiB.
    pub fn create() -> Result<Self> {
        let file = tempfile::tempfile()?;
        file.set_len(INITIAL_CAPACITY)?;
        Ok(StreamingFile {
            file,
            size: AtomicU64::new(0),
            capacity: AtomicU64::new(INITIAL_CAPACITY),
            map: RwLock::new(None),
        })
    }

    /// Append at the current end, growing the file in 1 MiB steps.
    /// Single-writer only.
    pub fn append(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let current = self.size.load(Ordering::Relaxed);
        let needed = current + data.len() as u64;

        if needed > self.capacity.load(Ordering::Relaxed) {
            let new_capacity = (needed / GROWTH_CHUNK + 1) * GROWTH_CHUNK;
            self.file.set_len(new_capacity)?;
            self.capacity.store(new_capacity, Ordering::Relaxed);
        }

        self.file.write_all_at(data, current)?;
        self.size.store(needed, Ordering::Release);
        Ok(())
    }

    /// Bytes written so far. May exceed what the mapping covers.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Extend the mapping to cover everything written, rounded up to page
    /// size. No-op while nothing has been written or the mapping already
    /// covers the current size.
    pub fn remap(&self) -> Result<()> {
        let mut guard = self.map.write().unwrap();
        let current = self.size.load(Ordering::Acquire);
        if current == 0 {
            return Ok(());
        }
        if let Some(map) = guard.as_ref() {
            if current as usize <= map.len() {
                return Ok(());
            }
        }

        let map_len = current.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        if map_len > self.capacity.load(Ordering::Relaxed) {
            self.file.set_len(map_len)?;
            self.capacity.store(map_len, Ordering::Relaxed);
        }

        let map = unsafe { MmapOptions::new().len(map_len as usize).map_copy_read_only(&self.file)? };
        *guard = Some(map);
        Ok(())
    }

    /// The safe read bound: `min(mapped, written)`.
    pub fn readable_len(&self) -> u64 {
        let guard = self.map.read().unwrap();
        let mapped = guard.as_ref().map(|m| m.len() as u64).unwrap_or(0);
        mapped.min(self.size.load(Ordering::Acquire))
    }

    /// Copy out `[start, end)`, clamped to the readable bound.
    pub fn read_range(&self, start: u64, end: u64) -> Vec<u8> {
        let guard = self.map.read().unwrap();
        let Some(map) = guard.as_ref() else {
            return Vec::new();
        };
        let bound = (map.len() as u64).min(self.size.load(Ordering::Acquire));
        let start = start.min(bound) as usize;
        let end = end.min(bound) as usize;
        if start >= end {
            return Vec::new();
        }
        map[start..end].to_vec()
    }
}
