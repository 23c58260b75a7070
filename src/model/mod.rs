//! The browser model: buckets, folder nodes, navigation and prefetch
//!
//! Runs entirely on the consumer thread. Commands enqueue work on the
//! backend; [`BrowserModel::process_events`] drains the event bus once per
//! frame and applies the results. The model owns the flat folder-node
//! table (keyed `"bucket/prefix"`, no ownership cycles) and the preview
//! manager.

pub mod node;
pub mod path;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::profile::{default_profile_name, AwsProfile};
use crate::engine::work::{new_cancel_flag, CancelFlag};
use crate::engine::Backend;
use crate::events::{Bucket, StateEvent};
use crate::model::node::{node_key, FolderNode};
use crate::model::path::parse_s3_path;
use crate::preview::PreviewManager;

/// Initial-page subfolder prefetch cap.
const MAX_SUBFOLDER_PREFETCH: usize = 20;

pub struct BrowserModel {
    backend: Arc<dyn Backend>,

    profiles: Vec<AwsProfile>,
    selected_profile: usize,

    buckets: Vec<Bucket>,
    buckets_loading: bool,
    buckets_error: String,

    nodes: HashMap<String, FolderNode>,
    current_bucket: String,
    current_prefix: String,

    /// Shared by every pagination continuation of the current folder;
    /// navigating away sets it and mints a fresh one.
    pagination_cancel: Option<CancelFlag>,
    last_hovered_folder: String,

    preview: PreviewManager,
}

impl BrowserModel {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        BrowserModel {
            preview: PreviewManager::new(backend.clone()),
            backend,
            profiles: Vec::new(),
            selected_profile: 0,
            buckets: Vec::new(),
            buckets_loading: false,
            buckets_error: String::new(),
            nodes: HashMap::new(),
            current_bucket: String::new(),
            current_prefix: String::new(),
            pagination_cancel: None,
            last_hovered_folder: String::new(),
        }
    }

    /// Install the profile list and pick the initial selection:
    /// `$AWS_PROFILE` when it names a loaded profile, else `default`.
    pub fn set_profiles(&mut self, profiles: Vec<AwsProfile>) {
        self.profiles = profiles;
        self.selected_profile = 0;
        let wanted = default_profile_name();
        if let Some(index) = self.profiles.iter().position(|p| p.name == wanted) {
            self.selected_profile = index;
        }
        info!(count = self.profiles.len(), selected = self.selected_profile, "profiles installed");
    }

    /// Point the selection at a named profile without switching the
    /// backend; used once at startup before the first refresh.
    pub fn select_initial_profile(&mut self, name: &str) {
        if let Some(index) = self.profiles.iter().position(|p| p.name == name) {
            self.selected_profile = index;
        }
    }

    pub fn profiles(&self) -> &[AwsProfile] {
        &self.profiles
    }

    pub fn selected_profile_index(&self) -> usize {
        self.selected_profile
    }

    pub fn selected_profile(&self) -> Option<&AwsProfile> {
        self.profiles.get(self.selected_profile)
    }

    /// Switch profiles: wipes all loaded state and starts over.
    pub fn select_profile(&mut self, index: usize) {
        if index >= self.profiles.len() || index == self.selected_profile {
            return;
        }
        info!(profile = %self.profiles[index].name, "selecting profile");
        self.selected_profile = index;

        self.buckets.clear();
        self.buckets_error.clear();
        self.nodes.clear();
        self.current_bucket.clear();
        self.current_prefix.clear();

        self.backend.set_profile(self.profiles[index].clone());
        self.refresh();
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn buckets_loading(&self) -> bool {
        self.buckets_loading
    }

    pub fn buckets_error(&self) -> &str {
        &self.buckets_error
    }

    pub fn current_bucket(&self) -> &str {
        &self.current_bucket
    }

    pub fn current_prefix(&self) -> &str {
        &self.current_prefix
    }

    pub fn node(&self, bucket: &str, prefix: &str) -> Option<&FolderNode> {
        self.nodes.get(&node_key(bucket, prefix))
    }

    pub fn current_node(&self) -> Option<&FolderNode> {
        self.node(&self.current_bucket, &self.current_prefix)
    }

    pub fn preview(&self) -> &PreviewManager {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut PreviewManager {
        &mut self.preview
    }

    /// Reload the bucket list, dropping every node and cached preview.
    pub fn refresh(&mut self) {
        if self.profiles.is_empty() {
            debug!("refresh with no profiles is a no-op");
            return;
        }
        info!("refreshing bucket list");
        self.buckets.clear();
        self.buckets_error.clear();
        self.buckets_loading = true;
        self.nodes.clear();
        self.preview.clear_all();
        self.last_hovered_folder.clear();

        if let Some(flag) = self.pagination_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }

        self.backend.list_buckets();
    }

    /// Load a folder's first page, reusing a queued prefetch when present.
    pub fn load_folder(&mut self, bucket: &str, prefix: &str) {
        let node = self.get_or_create_node(bucket, prefix);
        if node.loaded || node.loading {
            return;
        }
        debug!(bucket, prefix, "loading folder");
        node.objects.clear();
        node.error.clear();
        node.loading = true;

        if !self.backend.prioritize_request(bucket, prefix) {
            self.backend.list_objects(bucket, prefix, "", None);
        }
    }

    /// Fetch the next page of a truncated folder under the shared
    /// pagination cancel flag.
    pub fn load_more(&mut self, bucket: &str, prefix: &str) {
        let cancel = self.pagination_cancel.clone();
        let Some(node) = self.nodes.get_mut(&node_key(bucket, prefix)) else {
            return;
        };
        if !node.is_truncated || node.loading {
            return;
        }
        debug!(bucket, prefix, "loading next page");
        node.loading = true;
        let token = node.next_continuation_token.clone();
        self.backend.list_objects(bucket, prefix, &token, cancel);
    }

    /// Navigate to an `s3://` path. An unknown bucket is added to the list
    /// so buckets the profile cannot enumerate are still reachable.
    pub fn navigate_to(&mut self, s3_path: &str) {
        info!(path = s3_path, "navigating");
        let (bucket, prefix) = parse_s3_path(s3_path);
        if bucket.is_empty() {
            self.preview.clear_selection();
            self.set_current_path("", "");
            return;
        }
        self.add_manual_bucket(&bucket);
        self.navigate_into(&bucket, &prefix);
    }

    pub fn navigate_up(&mut self) {
        if self.current_bucket.is_empty() {
            return;
        }
        if self.current_prefix.is_empty() {
            self.preview.clear_selection();
            self.set_current_path("", "");
            return;
        }

        let trimmed = self.current_prefix.trim_end_matches('/');
        let parent = match trimmed.rfind('/') {
            Some(pos) => trimmed[..pos + 1].to_string(),
            None => String::new(),
        };
        let bucket = self.current_bucket.clone();
        self.navigate_into(&bucket, &parent);
    }

    pub fn navigate_into(&mut self, bucket: &str, prefix: &str) {
        debug!(bucket, prefix, "navigating into");
        self.preview.clear_selection();
        self.set_current_path(bucket, prefix);
        self.load_folder(bucket, prefix);

        // Already loaded from a prefetch or an earlier visit: no
        // ObjectsLoaded event will fire, so prefetch and resume here.
        let Some(node) = self.node(bucket, prefix) else {
            return;
        };
        if node.loaded {
            let objects = node.objects.clone();
            let resume = node.is_truncated && !node.loading;
            self.trigger_subfolder_prefetch(bucket, &objects);
            if resume {
                debug!(bucket, prefix, "resuming pagination");
                self.load_more(bucket, prefix);
            }
        }
    }

    /// Hover prefetch for a folder: one cancellable low-priority listing,
    /// queued only when the hovered folder changes.
    pub fn prefetch_folder(&mut self, bucket: &str, prefix: &str) {
        if let Some(node) = self.node(bucket, prefix) {
            if node.loaded || node.loading {
                return;
            }
        }
        let folder_key = node_key(bucket, prefix);
        if self.last_hovered_folder == folder_key {
            return;
        }

        // The previous hover request is being cancelled; clear its spinner
        // unless it already finished.
        if !self.last_hovered_folder.is_empty() {
            if let Some((old_bucket, old_prefix)) = split_node_key(&self.last_hovered_folder) {
                if let Some(old_node) = self.nodes.get_mut(&node_key(&old_bucket, &old_prefix)) {
                    if old_node.loading && !old_node.loaded {
                        old_node.loading = false;
                    }
                }
            }
        }

        // Mark loading now so a click before completion does not queue a
        // duplicate request.
        let node = self.get_or_create_node(bucket, prefix);
        node.loading = true;

        self.last_hovered_folder = folder_key;
        debug!(bucket, prefix, "prefetching folder on hover");
        self.backend.list_objects_prefetch(bucket, prefix, true);
    }

    /// Hover prefetch for a file preview.
    pub fn prefetch_file_preview(&mut self, bucket: &str, key: &str) {
        self.preview.prefetch_file_preview(bucket, key);
    }

    /// Select a file: looks up its size in the current folder and hands
    /// off to the preview manager.
    pub fn select_file(&mut self, bucket: &str, key: &str) {
        let size = self
            .current_node()
            .and_then(|node| {
                node.objects
                    .iter()
                    .find(|o| !o.is_folder && o.key == key)
                    .map(|o| o.size.max(0) as u64)
            })
            .unwrap_or(0);
        self.preview.select_file(bucket, key, size);
    }

    /// Drain the event bus and apply every event. Returns true when any
    /// state changed.
    pub fn process_events(&mut self) -> bool {
        let events = self.backend.take_events();
        if events.is_empty() {
            return false;
        }

        for event in events {
            match event {
                StateEvent::BucketsLoaded { buckets } => {
                    info!(count = buckets.len(), "buckets loaded");
                    self.buckets = buckets;
                    self.buckets_loading = false;
                    self.buckets_error.clear();
                }
                StateEvent::BucketsLoadError { error } => {
                    warn!(error = %error, "bucket list failed");
                    self.buckets_loading = false;
                    self.buckets_error = error;
                }
                StateEvent::ObjectsLoaded {
                    bucket,
                    prefix,
                    sent_token,
                    objects,
                    next_token,
                    is_truncated,
                } => {
                    self.apply_objects_loaded(bucket, prefix, sent_token, objects, next_token, is_truncated);
                }
                StateEvent::ObjectsLoadError { bucket, prefix, error } => {
                    warn!(bucket = %bucket, prefix = %prefix, error = %error, "listing failed");
                    let node = self.get_or_create_node(&bucket, &prefix);
                    node.loading = false;
                    node.error = error;
                }
                StateEvent::ObjectContentLoaded {
                    bucket,
                    key,
                    content,
                    total_size,
                } => {
                    self.preview.on_object_content_loaded(&bucket, &key, content, total_size);
                }
                StateEvent::ObjectContentLoadError { bucket, key, error } => {
                    self.preview.on_object_content_error(&bucket, &key, &error);
                }
                StateEvent::ObjectRangeLoaded {
                    bucket,
                    key,
                    start_byte,
                    data,
                    ..
                } => {
                    self.preview.on_object_range_loaded(&bucket, &key, start_byte, &data);
                }
                StateEvent::ObjectRangeLoadError {
                    bucket,
                    key,
                    start_byte,
                    error,
                } => {
                    self.preview.on_object_range_error(&bucket, &key, start_byte, &error);
                }
            }
        }
        true
    }

    fn apply_objects_loaded(
        &mut self,
        bucket: String,
        prefix: String,
        sent_token: String,
        objects: Vec<crate::events::Object>,
        next_token: String,
        is_truncated: bool,
    ) {
        debug!(
            bucket = %bucket,
            prefix = %prefix,
            count = objects.len(),
            truncated = is_truncated,
            continuation = !sent_token.is_empty(),
            "objects loaded"
        );
        let node = self.get_or_create_node(&bucket, &prefix);

        if sent_token.is_empty() {
            node.objects = objects;
        } else {
            // Concurrent in-flight pages can overlap; dedup by key.
            let existing: std::collections::HashSet<String> =
                node.objects.iter().map(|o| o.key.clone()).collect();
            node.objects
                .extend(objects.into_iter().filter(|o| !existing.contains(&o.key)));
        }

        node.next_continuation_token = next_token;
        node.is_truncated = is_truncated;
        node.loading = false;
        node.loaded = true;
        node.error.clear();
        let node_objects = node.objects.clone();

        if bucket == self.current_bucket && prefix == self.current_prefix {
            if is_truncated {
                self.load_more(&bucket, &prefix);
            }
            // Initial page only, or pagination would fan prefetch out
            // further and further.
            if sent_token.is_empty() {
                self.trigger_subfolder_prefetch(&bucket, &node_objects);
            }
        }
    }

    fn trigger_subfolder_prefetch(&mut self, bucket: &str, objects: &[crate::events::Object]) {
        let mut queued = 0usize;
        for object in objects {
            if !object.is_folder {
                continue;
            }
            if queued >= MAX_SUBFOLDER_PREFETCH {
                break;
            }
            if let Some(node) = self.node(bucket, &object.key) {
                if node.loaded || node.loading {
                    continue;
                }
            }
            if self.backend.has_pending_request(bucket, &object.key) {
                continue;
            }
            self.backend.list_objects_prefetch(bucket, &object.key, false);
            queued += 1;
        }
        if queued > 0 {
            debug!(bucket, queued, "queued subfolder prefetches");
        }
    }

    fn set_current_path(&mut self, bucket: &str, prefix: &str) {
        if bucket != self.current_bucket || prefix != self.current_prefix {
            // Abort continuations still in flight for the folder being
            // left; its partial results stay visible.
            if let Some(flag) = &self.pagination_cancel {
                debug!(
                    bucket = %self.current_bucket,
                    prefix = %self.current_prefix,
                    "cancelling pagination for previous folder"
                );
                flag.store(true, Ordering::SeqCst);
                let old_key = node_key(&self.current_bucket, &self.current_prefix);
                if let Some(old_node) = self.nodes.get_mut(&old_key) {
                    old_node.loading = false;
                }
            }
            self.pagination_cancel = Some(new_cancel_flag());
        }
        self.current_bucket = bucket.to_string();
        self.current_prefix = prefix.to_string();
    }

    fn get_or_create_node(&mut self, bucket: &str, prefix: &str) -> &mut FolderNode {
        let key = node_key(bucket, prefix);
        let node = self.nodes.entry(key).or_default();
        if node.bucket.is_empty() {
            node.bucket = bucket.to_string();
            node.prefix = prefix.to_string();
        }
        node
    }

    fn add_manual_bucket(&mut self, bucket_name: &str) {
        if self.buckets.iter().any(|b| b.name == bucket_name) {
            return;
        }
        self.buckets.push(Bucket {
            name: bucket_name.to_string(),
            creation_date: "(manually added)".to_string(),
        });
    }
}

impl Drop for BrowserModel {
    fn drop(&mut self) {
        if let Some(flag) = self.pagination_cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn split_node_key(key: &str) -> Option<(String, String)> {
    key.split_once('/')
        .map(|(bucket, prefix)| (bucket.to_string(), prefix.to_string()))
}
