//! The request engine: priority queues, workers, signing and dispatch
//!
//! Two independent FIFO queues — High for user actions, Low for prefetch —
//! each served by its own pool of OS threads. Workers never steal across
//! priorities. A dequeued item is signed with the profile's credentials
//! (region taken from the bucket region cache when known), fetched over
//! HTTPS, parsed, and turned into a [`StateEvent`] on the bus.
//!
//! `PermanentRedirect` responses are recovered once per item: the corrected
//! region is parsed from the error body, cached, and the item re-signed and
//! retried. A second redirect surfaces as an error.

pub mod http;
pub mod region;
pub mod url;
pub mod work;
pub mod xml;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::auth::profile::{refresh_profile_credentials, AwsProfile};
use crate::auth::signer::{self, SigningContext};
use crate::engine::http::{
    FetchError, HttpClient, DEFAULT_TIMEOUT, RANGE_TIMEOUT, STREAM_TIMEOUT,
};
use crate::engine::work::{new_cancel_flag, CancelFlag, Priority, WorkItem, WorkKind};
use crate::events::{EventBus, StateEvent};
use crate::errors::Result;

/// Workers per priority queue.
pub const DEFAULT_WORKERS: usize = 5;

/// The capability set the UI layer consumes. The S3 engine implements it;
/// tests substitute a deterministic in-memory variant.
pub trait Backend: Send + Sync {
    fn take_events(&self) -> Vec<StateEvent>;
    fn list_buckets(&self);
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: &str,
        cancel_flag: Option<CancelFlag>,
    );
    fn list_objects_prefetch(&self, bucket: &str, prefix: &str, cancellable: bool);
    fn get_object(&self, bucket: &str, key: &str, max_bytes: u64, low_priority: bool, cancellable: bool);
    fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
        cancel_flag: Option<CancelFlag>,
    );
    fn get_object_streaming(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        total_size: u64,
        cancel_flag: Option<CancelFlag>,
    );
    fn cancel_all(&self);
    fn prioritize_request(&self, bucket: &str, prefix: &str) -> bool;
    fn prioritize_object_request(&self, bucket: &str, key: &str) -> bool;
    fn has_pending_request(&self, bucket: &str, prefix: &str) -> bool;
    fn has_pending_object_request(&self, bucket: &str, key: &str) -> bool;
    fn set_profile(&self, profile: AwsProfile);
}

/// One mutex+condvar FIFO.
struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    ready: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn push_back(&self, item: WorkItem) {
        self.items.lock().unwrap().push_back(item);
        self.ready.notify_one();
    }

    fn push_front(&self, item: WorkItem) {
        self.items.lock().unwrap().push_front(item);
        self.ready.notify_one();
    }

    /// Block until an item is available or shutdown is flagged.
    fn pop(&self, shutdown: &AtomicBool) -> Option<WorkItem> {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if shutdown.load(Ordering::SeqCst) {
                return None;
            }
            items = self.ready.wait(items).unwrap();
        }
    }

    fn clear(&self) {
        self.items.lock().unwrap().clear();
    }

    fn notify_all(&self) {
        self.ready.notify_all();
    }

    fn any(&self, pred: impl Fn(&WorkItem) -> bool) -> bool {
        self.items.lock().unwrap().iter().any(|item| pred(item))
    }

    fn remove_first(&self, pred: impl Fn(&WorkItem) -> bool) -> Option<WorkItem> {
        let mut items = self.items.lock().unwrap();
        let pos = items.iter().position(|item| pred(item))?;
        items.remove(pos)
    }
}

/// State shared between the public handle and the worker threads.
struct EngineState {
    profile: Mutex<AwsProfile>,
    high: WorkQueue,
    low: WorkQueue,
    shutdown: AtomicBool,
    /// bucket name -> discovered region; cleared on profile switch.
    region_cache: Mutex<HashMap<String, String>>,
    /// The cancel flag of the most recent cancellable hover request.
    /// Replacing it aborts the previous hover fetch.
    hover_cancel: Mutex<Option<CancelFlag>>,
    bus: EventBus,
    http: HttpClient,
}

impl EngineState {
    fn push_event(&self, event: StateEvent) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        self.bus.push(event);
    }

    fn cached_region(&self, bucket: &str) -> Option<String> {
        self.region_cache.lock().unwrap().get(bucket).cloned()
    }

    fn cache_region(&self, bucket: &str, region: &str) {
        debug!(bucket, region, "caching bucket region");
        self.region_cache
            .lock()
            .unwrap()
            .insert(bucket.to_string(), region.to_string());
    }

    /// Region for a bucket-scoped request: cache first, then the profile.
    /// `None` means the profile has no region at all and the request must
    /// fail without touching the network.
    fn resolve_region(&self, bucket: &str) -> Option<String> {
        if let Some(region) = self.cached_region(bucket) {
            return Some(region);
        }
        let region = self.profile.lock().unwrap().region.clone();
        if region.is_empty() {
            None
        } else {
            Some(region)
        }
    }

    /// If `body` is a `PermanentRedirect`, work out the corrected region.
    /// Returns `Some` only when it differs from the region just attempted.
    fn redirect_region(&self, body: &str, bucket: &str, attempted: &str) -> Option<String> {
        if xml::extract_tag(body, "Code") != Some("PermanentRedirect") {
            return None;
        }
        let endpoint = xml::extract_tag(body, "Endpoint").unwrap_or("");
        let corrected = region::discover_redirect_region(endpoint, bucket);
        if corrected == attempted {
            warn!(bucket, endpoint, "redirect did not yield a new region");
            return None;
        }
        info!(bucket, from = attempted, to = %corrected, "PermanentRedirect, retrying with corrected region");
        self.cache_region(bucket, &corrected);
        Some(corrected)
    }
}

const NO_REGION_ERROR: &str =
    "ERROR: Region not configured. Please ensure your AWS profile has a valid region.";

pub struct RequestEngine {
    state: Arc<EngineState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    workers_per_queue: usize,
}

impl RequestEngine {
    pub fn new(profile: AwsProfile) -> Result<Self> {
        Self::with_workers(profile, DEFAULT_WORKERS)
    }

    /// `workers_per_queue == 0` leaves the queues unserved; the unit tests
    /// use this to observe queue contents deterministically.
    pub fn with_workers(profile: AwsProfile, workers_per_queue: usize) -> Result<Self> {
        info!(
            profile = %profile.name,
            region = %profile.region,
            workers = workers_per_queue,
            "starting request engine"
        );
        let state = Arc::new(EngineState {
            profile: Mutex::new(profile),
            high: WorkQueue::new(),
            low: WorkQueue::new(),
            shutdown: AtomicBool::new(false),
            region_cache: Mutex::new(HashMap::new()),
            hover_cancel: Mutex::new(None),
            bus: EventBus::new(),
            http: HttpClient::new()?,
        });

        let mut workers = Vec::with_capacity(workers_per_queue * 2);
        for priority in [Priority::High, Priority::Low] {
            for index in 0..workers_per_queue {
                let state = state.clone();
                let name = match priority {
                    Priority::High => format!("s3-high-{}", index),
                    Priority::Low => format!("s3-low-{}", index),
                };
                let handle = std::thread::Builder::new()
                    .name(name)
                    .spawn(move || worker_loop(state, priority))?;
                workers.push(handle);
            }
        }

        Ok(RequestEngine {
            state,
            workers: Mutex::new(workers),
            workers_per_queue,
        })
    }

    /// Install a callback fired whenever a worker pushes an event, so a
    /// blocked UI loop can be woken. Optional; the TUI simply polls.
    pub fn set_event_waker(&self, waker: Box<dyn Fn() + Send + Sync>) {
        self.state.bus.set_waker(waker);
    }

    /// The discovered region for a bucket, if any request learned it.
    pub fn cached_region(&self, bucket: &str) -> Option<String> {
        self.state.cached_region(bucket)
    }

    fn enqueue(&self, item: WorkItem) {
        match item.priority {
            Priority::High => self.state.high.push_back(item),
            // Front, so the most recent prefetch is served first.
            Priority::Low => self.state.low.push_front(item),
        }
    }

    /// Abort the previous hover request and register a fresh flag for the
    /// next one.
    fn replace_hover_flag(&self) -> CancelFlag {
        let mut slot = self.state.hover_cancel.lock().unwrap();
        if let Some(previous) = slot.as_ref() {
            previous.store(true, Ordering::SeqCst);
        }
        let flag = new_cancel_flag();
        *slot = Some(flag.clone());
        flag
    }

    /// Move the first Low item matching `pred` to the front of High,
    /// clearing its cancel flag: once the user commits, a later hover must
    /// not abort this work. Returns true if the item is now (or already
    /// was) high priority.
    fn boost(&self, pred: impl Fn(&WorkItem) -> bool) -> bool {
        if let Some(mut item) = self.state.low.remove_first(&pred) {
            item.priority = Priority::High;
            item.cancel_flag = None;
            self.state.high.push_front(item);
            return true;
        }
        self.state.high.any(pred)
    }
}

impl Backend for RequestEngine {
    fn take_events(&self) -> Vec<StateEvent> {
        self.state.bus.take()
    }

    fn list_buckets(&self) {
        debug!("queueing ListBuckets");
        self.enqueue(WorkItem::new(WorkKind::ListBuckets, Priority::High));
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: &str,
        cancel_flag: Option<CancelFlag>,
    ) {
        debug!(bucket, prefix, has_token = !continuation_token.is_empty(), "queueing ListObjects");
        let mut item = WorkItem::new(
            WorkKind::ListObjects {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                continuation_token: continuation_token.to_string(),
            },
            Priority::High,
        );
        item.cancel_flag = cancel_flag;
        self.enqueue(item);
    }

    fn list_objects_prefetch(&self, bucket: &str, prefix: &str, cancellable: bool) {
        debug!(bucket, prefix, cancellable, "queueing ListObjects prefetch");
        let mut item = WorkItem::new(
            WorkKind::ListObjects {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                continuation_token: String::new(),
            },
            Priority::Low,
        );
        if cancellable {
            item.cancel_flag = Some(self.replace_hover_flag());
        }
        self.enqueue(item);
    }

    fn get_object(&self, bucket: &str, key: &str, max_bytes: u64, low_priority: bool, cancellable: bool) {
        debug!(bucket, key, max_bytes, low_priority, cancellable, "queueing GetObject");
        let mut item = WorkItem::new(
            WorkKind::GetObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                max_bytes,
            },
            if low_priority { Priority::Low } else { Priority::High },
        );
        if cancellable {
            item.cancel_flag = Some(self.replace_hover_flag());
        }
        self.enqueue(item);
    }

    fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
        cancel_flag: Option<CancelFlag>,
    ) {
        debug!(bucket, key, start_byte, end_byte, "queueing GetObjectRange");
        let mut item = WorkItem::new(
            WorkKind::GetObjectRange {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte,
                end_byte,
            },
            Priority::High,
        );
        item.cancel_flag = cancel_flag;
        self.enqueue(item);
    }

    fn get_object_streaming(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        total_size: u64,
        cancel_flag: Option<CancelFlag>,
    ) {
        debug!(bucket, key, start_byte, total_size, "queueing GetObjectStreaming");
        let mut item = WorkItem::new(
            WorkKind::GetObjectStreaming {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte,
                total_size,
            },
            Priority::High,
        );
        item.cancel_flag = cancel_flag;
        self.enqueue(item);
    }

    fn cancel_all(&self) {
        self.state.high.clear();
        self.state.low.clear();
    }

    fn prioritize_request(&self, bucket: &str, prefix: &str) -> bool {
        let boosted = self.boost(|item| item.matches_listing(bucket, prefix));
        if boosted {
            debug!(bucket, prefix, "boosted pending listing to high priority");
        }
        boosted
    }

    fn prioritize_object_request(&self, bucket: &str, key: &str) -> bool {
        let boosted = self.boost(|item| item.matches_object(bucket, key));
        if boosted {
            debug!(bucket, key, "boosted pending object fetch to high priority");
        }
        boosted
    }

    fn has_pending_request(&self, bucket: &str, prefix: &str) -> bool {
        self.state.high.any(|item| item.matches_listing(bucket, prefix))
            || self.state.low.any(|item| item.matches_listing(bucket, prefix))
    }

    fn has_pending_object_request(&self, bucket: &str, key: &str) -> bool {
        self.state.high.any(|item| item.matches_object(bucket, key))
            || self.state.low.any(|item| item.matches_object(bucket, key))
    }

    fn set_profile(&self, profile: AwsProfile) {
        info!(profile = %profile.name, region = %profile.region, "switching profile");
        self.cancel_all();
        self.state.region_cache.lock().unwrap().clear();

        let mut refreshed = profile.clone();
        let installed = match refresh_profile_credentials(&mut refreshed) {
            Ok(()) => refreshed,
            Err(err) => {
                warn!(
                    profile = %profile.name,
                    error = %err,
                    "credential refresh failed, keeping provided credentials"
                );
                profile
            }
        };
        *self.state.profile.lock().unwrap() = installed;
    }
}

impl Drop for RequestEngine {
    fn drop(&mut self) {
        info!("shutting down request engine");
        self.cancel_all();
        self.state.shutdown.store(true, Ordering::SeqCst);
        for _ in 0..self.workers_per_queue {
            self.state
                .high
                .push_back(WorkItem::new(WorkKind::Shutdown, Priority::High));
            self.state
                .low
                .push_back(WorkItem::new(WorkKind::Shutdown, Priority::Low));
        }
        self.state.high.notify_all();
        self.state.low.notify_all();
        for handle in self.workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(state: Arc<EngineState>, priority: Priority) {
    let queue = match priority {
        Priority::High => &state.high,
        Priority::Low => &state.low,
    };
    loop {
        let Some(item) = queue.pop(&state.shutdown) else {
            break;
        };
        if matches!(item.kind, WorkKind::Shutdown) {
            break;
        }
        if item.is_cancelled() {
            debug!("discarding cancelled work item");
            continue;
        }
        process_item(&state, item);
    }
    debug!(?priority, "worker exiting");
}

fn process_item(state: &EngineState, item: WorkItem) {
    let queued = item.queued_at;
    match item.kind {
        WorkKind::ListBuckets => process_list_buckets(state),
        WorkKind::ListObjects {
            ref bucket,
            ref prefix,
            ref continuation_token,
        } => process_list_objects(
            state,
            bucket,
            prefix,
            continuation_token,
            item.cancel_flag.as_ref(),
        ),
        WorkKind::GetObject {
            ref bucket,
            ref key,
            max_bytes,
        } => process_get_object(state, bucket, key, max_bytes, item.cancel_flag.as_ref()),
        WorkKind::GetObjectRange {
            ref bucket,
            ref key,
            start_byte,
            end_byte,
        } => process_get_object_range(state, bucket, key, start_byte, end_byte, item.cancel_flag.as_ref()),
        WorkKind::GetObjectStreaming {
            ref bucket,
            ref key,
            start_byte,
            total_size,
        } => process_get_object_streaming(
            state,
            bucket,
            key,
            start_byte,
            total_size,
            item.cancel_flag.as_ref(),
        ),
        WorkKind::Shutdown => {}
    }
    debug!(elapsed_ms = queued.elapsed().as_millis() as u64, "work item finished");
}

fn process_list_buckets(state: &EngineState) {
    let profile = state.profile.lock().unwrap().clone();
    let target = url::service_target(profile.endpoint_url.as_deref(), &profile.region);
    let ctx = SigningContext::new(&profile, &profile.region);
    let signed = signer::sign_get(&ctx, &target.scheme, &target.host, &target.path, "");

    match state.http.get(&signed, &[], DEFAULT_TIMEOUT, None) {
        Err(FetchError::Cancelled) => {}
        Err(FetchError::Transport(reason)) => {
            warn!(error = %reason, "ListBuckets transport error");
            state.push_event(StateEvent::BucketsLoadError {
                error: format!("ERROR: {}", reason),
            });
        }
        Ok(fetched) => {
            let text = String::from_utf8_lossy(&fetched.body).into_owned();
            if !fetched.success {
                let error = xml::extract_error(&text)
                    .unwrap_or_else(|| format!("ERROR: HTTP {}", fetched.status));
                warn!(error = %error, "ListBuckets failed");
                state.push_event(StateEvent::BucketsLoadError { error });
            } else {
                let buckets = xml::parse_list_buckets(&text);
                info!(count = buckets.len(), "bucket list loaded");
                state.push_event(StateEvent::BucketsLoaded { buckets });
            }
        }
    }
}

fn process_list_objects(
    state: &EngineState,
    bucket: &str,
    prefix: &str,
    continuation_token: &str,
    cancel: Option<&CancelFlag>,
) {
    let Some(mut region) = state.resolve_region(bucket) else {
        state.push_event(StateEvent::ObjectsLoadError {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            error: NO_REGION_ERROR.to_string(),
        });
        return;
    };

    for attempt in 0..2 {
        let profile = state.profile.lock().unwrap().clone();
        let target = url::bucket_target(profile.endpoint_url.as_deref(), bucket, None, &region);
        let query = url::list_objects_query(prefix, continuation_token);
        let ctx = SigningContext::new(&profile, &region);
        let signed = signer::sign_get(&ctx, &target.scheme, &target.host, &target.path, &query);

        let fetched = match state.http.get(&signed, &[], DEFAULT_TIMEOUT, cancel) {
            Err(FetchError::Cancelled) => {
                debug!(bucket, prefix, "ListObjects cancelled, superseded by newer request");
                return;
            }
            Err(FetchError::Transport(reason)) => {
                warn!(bucket, prefix, error = %reason, "ListObjects transport error");
                state.push_event(StateEvent::ObjectsLoadError {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    error: format!("ERROR: {}", reason),
                });
                return;
            }
            Ok(fetched) => fetched,
        };

        if !fetched.success {
            let text = String::from_utf8_lossy(&fetched.body);
            if attempt == 0 {
                if let Some(corrected) = state.redirect_region(&text, bucket, &region) {
                    region = corrected;
                    continue;
                }
            }
            let error = xml::extract_error(&text)
                .unwrap_or_else(|| format!("ERROR: HTTP {}", fetched.status));
            warn!(bucket, prefix, error = %error, "ListObjects failed");
            state.push_event(StateEvent::ObjectsLoadError {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                error,
            });
            return;
        }

        let text = String::from_utf8_lossy(&fetched.body);
        let page = xml::parse_list_objects(&text);
        state.cache_region(bucket, &region);
        info!(
            bucket,
            prefix,
            count = page.objects.len(),
            truncated = page.is_truncated,
            "objects loaded"
        );
        state.push_event(StateEvent::ObjectsLoaded {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            sent_token: continuation_token.to_string(),
            objects: page.objects,
            next_token: page.next_continuation_token,
            is_truncated: page.is_truncated,
        });
        return;
    }
}

fn process_get_object(
    state: &EngineState,
    bucket: &str,
    key: &str,
    max_bytes: u64,
    cancel: Option<&CancelFlag>,
) {
    let Some(mut region) = state.resolve_region(bucket) else {
        state.push_event(StateEvent::ObjectContentLoadError {
            bucket: bucket.to_string(),
            key: key.to_string(),
            error: NO_REGION_ERROR.to_string(),
        });
        return;
    };

    for attempt in 0..2 {
        let profile = state.profile.lock().unwrap().clone();
        let target = url::bucket_target(profile.endpoint_url.as_deref(), bucket, Some(key), &region);
        let ctx = SigningContext::new(&profile, &region);
        let signed = signer::sign_get(&ctx, &target.scheme, &target.host, &target.path, "");

        // The Range cap is not part of the signature.
        let mut extra = Vec::new();
        if max_bytes > 0 {
            extra.push(("Range".to_string(), format!("bytes=0-{}", max_bytes - 1)));
        }

        let fetched = match state.http.get(&signed, &extra, DEFAULT_TIMEOUT, cancel) {
            Err(FetchError::Cancelled) => {
                debug!(bucket, key, "GetObject cancelled, superseded by newer request");
                return;
            }
            Err(FetchError::Transport(reason)) => {
                warn!(bucket, key, error = %reason, "GetObject transport error");
                state.push_event(StateEvent::ObjectContentLoadError {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    error: format!("ERROR: {}", reason),
                });
                return;
            }
            Ok(fetched) => fetched,
        };

        if !fetched.success {
            let text = String::from_utf8_lossy(&fetched.body);
            if attempt == 0 {
                if let Some(corrected) = state.redirect_region(&text, bucket, &region) {
                    region = corrected;
                    continue;
                }
            }
            // A Range request against a zero-byte object: success with
            // empty content.
            if xml::extract_tag(&text, "Code") == Some("InvalidRange") {
                debug!(bucket, key, "InvalidRange on ranged read, object is empty");
                state.push_event(StateEvent::ObjectContentLoaded {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    content: Vec::new(),
                    total_size: None,
                });
                return;
            }
            let error = xml::extract_error(&text)
                .unwrap_or_else(|| format!("ERROR: HTTP {}", fetched.status));
            warn!(bucket, key, error = %error, "GetObject failed");
            state.push_event(StateEvent::ObjectContentLoadError {
                bucket: bucket.to_string(),
                key: key.to_string(),
                error,
            });
            return;
        }

        state.cache_region(bucket, &region);
        info!(bucket, key, size = fetched.body.len(), "object content loaded");
        state.push_event(StateEvent::ObjectContentLoaded {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content: fetched.body,
            total_size: fetched.total_size,
        });
        return;
    }
}

fn process_get_object_range(
    state: &EngineState,
    bucket: &str,
    key: &str,
    start_byte: u64,
    end_byte: u64,
    cancel: Option<&CancelFlag>,
) {
    let Some(mut region) = state.resolve_region(bucket) else {
        state.push_event(StateEvent::ObjectRangeLoadError {
            bucket: bucket.to_string(),
            key: key.to_string(),
            start_byte,
            error: NO_REGION_ERROR.to_string(),
        });
        return;
    };

    for attempt in 0..2 {
        let profile = state.profile.lock().unwrap().clone();
        let target = url::bucket_target(profile.endpoint_url.as_deref(), bucket, Some(key), &region);
        let ctx = SigningContext::new(&profile, &region);
        let signed = signer::sign_get(&ctx, &target.scheme, &target.host, &target.path, "");
        let extra = vec![("Range".to_string(), format!("bytes={}-{}", start_byte, end_byte))];

        let fetched = match state.http.get(&signed, &extra, RANGE_TIMEOUT, cancel) {
            Err(FetchError::Cancelled) => {
                debug!(bucket, key, start_byte, "GetObjectRange cancelled");
                return;
            }
            Err(FetchError::Transport(reason)) => {
                warn!(bucket, key, start_byte, error = %reason, "GetObjectRange transport error");
                state.push_event(StateEvent::ObjectRangeLoadError {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    start_byte,
                    error: format!("ERROR: {}", reason),
                });
                return;
            }
            Ok(fetched) => fetched,
        };

        if !fetched.success {
            let text = String::from_utf8_lossy(&fetched.body);
            if attempt == 0 {
                if let Some(corrected) = state.redirect_region(&text, bucket, &region) {
                    region = corrected;
                    continue;
                }
            }
            let error = xml::extract_error(&text)
                .unwrap_or_else(|| format!("ERROR: HTTP {}", fetched.status));
            warn!(bucket, key, start_byte, error = %error, "GetObjectRange failed");
            state.push_event(StateEvent::ObjectRangeLoadError {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte,
                error,
            });
            return;
        }

        state.cache_region(bucket, &region);
        debug!(
            bucket,
            key,
            start_byte,
            got = fetched.body.len(),
            total = fetched.total_size.unwrap_or(0),
            "object range loaded"
        );
        state.push_event(StateEvent::ObjectRangeLoaded {
            bucket: bucket.to_string(),
            key: key.to_string(),
            start_byte,
            total_size: fetched.total_size.unwrap_or(0),
            data: fetched.body,
        });
        return;
    }
}

fn process_get_object_streaming(
    state: &EngineState,
    bucket: &str,
    key: &str,
    start_byte: u64,
    total_size: u64,
    cancel: Option<&CancelFlag>,
) {
    let Some(mut region) = state.resolve_region(bucket) else {
        state.push_event(StateEvent::ObjectRangeLoadError {
            bucket: bucket.to_string(),
            key: key.to_string(),
            start_byte,
            error: NO_REGION_ERROR.to_string(),
        });
        return;
    };

    for attempt in 0..2 {
        let profile = state.profile.lock().unwrap().clone();
        let target = url::bucket_target(profile.endpoint_url.as_deref(), bucket, Some(key), &region);
        let ctx = SigningContext::new(&profile, &region);
        let signed = signer::sign_get(&ctx, &target.scheme, &target.host, &target.path, "");

        let mut extra = Vec::new();
        if start_byte > 0 {
            extra.push(("Range".to_string(), format!("bytes={}-", start_byte)));
        }

        // Chunks are emitted as they fill; offsets increase monotonically
        // within this single request.
        let mut offset = start_byte;
        let mut sink = |chunk: Vec<u8>| {
            let len = chunk.len() as u64;
            state.push_event(StateEvent::ObjectRangeLoaded {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte: offset,
                total_size,
                data: chunk,
            });
            offset += len;
        };

        let streamed = match state
            .http
            .get_streaming(&signed, &extra, STREAM_TIMEOUT, cancel, &mut sink)
        {
            Err(FetchError::Cancelled) => {
                debug!(bucket, key, "GetObjectStreaming cancelled");
                return;
            }
            Err(FetchError::Transport(reason)) => {
                warn!(bucket, key, error = %reason, "GetObjectStreaming transport error");
                state.push_event(StateEvent::ObjectRangeLoadError {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    start_byte,
                    error: format!("ERROR: {}", reason),
                });
                return;
            }
            Ok(streamed) => streamed,
        };

        if !streamed.success {
            let text = String::from_utf8_lossy(&streamed.leftover);
            if attempt == 0 {
                if let Some(corrected) = state.redirect_region(&text, bucket, &region) {
                    region = corrected;
                    continue;
                }
            }
            let error = xml::extract_error(&text)
                .unwrap_or_else(|| format!("ERROR: HTTP {}", streamed.status));
            warn!(bucket, key, error = %error, "GetObjectStreaming failed");
            state.push_event(StateEvent::ObjectRangeLoadError {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte,
                error,
            });
            return;
        }

        state.cache_region(bucket, &region);

        // Tail smaller than one chunk.
        if !streamed.leftover.is_empty() {
            let final_offset = start_byte + streamed.bytes_streamed;
            state.push_event(StateEvent::ObjectRangeLoaded {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start_byte: final_offset,
                total_size,
                data: streamed.leftover,
            });
        }
        info!(
            bucket,
            key,
            downloaded = start_byte + streamed.bytes_streamed,
            "streaming download complete"
        );
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> AwsProfile {
        AwsProfile {
            name: "engine-unit-test".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "SECRET".to_string(),
            ..Default::default()
        }
    }

    /// No workers: the queues stay observable.
    fn idle_engine() -> RequestEngine {
        RequestEngine::with_workers(test_profile(), 0).unwrap()
    }

    #[test]
    fn high_items_stay_ahead_of_low_items() {
        let engine = idle_engine();
        engine.list_buckets();
        for i in 0..10 {
            engine.list_objects_prefetch("b", &format!("p{}/", i), false);
        }
        engine.list_objects("b", "clicked/", "", None);

        let high = engine.state.high.items.lock().unwrap();
        let low = engine.state.low.items.lock().unwrap();
        assert_eq!(high.len(), 2);
        assert_eq!(low.len(), 10);
        assert!(matches!(high[0].kind, WorkKind::ListBuckets));
        assert!(high[1].matches_listing("b", "clicked/"));
    }

    #[test]
    fn low_queue_serves_most_recent_prefetch_first() {
        let engine = idle_engine();
        engine.list_objects_prefetch("b", "first/", false);
        engine.list_objects_prefetch("b", "second/", false);

        let low = engine.state.low.items.lock().unwrap();
        assert!(low[0].matches_listing("b", "second/"));
        assert!(low[1].matches_listing("b", "first/"));
    }

    #[test]
    fn boost_moves_prefetch_to_front_of_high_and_clears_cancel() {
        let engine = idle_engine();
        engine.list_buckets();
        engine.list_objects_prefetch("b", "hover/", true);
        assert!(engine.has_pending_request("b", "hover/"));

        assert!(engine.prioritize_request("b", "hover/"));

        let high = engine.state.high.items.lock().unwrap();
        let low = engine.state.low.items.lock().unwrap();
        assert!(low.is_empty());
        assert_eq!(high.len(), 2);
        assert!(high[0].matches_listing("b", "hover/"));
        assert_eq!(high[0].priority, Priority::High);
        assert!(high[0].cancel_flag.is_none(), "boost must clear the cancel flag");
    }

    #[test]
    fn boost_reports_items_already_in_high() {
        let engine = idle_engine();
        engine.list_objects("b", "p/", "", None);
        assert!(engine.prioritize_request("b", "p/"));
        // Still exactly one queued item; nothing was duplicated.
        assert_eq!(engine.state.high.items.lock().unwrap().len(), 1);
    }

    #[test]
    fn boost_fails_when_nothing_matches() {
        let engine = idle_engine();
        assert!(!engine.prioritize_request("b", "missing/"));
        assert!(!engine.prioritize_object_request("b", "missing.txt"));
    }

    #[test]
    fn object_boost_coalesces_hover_prefetch() {
        let engine = idle_engine();
        engine.get_object("b", "doc.txt", 65536, true, true);
        assert!(engine.has_pending_object_request("b", "doc.txt"));

        assert!(engine.prioritize_object_request("b", "doc.txt"));

        let high = engine.state.high.items.lock().unwrap();
        assert_eq!(high.len(), 1);
        assert!(high[0].matches_object("b", "doc.txt"));
        assert!(high[0].cancel_flag.is_none());
        assert!(engine.state.low.items.lock().unwrap().is_empty());
    }

    #[test]
    fn new_hover_prefetch_cancels_the_previous_one() {
        let engine = idle_engine();
        engine.list_objects_prefetch("b", "one/", true);
        let first_flag = engine.state.low.items.lock().unwrap()[0]
            .cancel_flag
            .clone()
            .unwrap();
        assert!(!first_flag.load(Ordering::SeqCst));

        engine.list_objects_prefetch("b", "two/", true);
        assert!(first_flag.load(Ordering::SeqCst), "older hover request must abort");

        let low = engine.state.low.items.lock().unwrap();
        assert!(!low[0].is_cancelled());
    }

    #[test]
    fn cancel_all_clears_both_queues() {
        let engine = idle_engine();
        engine.list_buckets();
        engine.list_objects_prefetch("b", "p/", false);
        engine.cancel_all();
        assert!(engine.state.high.items.lock().unwrap().is_empty());
        assert!(engine.state.low.items.lock().unwrap().is_empty());
        assert!(!engine.has_pending_request("b", "p/"));
    }

    #[test]
    fn pending_scan_covers_both_queues() {
        let engine = idle_engine();
        engine.list_objects("b", "high/", "", None);
        engine.list_objects_prefetch("b", "low/", false);
        assert!(engine.has_pending_request("b", "high/"));
        assert!(engine.has_pending_request("b", "low/"));
        assert!(!engine.has_pending_request("b", "absent/"));
    }
}
