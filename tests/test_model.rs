//! Browser model tests against a deterministic in-memory backend
//!
//! The model only sees the `Backend` capability set, so these tests swap
//! the S3 engine for a recording double: commands are captured, events are
//! injected by hand, and `process_events` is driven explicitly.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use s3scope::auth::profile::AwsProfile;
use s3scope::engine::work::CancelFlag;
use s3scope::engine::Backend;
use s3scope::events::{Bucket, Object, StateEvent};
use s3scope::model::BrowserModel;

#[derive(Debug, Clone)]
struct ListCall {
    bucket: String,
    prefix: String,
    token: String,
    cancel: Option<CancelFlag>,
}

#[derive(Debug, Clone)]
struct GetCall {
    bucket: String,
    key: String,
    max_bytes: u64,
    low_priority: bool,
    cancellable: bool,
}

#[derive(Debug, Clone)]
struct StreamCall {
    bucket: String,
    key: String,
    start_byte: u64,
    total_size: u64,
    cancel: Option<CancelFlag>,
}

#[derive(Default)]
struct MockState {
    events: Vec<StateEvent>,
    list_buckets_calls: usize,
    list_calls: Vec<ListCall>,
    prefetch_calls: Vec<(String, String, bool)>,
    get_calls: Vec<GetCall>,
    stream_calls: Vec<StreamCall>,
    prioritize_object_hits: Vec<(String, String)>,
    boost_succeeds: bool,
}

#[derive(Default)]
struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        Arc::new(MockBackend::default())
    }

    fn inject(&self, event: StateEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    fn set_boost_succeeds(&self, value: bool) {
        self.state.lock().unwrap().boost_succeeds = value;
    }

    fn list_calls(&self) -> Vec<ListCall> {
        self.state.lock().unwrap().list_calls.clone()
    }

    fn prefetch_calls(&self) -> Vec<(String, String, bool)> {
        self.state.lock().unwrap().prefetch_calls.clone()
    }

    fn get_calls(&self) -> Vec<GetCall> {
        self.state.lock().unwrap().get_calls.clone()
    }

    fn stream_calls(&self) -> Vec<StreamCall> {
        self.state.lock().unwrap().stream_calls.clone()
    }

    fn list_buckets_count(&self) -> usize {
        self.state.lock().unwrap().list_buckets_calls
    }
}

impl Backend for MockBackend {
    fn take_events(&self) -> Vec<StateEvent> {
        std::mem::take(&mut self.state.lock().unwrap().events)
    }

    fn list_buckets(&self) {
        self.state.lock().unwrap().list_buckets_calls += 1;
    }

    fn list_objects(&self, bucket: &str, prefix: &str, continuation_token: &str, cancel_flag: Option<CancelFlag>) {
        self.state.lock().unwrap().list_calls.push(ListCall {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: continuation_token.to_string(),
            cancel: cancel_flag,
        });
    }

    fn list_objects_prefetch(&self, bucket: &str, prefix: &str, cancellable: bool) {
        self.state
            .lock()
            .unwrap()
            .prefetch_calls
            .push((bucket.to_string(), prefix.to_string(), cancellable));
    }

    fn get_object(&self, bucket: &str, key: &str, max_bytes: u64, low_priority: bool, cancellable: bool) {
        self.state.lock().unwrap().get_calls.push(GetCall {
            bucket: bucket.to_string(),
            key: key.to_string(),
            max_bytes,
            low_priority,
            cancellable,
        });
    }

    fn get_object_range(&self, _: &str, _: &str, _: u64, _: u64, _: Option<CancelFlag>) {}

    fn get_object_streaming(&self, bucket: &str, key: &str, start_byte: u64, total_size: u64, cancel_flag: Option<CancelFlag>) {
        self.state.lock().unwrap().stream_calls.push(StreamCall {
            bucket: bucket.to_string(),
            key: key.to_string(),
            start_byte,
            total_size,
            cancel: cancel_flag,
        });
    }

    fn cancel_all(&self) {}

    fn prioritize_request(&self, _: &str, _: &str) -> bool {
        false
    }

    fn prioritize_object_request(&self, bucket: &str, key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state
            .prioritize_object_hits
            .push((bucket.to_string(), key.to_string()));
        state.boost_succeeds
    }

    fn has_pending_request(&self, _: &str, _: &str) -> bool {
        false
    }

    fn has_pending_object_request(&self, _: &str, _: &str) -> bool {
        false
    }

    fn set_profile(&self, _: AwsProfile) {}
}

fn test_profile() -> AwsProfile {
    AwsProfile {
        name: "default".to_string(),
        region: "us-east-1".to_string(),
        access_key_id: "AKIA-TEST".to_string(),
        secret_access_key: "secret".to_string(),
        ..Default::default()
    }
}

fn objects_page(count: usize, offset: usize) -> Vec<Object> {
    (0..count)
        .map(|i| Object::file(&format!("file-{:05}.txt", offset + i), 10, String::new()))
        .collect()
}

fn folders(count: usize) -> Vec<Object> {
    (0..count).map(|i| Object::folder(&format!("sub-{:02}/", i))).collect()
}

fn model_with(backend: &Arc<MockBackend>) -> BrowserModel {
    let mut model = BrowserModel::new(backend.clone() as Arc<dyn Backend>);
    model.set_profiles(vec![test_profile()]);
    model
}

#[test]
fn refresh_without_profiles_is_a_no_op() {
    let backend = MockBackend::new();
    let mut model = BrowserModel::new(backend.clone() as Arc<dyn Backend>);
    model.refresh();
    assert_eq!(backend.list_buckets_count(), 0);
    assert!(model.buckets().is_empty());
    assert!(!model.buckets_loading());
}

#[test]
fn refresh_loads_the_bucket_list() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);

    model.refresh();
    assert_eq!(backend.list_buckets_count(), 1);
    assert!(model.buckets_loading());

    backend.inject(StateEvent::BucketsLoaded {
        buckets: vec![
            Bucket { name: "alpha".into(), creation_date: String::new() },
            Bucket { name: "beta".into(), creation_date: String::new() },
        ],
    });
    assert!(model.process_events());

    assert_eq!(model.buckets().len(), 2);
    assert_eq!(model.buckets()[0].name, "alpha");
    assert!(!model.buckets_loading());
    assert!(model.buckets_error().is_empty());
}

#[test]
fn auto_pagination_continues_until_the_listing_completes() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);

    model.navigate_into("alpha", "");
    let calls = backend.list_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].token.is_empty());

    // Page 1: 1000 objects, truncated.
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: String::new(),
        objects: objects_page(1000, 0),
        next_token: "T".into(),
        is_truncated: true,
    });
    model.process_events();

    // The model must immediately request the next page with the token.
    let calls = backend.list_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].token, "T");
    assert!(calls[1].cancel.is_some(), "continuations share the pagination cancel flag");

    // Page 2: 250 objects, final.
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: "T".into(),
        objects: objects_page(250, 1000),
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    let node = model.node("alpha", "").unwrap();
    assert_eq!(node.objects.len(), 1250);
    assert!(!node.is_truncated);
    assert!(node.loaded);
    assert!(!node.loading);
    assert_eq!(backend.list_calls().len(), 2, "no further pages requested");
}

#[test]
fn continuation_pages_dedup_by_key() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "");

    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: String::new(),
        objects: objects_page(10, 0),
        next_token: "T".into(),
        is_truncated: true,
    });
    model.process_events();

    // Overlapping continuation: repeats keys 5..10.
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: "T".into(),
        objects: objects_page(10, 5),
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    let node = model.node("alpha", "").unwrap();
    assert_eq!(node.objects.len(), 15, "duplicate keys are dropped");
}

#[test]
fn navigating_away_cancels_the_old_folder_pagination() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);

    model.navigate_into("alpha", "a/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "a/".into(),
        sent_token: String::new(),
        objects: objects_page(1000, 0),
        next_token: "T".into(),
        is_truncated: true,
    });
    model.process_events();

    let continuation = backend.list_calls().into_iter().last().unwrap();
    assert_eq!(continuation.token, "T");
    let flag = continuation.cancel.expect("pagination flag");
    assert!(!flag.load(Ordering::SeqCst));

    model.navigate_into("alpha", "b/");

    assert!(flag.load(Ordering::SeqCst), "old folder's flag must be set");
    let node = model.node("alpha", "a/").unwrap();
    assert!(!node.loading, "spinner cleared for the abandoned folder");
    assert_eq!(node.objects.len(), 1000, "partial results stay visible");
}

#[test]
fn initial_page_triggers_subfolder_prefetch_capped_at_twenty() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "");

    let mut objects = folders(30);
    objects.extend(objects_page(5, 0));
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: String::new(),
        objects,
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    let prefetches = backend.prefetch_calls();
    assert_eq!(prefetches.len(), 20);
    assert!(prefetches.iter().all(|(b, _, cancellable)| b == "alpha" && !cancellable));
}

#[test]
fn continuation_pages_do_not_prefetch_subfolders() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "");

    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: "T".into(),
        objects: folders(5),
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    assert!(backend.prefetch_calls().is_empty());
}

#[test]
fn hover_folder_prefetch_queues_once_per_folder() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: String::new(),
        objects: folders(3),
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();
    let baseline = backend.prefetch_calls().len();

    model.prefetch_folder("alpha", "hover-target/");
    model.prefetch_folder("alpha", "hover-target/");
    model.prefetch_folder("alpha", "hover-target/");
    assert_eq!(backend.prefetch_calls().len(), baseline + 1);
    assert!(model.node("alpha", "hover-target/").unwrap().loading);

    // Hovering elsewhere cancels the first and clears its spinner.
    model.prefetch_folder("alpha", "other/");
    assert_eq!(backend.prefetch_calls().len(), baseline + 2);
    assert!(!model.node("alpha", "hover-target/").unwrap().loading);
    let last = backend.prefetch_calls().into_iter().last().unwrap();
    assert!(last.2, "hover prefetches are cancellable");
}

#[test]
fn preview_cache_hit_issues_no_second_request() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "docs/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "docs/".into(),
        sent_token: String::new(),
        objects: vec![Object::file("docs/readme.txt", 1024, String::new())],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    // Hover prefetch fires exactly one low-priority cancellable fetch.
    model.prefetch_file_preview("alpha", "docs/readme.txt");
    let gets = backend.get_calls();
    assert_eq!(gets.len(), 1);
    assert!(gets[0].low_priority);
    assert!(gets[0].cancellable);
    assert_eq!(gets[0].max_bytes, 64 * 1024);

    // Prefetch completes and lands in the cache.
    backend.inject(StateEvent::ObjectContentLoaded {
        bucket: "alpha".into(),
        key: "docs/readme.txt".into(),
        content: b"cached body".to_vec(),
        total_size: None,
    });
    model.process_events();

    // Selecting the same file is served from cache: still one request.
    model.select_file("alpha", "docs/readme.txt");
    assert_eq!(backend.get_calls().len(), 1);
    assert!(!model.preview().preview_loading());
    assert_eq!(model.preview().preview_content(), b"cached body");
}

#[test]
fn selecting_with_a_pending_prefetch_boosts_instead_of_refetching() {
    let backend = MockBackend::new();
    backend.set_boost_succeeds(true);
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "docs/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "docs/".into(),
        sent_token: String::new(),
        objects: vec![Object::file("docs/guide.md", 2048, String::new())],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    model.select_file("alpha", "docs/guide.md");

    assert!(backend.get_calls().is_empty(), "boost replaces the fresh request");
    assert!(model.preview().preview_loading());
    let hits = backend.state.lock().unwrap().prioritize_object_hits.clone();
    assert_eq!(hits, vec![("alpha".to_string(), "docs/guide.md".to_string())]);
}

#[test]
fn large_files_start_streaming_past_the_initial_window() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "logs/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "logs/".into(),
        sent_token: String::new(),
        objects: vec![Object::file("logs/app.log", 2_000_000, String::new())],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    model.select_file("alpha", "logs/app.log");
    assert_eq!(backend.get_calls().len(), 1);

    backend.inject(StateEvent::ObjectContentLoaded {
        bucket: "alpha".into(),
        key: "logs/app.log".into(),
        content: vec![b'x'; 64 * 1024],
        total_size: Some(2_000_000),
    });
    model.process_events();

    let streams = backend.stream_calls();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].start_byte, 64 * 1024);
    assert_eq!(streams[0].total_size, 2_000_000);
    assert!(streams[0].cancel.is_some());
}

#[test]
fn selecting_another_file_cancels_the_active_stream() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "logs/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "logs/".into(),
        sent_token: String::new(),
        objects: vec![
            Object::file("logs/app.log", 2_000_000, String::new()),
            Object::file("logs/other.log", 10, String::new()),
        ],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    model.select_file("alpha", "logs/app.log");
    backend.inject(StateEvent::ObjectContentLoaded {
        bucket: "alpha".into(),
        key: "logs/app.log".into(),
        content: vec![b'x'; 64 * 1024],
        total_size: Some(2_000_000),
    });
    model.process_events();
    let flag = backend.stream_calls()[0].cancel.clone().unwrap();
    assert!(!flag.load(Ordering::SeqCst));

    model.select_file("alpha", "logs/other.log");
    assert!(flag.load(Ordering::SeqCst), "streaming download must abort");
}

#[test]
fn gzip_selection_streams_and_decompresses_transparently() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"hello\nworld\n").unwrap();
    let compressed = encoder.finish().unwrap();
    let total = compressed.len() as u64;

    model.navigate_into("alpha", "logs/");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: "logs/".into(),
        sent_token: String::new(),
        objects: vec![Object::file("logs/app.log.gz", total as i64, String::new())],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    model.select_file("alpha", "logs/app.log.gz");

    // The initial fetch returns the first half; the rest arrives as a
    // streamed range event.
    let half = compressed.len() / 2;
    backend.inject(StateEvent::ObjectContentLoaded {
        bucket: "alpha".into(),
        key: "logs/app.log.gz".into(),
        content: compressed[..half].to_vec(),
        total_size: Some(total),
    });
    model.process_events();

    let streams = backend.stream_calls();
    assert_eq!(streams.len(), 1, "compressed files always stream");
    assert_eq!(streams[0].start_byte, half as u64);

    backend.inject(StateEvent::ObjectRangeLoaded {
        bucket: "alpha".into(),
        key: "logs/app.log.gz".into(),
        start_byte: half as u64,
        total_size: total,
        data: compressed[half..].to_vec(),
    });
    model.process_events();

    let preview = model.preview().streaming_preview().expect("streaming preview");
    assert!(preview.is_complete());
    assert_eq!(preview.line_count(), 2);
    assert_eq!(preview.get_line(0), "hello");
    assert_eq!(preview.get_line(1), "world");
    assert_eq!(model.preview().preview_content(), b"hello\nworld\n");
}

#[test]
fn unsupported_files_are_not_fetched() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "");
    backend.inject(StateEvent::ObjectsLoaded {
        bucket: "alpha".into(),
        prefix: String::new(),
        sent_token: String::new(),
        objects: vec![Object::file("blob.bin", 10, String::new())],
        next_token: String::new(),
        is_truncated: false,
    });
    model.process_events();

    model.prefetch_file_preview("alpha", "blob.bin");
    model.select_file("alpha", "blob.bin");

    assert!(backend.get_calls().is_empty());
    assert!(!model.preview().preview_supported());
}

#[test]
fn navigation_paths() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);

    model.navigate_to("s3://alpha/deep/nested/");
    assert_eq!(model.current_bucket(), "alpha");
    assert_eq!(model.current_prefix(), "deep/nested/");
    // Unknown bucket appears in the list so it can be browsed.
    assert!(model.buckets().iter().any(|b| b.name == "alpha"));

    model.navigate_up();
    assert_eq!(model.current_prefix(), "deep/");
    model.navigate_up();
    assert_eq!(model.current_prefix(), "");
    model.navigate_up();
    assert_eq!(model.current_bucket(), "", "bucket root goes back to the bucket list");
}

#[test]
fn listing_errors_land_on_the_node() {
    let backend = MockBackend::new();
    let mut model = model_with(&backend);
    model.navigate_into("alpha", "p/");

    backend.inject(StateEvent::ObjectsLoadError {
        bucket: "alpha".into(),
        prefix: "p/".into(),
        error: "AccessDenied: Access Denied".into(),
    });
    model.process_events();

    let node = model.node("alpha", "p/").unwrap();
    assert!(!node.loading);
    assert!(!node.loaded);
    assert_eq!(node.error, "AccessDenied: Access Denied");
}
