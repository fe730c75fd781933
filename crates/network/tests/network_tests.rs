// crates/network/tests/network_tests.rs
//! Integration tests for the request pipeline and chunked uploads

use courier_network::mock::{MockReply, MockTransport};
use courier_network::{
    AddTaskOptions, CancellationToken, ClientConfig, ErrorKind, HttpClient, MultipartField,
    RequestBody, RequestOptions, RetryOptions, RetryPolicy, TaskId, TaskSnapshot, TaskStatus,
    TransportFailure, TransportRequest, TransportResponse, UploadConfig, UploadEvent, UploadFile,
    UploadManager,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const MIB: usize = 1024 * 1024;

fn config() -> ClientConfig {
    ClientConfig {
        base_url: Some("https://api.test".to_string()),
        retry_policy: RetryPolicy::new(2).with_retry_delay(Duration::from_millis(5)),
        ..ClientConfig::default()
    }
}

fn client(transport: &Arc<MockTransport>) -> HttpClient {
    HttpClient::with_transport(config(), transport.clone())
}

fn form_field(request: &TransportRequest, name: &str) -> Option<String> {
    match &request.body {
        RequestBody::Multipart(fields) => fields.iter().find_map(|field| match field {
            MultipartField::Text { name: n, value } if n == name => Some(value.clone()),
            _ => None,
        }),
        _ => None,
    }
}

async fn settle(manager: &UploadManager, id: TaskId) -> TaskSnapshot {
    tokio::time::timeout(Duration::from_secs(10), manager.wait_for_terminal(id))
        .await
        .expect("task settles in time")
        .expect("task exists")
}

// ---------------------------------------------------------------------------
// Request pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_identical_gets_make_one_call() {
    let transport = Arc::new(
        MockTransport::ok_json(json!({"items": [1, 2, 3]})).with_latency(Duration::from_millis(30)),
    );
    let client = client(&transport);

    let calls = (0..10)
        .map(|_| client.get("/items", Some(json!({"page": 1})), RequestOptions::new()));
    let results = futures::future::join_all(calls).await;

    assert_eq!(transport.call_count(), 1);
    let first = results[0].as_ref().expect("ok");
    for result in &results {
        assert_eq!(result.as_ref().expect("ok"), first);
    }
    assert_eq!(client.get_request_stats().pending_requests, 0);
}

#[tokio::test]
async fn test_different_queries_do_not_collide() {
    let transport = Arc::new(
        MockTransport::ok_json(json!({})).with_latency(Duration::from_millis(20)),
    );
    let client = client(&transport);

    let (a, b, c) = tokio::join!(
        client.get("/items", Some(json!({"page": 1})), RequestOptions::new()),
        client.get("/items", Some(json!({"page": 1})), RequestOptions::new()),
        client.get("/items", Some(json!({"page": 2})), RequestOptions::new()),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let mut urls: Vec<String> = transport.calls().into_iter().map(|c| c.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://api.test/items?page=1".to_string(),
            "https://api.test/items?page=2".to_string(),
        ]
    );
    assert_eq!(client.get_cache_stats().size, 2);
}

#[tokio::test]
async fn test_burst_respects_max_concurrent() {
    let transport = Arc::new(
        MockTransport::ok_json(json!({})).with_latency(Duration::from_millis(20)),
    );
    let client = HttpClient::with_transport(
        ClientConfig {
            max_concurrent: 3,
            ..config()
        },
        transport.clone(),
    );

    let client_ref = &client;
    let calls = (0..12).map(|i| async move {
        client_ref
            .get(&format!("/items/{}", i), None, RequestOptions::new())
            .await
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(transport.call_count(), 12);
    assert!(transport.peak_concurrency() <= 3);

    let stats = client.get_request_stats();
    assert_eq!(stats.max_concurrent, 3);
    assert_eq!(stats.running_count, 0);
    assert_eq!(stats.queue_length, 0);
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let transport = Arc::new(MockTransport::ok_json(json!({"v": 1})));
    let client = client(&transport);
    let options = || RequestOptions::new().cache_ttl(Duration::from_millis(60));

    client.get("/config", None, options()).await.expect("first");
    client.get("/config", None, options()).await.expect("cached");
    assert_eq!(transport.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.get("/config", None, options()).await.expect("refetched");
    assert_eq!(transport.call_count(), 2);

    let stats = client.get_cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_mutating_verbs_bypass_cache() {
    let transport = Arc::new(MockTransport::ok_json(json!({})));
    let client = client(&transport);

    for _ in 0..2 {
        client
            .put("/items/1", Some(json!({"name": "x"})), RequestOptions::new().deduplicate(false))
            .await
            .expect("put");
    }

    assert_eq!(transport.call_count(), 2);
    assert_eq!(client.get_cache_stats().size, 0);
}

#[tokio::test]
async fn test_server_errors_retry_with_growing_delays() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stamps);
    let transport = Arc::new(MockTransport::new(move |_| {
        recorder.lock().expect("lock").push(Instant::now());
        MockReply::Response(TransportResponse::new(502, "bad gateway"))
    }));
    let client = client(&transport);

    let options = RequestOptions::new().retry(RetryOptions::new(
        RetryPolicy::new(3).with_retry_delay(Duration::from_millis(20)),
    ));
    let error = client.get("/flaky", None, options).await.expect_err("502");

    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.status, Some(502));
    assert!(error.is_retryable());

    let stamps = stamps.lock().expect("lock");
    assert_eq!(stamps.len(), 4);
    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(20));
    assert!(gaps[1] > gaps[0]);
    assert!(gaps[2] > gaps[1]);
}

#[tokio::test]
async fn test_client_and_auth_errors_are_not_retried() {
    for status in [400u16, 401, 403, 404, 422] {
        let transport = Arc::new(MockTransport::new(move |_| {
            MockReply::Response(TransportResponse::new(status, ""))
        }));
        let client = client(&transport);

        let error = client
            .get("/resource", None, RequestOptions::new())
            .await
            .expect_err("error status");

        assert_eq!(transport.call_count(), 1, "status {}", status);
        assert!(!error.is_retryable());
        let expected = if status == 401 || status == 403 {
            ErrorKind::Auth
        } else {
            ErrorKind::Client
        };
        assert_eq!(error.kind, expected);
    }
}

#[tokio::test]
async fn test_retry_condition_can_veto() {
    let transport = Arc::new(MockTransport::new(|_| {
        MockReply::Response(TransportResponse::new(503, ""))
    }));
    let client = client(&transport);

    let retry = RetryOptions::new(RetryPolicy::new(3).with_retry_delay(Duration::from_millis(1)))
        .with_condition(|e| e.status != Some(503));
    let _ = client.get("/x", None, RequestOptions::new().retry(retry)).await;

    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_connect_failures_recover() {
    let attempts = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&attempts);
    let transport = Arc::new(MockTransport::new(move |_| {
        let mut n = counter.lock().expect("lock");
        *n += 1;
        if *n < 3 {
            MockReply::Failure(TransportFailure::connect("connection refused"))
        } else {
            MockReply::Response(TransportResponse::json(200, &json!({"ok": true})))
        }
    }));
    let client = client(&transport);

    let response = client.get("/eventually", None, RequestOptions::new()).await.expect("recovers");
    assert_eq!(response.status, 200);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_offline_then_online() {
    let transport = Arc::new(MockTransport::ok_json(json!({})));
    let client = client(&transport);
    client.connectivity().set_online(false);

    let options = || RequestOptions::new().retry(RetryOptions::new(RetryPolicy::none()));
    let error = client.get("/items", None, options()).await.expect_err("offline");
    assert_eq!(error.kind, ErrorKind::Network);
    assert_eq!(transport.call_count(), 0);

    client.connectivity().set_online(true);
    client.get("/items", None, options()).await.expect("online");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_cancel_token_aborts_slow_call() {
    let transport = Arc::new(
        MockTransport::ok_json(json!({})).with_latency(Duration::from_secs(5)),
    );
    let client = client(&transport);
    let cancel = CancellationToken::new();

    let trip = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trip.cancel();
    });

    let started = Instant::now();
    let error = client
        .get("/slow", None, RequestOptions::new().cancel_token(cancel))
        .await
        .expect_err("cancelled");

    assert!(error.is_cancelled());
    assert!(!error.is_retryable());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(client.get_cache_stats().size, 0);
}

#[tokio::test]
async fn test_success_false_envelope_is_server_error() {
    let transport = Arc::new(MockTransport::ok_json(
        json!({"success": false, "message": "quota exceeded"}),
    ));
    let client = client(&transport);

    let error = client
        .post("/jobs", Some(json!({"n": 1})), RequestOptions::new())
        .await
        .expect_err("envelope");

    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.message, "quota exceeded");
    assert!(!error.is_retryable());
    assert_eq!(transport.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// In-memory upload server keyed by file hash
#[derive(Default)]
struct FakeServer {
    stored: Mutex<HashMap<String, BTreeSet<usize>>>,
    reject_chunk: Mutex<Option<usize>>,
    check_status: Mutex<u16>,
    merge_status: Mutex<u16>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            check_status: Mutex::new(200),
            merge_status: Mutex::new(200),
            ..Self::default()
        })
    }

    fn preload(&self, hash: &str, chunks: &[usize]) {
        self.stored
            .lock()
            .expect("lock")
            .insert(hash.to_string(), chunks.iter().copied().collect());
    }

    fn handle(&self, request: &TransportRequest) -> MockReply {
        if request.url.ends_with("/upload/check") {
            let status = *self.check_status.lock().expect("lock");
            if status != 200 {
                return MockReply::Response(TransportResponse::new(status, ""));
            }
            let hash = match &request.body {
                RequestBody::Json(body) => body["taskFingerprint"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                _ => String::new(),
            };
            let chunks: Vec<usize> = self
                .stored
                .lock()
                .expect("lock")
                .get(&hash)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            return MockReply::Response(TransportResponse::json(
                200,
                &json!({"code": 0, "data": {"uploadedChunks": chunks}}),
            ));
        }

        if request.url.ends_with("/upload/chunk") {
            let index: usize = form_field(request, "chunkIndex")
                .and_then(|v| v.parse().ok())
                .unwrap_or(usize::MAX);
            if *self.reject_chunk.lock().expect("lock") == Some(index) {
                return MockReply::Response(TransportResponse::json(
                    400,
                    &json!({"message": "corrupt chunk"}),
                ));
            }
            let hash = form_field(request, "fileHash").unwrap_or_default();
            self.stored.lock().expect("lock").entry(hash).or_default().insert(index);
            return MockReply::Response(TransportResponse::json(200, &json!({"success": true})));
        }

        let status = *self.merge_status.lock().expect("lock");
        MockReply::Response(TransportResponse::new(status, ""))
    }
}

fn upload_manager(
    server: &Arc<FakeServer>,
    latency: Duration,
) -> (UploadManager, Arc<MockTransport>) {
    let handler = Arc::clone(server);
    let transport = Arc::new(
        MockTransport::new(move |request| handler.handle(request)).with_latency(latency),
    );
    let client = HttpClient::with_transport(
        ClientConfig {
            base_url: Some("https://files.test".to_string()),
            retry_policy: RetryPolicy::new(1).with_retry_delay(Duration::from_millis(5)),
            ..ClientConfig::default()
        },
        transport.clone(),
    );
    (UploadManager::new(client, UploadConfig::default()), transport)
}

fn chunk_indices(transport: &MockTransport) -> Vec<usize> {
    transport
        .calls_to("/upload/chunk")
        .iter()
        .filter_map(|call| call.form_field("chunkIndex").and_then(|v| v.parse().ok()))
        .collect()
}

fn ten_mib_file() -> UploadFile {
    let data: Vec<u8> = (0..10 * MIB).map(|i| (i % 251) as u8).collect();
    UploadFile::from_bytes("video.mp4", data)
}

#[tokio::test]
async fn test_resumes_from_server_state_in_batches() {
    let server = FakeServer::new();
    let (manager, transport) = upload_manager(&server, Duration::from_millis(10));

    let file = ten_mib_file();
    let prefix = UploadConfig::default().fingerprint_prefix_bytes;
    let hash = courier_network::upload::fingerprint(&file, prefix)
        .await
        .expect("hash");
    server.preload(&hash, &[0, 1]);

    let id = manager
        .add_task(
            file,
            AddTaskOptions {
                chunk_size: Some(2 * MIB as u64),
                concurrent_chunks: Some(2),
            },
        )
        .expect("add");
    let snapshot = settle(&manager, id).await;

    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.progress, 100.0);
    assert_eq!(snapshot.total_chunks, 5);
    assert_eq!(snapshot.uploaded_chunks, vec![0, 1, 2, 3, 4]);
    assert_eq!(snapshot.fingerprint.as_deref(), Some(hash.as_str()));

    let chunks = chunk_indices(&transport);
    assert_eq!(chunks.len(), 3);
    let first_batch: BTreeSet<usize> = chunks[..2].iter().copied().collect();
    assert_eq!(first_batch, BTreeSet::from([2, 3]));
    assert_eq!(chunks[2], 4);
    assert!(transport.peak_concurrency() <= 2);

    let urls: Vec<String> = transport.calls().into_iter().map(|c| c.url).collect();
    assert!(urls[0].ends_with("/upload/check"));
    assert!(urls.last().map_or(false, |u| u.ends_with("/upload/merge")));
    assert_eq!(transport.calls_to("/upload/merge").len(), 1);

    let chunk_call = &transport.calls_to("/upload/chunk")[0];
    assert_eq!(chunk_call.form_field("totalChunks"), Some("5"));
    assert_eq!(chunk_call.form_field("chunkSize"), Some("2097152"));
    assert_eq!(chunk_call.form_field("fileSize"), Some("10485760"));
    assert_eq!(chunk_call.form_field("fileName"), Some("video.mp4"));
    assert_eq!(chunk_call.form_field("fileHash"), Some(hash.as_str()));
    assert_eq!(chunk_call.form_field("fileId"), Some(id.to_string().as_str()));
}

#[tokio::test]
async fn test_restart_only_uploads_missing_chunks() {
    let server = FakeServer::new();
    *server.reject_chunk.lock().expect("lock") = Some(3);

    let options = AddTaskOptions {
        chunk_size: Some(4),
        concurrent_chunks: Some(1),
    };
    let data = b"0123456789abcdefghij".to_vec();

    let (first, first_transport) = upload_manager(&server, Duration::ZERO);
    let failed_id = first
        .add_task(UploadFile::from_bytes("notes.txt", data.clone()), options)
        .expect("add");
    let failed = settle(&first, failed_id).await;

    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.uploaded_chunks, vec![0, 1, 2]);
    assert_eq!(failed.failed_chunks, vec![3]);
    assert!(failed.error.as_deref().map_or(false, |e| e.contains("corrupt chunk")));
    assert!(first_transport.calls_to("/upload/merge").is_empty());

    *server.reject_chunk.lock().expect("lock") = None;
    let (second, second_transport) = upload_manager(&server, Duration::ZERO);
    let id = second
        .add_task(UploadFile::from_bytes("notes.txt", data), options)
        .expect("add");
    let done = settle(&second, id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(chunk_indices(&second_transport), vec![3, 4]);
}

#[tokio::test]
async fn test_failed_check_uploads_everything() {
    let server = FakeServer::new();
    *server.check_status.lock().expect("lock") = 404;
    let (manager, transport) = upload_manager(&server, Duration::ZERO);

    let id = manager
        .add_task(
            UploadFile::from_bytes("a.bin", vec![9u8; 12]),
            AddTaskOptions {
                chunk_size: Some(4),
                concurrent_chunks: Some(3),
            },
        )
        .expect("add");
    let snapshot = settle(&manager, id).await;

    assert_eq!(snapshot.status, TaskStatus::Completed);
    let mut chunks = chunk_indices(&transport);
    chunks.sort_unstable();
    assert_eq!(chunks, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_merge_failure_fails_task() {
    let server = FakeServer::new();
    *server.merge_status.lock().expect("lock") = 409;
    let (manager, _transport) = upload_manager(&server, Duration::ZERO);
    let mut events = manager.subscribe();

    let id = manager
        .add_task(UploadFile::from_bytes("a.bin", vec![1u8; 8]), AddTaskOptions::default())
        .expect("add");
    let snapshot = settle(&manager, id).await;

    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.progress, 100.0);
    assert!(snapshot.error.is_some());

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if let UploadEvent::Failed { id: failed, .. } = event {
            assert_eq!(failed, id);
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_pause_keeps_progress_and_resume_finishes() {
    let server = FakeServer::new();
    let (manager, transport) = upload_manager(&server, Duration::from_millis(30));
    let mut events = manager.subscribe();

    let id = manager
        .add_task(
            UploadFile::from_bytes("big.bin", vec![5u8; 80]),
            AddTaskOptions {
                chunk_size: Some(10),
                concurrent_chunks: Some(1),
            },
        )
        .expect("add");

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        if matches!(event, UploadEvent::ChunkUploaded { .. }) {
            break;
        }
    }
    manager.pause_task(id).expect("pause");

    let paused = manager.get_task(id).expect("task");
    assert_eq!(paused.status, TaskStatus::Pending);
    assert!(paused.paused);
    assert!(!paused.uploaded_chunks.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let still_paused = manager.get_task(id).expect("task");
    assert_eq!(still_paused.status, TaskStatus::Pending);
    assert_eq!(still_paused.uploaded_chunks, paused.uploaded_chunks);

    manager.resume_task(id).expect("resume");
    let done = settle(&manager, id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.uploaded_chunks, (0..8).collect::<Vec<_>>());
    assert!(!done.paused);

    // Chunks accepted before the pause are never sent again
    let sent = chunk_indices(&transport);
    for index in &paused.uploaded_chunks {
        assert_eq!(sent.iter().filter(|i| *i == index).count(), 1);
    }
}

#[tokio::test]
async fn test_cancel_during_upload_stops_without_merge() {
    let server = FakeServer::new();
    let (manager, transport) = upload_manager(&server, Duration::from_millis(30));
    let mut events = manager.subscribe();

    let id = manager
        .add_task(
            UploadFile::from_bytes("big.bin", vec![5u8; 80]),
            AddTaskOptions {
                chunk_size: Some(10),
                concurrent_chunks: Some(2),
            },
        )
        .expect("add");

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        if matches!(event, UploadEvent::StatusChanged { status: TaskStatus::Uploading, .. }) {
            break;
        }
    }
    manager.cancel_task(id).expect("cancel");

    tokio::time::sleep(Duration::from_millis(150)).await;
    let snapshot = manager.get_task(id).expect("task");
    assert_eq!(snapshot.status, TaskStatus::Cancelled);
    assert!(transport.calls_to("/upload/merge").is_empty());
    assert!(manager.pause_task(id).is_err());
}

#[tokio::test]
async fn test_tasks_run_one_after_another() {
    let server = FakeServer::new();
    let (manager, transport) = upload_manager(&server, Duration::from_millis(5));

    let ids: Vec<TaskId> = (0..3)
        .map(|i| {
            manager
                .add_task(
                    UploadFile::from_bytes(format!("f{}.bin", i), vec![i as u8; 6]),
                    AddTaskOptions {
                        chunk_size: Some(3),
                        concurrent_chunks: Some(2),
                    },
                )
                .expect("add")
        })
        .collect();

    for id in &ids {
        assert_eq!(settle(&manager, *id).await.status, TaskStatus::Completed);
    }

    // Each task's merge comes before the next task's check
    let kinds: Vec<&'static str> = transport
        .calls()
        .iter()
        .map(|c| {
            if c.url.ends_with("/check") {
                "check"
            } else if c.url.ends_with("/merge") {
                "merge"
            } else {
                "chunk"
            }
        })
        .filter(|k| *k != "chunk")
        .collect();
    assert_eq!(kinds, vec!["check", "merge", "check", "merge", "check", "merge"]);
}

#[tokio::test]
async fn test_remove_task_forgets_it() {
    let server = FakeServer::new();
    let (manager, _transport) = upload_manager(&server, Duration::from_millis(20));

    let id = manager
        .add_task(UploadFile::from_bytes("x", vec![0u8; 40]), AddTaskOptions {
            chunk_size: Some(10),
            concurrent_chunks: Some(1),
        })
        .expect("add");

    let removed = manager.remove_task(id).expect("remove");
    assert_eq!(removed.id, id);
    assert!(manager.get_task(id).is_none());
    assert!(manager.get_all_tasks().is_empty());
}

#[tokio::test]
async fn test_file_backed_upload() {
    use std::io::Write;

    let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
    tmp.write_all(&vec![7u8; 25]).expect("write");

    let server = FakeServer::new();
    let (manager, transport) = upload_manager(&server, Duration::ZERO);

    let file = UploadFile::from_path(tmp.path()).await.expect("open");
    let id = manager
        .add_task(file, AddTaskOptions {
            chunk_size: Some(10),
            concurrent_chunks: Some(2),
        })
        .expect("add");
    let snapshot = settle(&manager, id).await;

    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.file_size, 25);

    let sizes: Vec<usize> = transport
        .calls_to("/upload/chunk")
        .iter()
        .filter_map(|call| match &call.body {
            RequestBody::Multipart(fields) => fields.iter().find_map(|f| match f {
                MultipartField::File { data, .. } => Some(data.len()),
                _ => None,
            }),
            _ => None,
        })
        .collect();
    assert_eq!(sizes.iter().sum::<usize>(), 25);
}
