use super::*;
use courier_network::mock::{MockReply, MockTransport};
use courier_network::ClientConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn client(transport: Arc<MockTransport>) -> HttpClient {
    let config = ClientConfig {
        base_url: Some("https://api.test".to_string()),
        ..ClientConfig::default()
    };
    HttpClient::with_transport(config, transport)
}

#[test]
fn test_parse_params() {
    let pairs = strings(&["page=2", "tag=a", "tag=b", "empty="]);
    let params = parse_params(pairs.iter()).expect("valid params");

    assert_eq!(
        params,
        Some(json!({"page": "2", "tag": ["a", "b"], "empty": ""}))
    );
}

#[test]
fn test_parse_params_empty_is_none() {
    let pairs: Vec<String> = Vec::new();
    assert_eq!(parse_params(pairs.iter()).expect("valid"), None);
}

#[test]
fn test_parse_params_rejects_bad_pairs() {
    assert!(parse_params(strings(&["novalue"]).iter()).is_err());
    assert!(parse_params(strings(&["=value"]).iter()).is_err());
}

#[test]
fn test_parse_header() {
    assert_eq!(
        parse_header("Authorization: Bearer abc").expect("valid"),
        ("Authorization".to_string(), "Bearer abc".to_string())
    );
    assert!(parse_header("no-colon").is_err());
    assert!(parse_header(": value").is_err());
}

#[test]
fn test_render_body() {
    let json_response = TransportResponse::json(200, &json!({"a": 1}));
    assert_eq!(render_body(&json_response), "{\n  \"a\": 1\n}");

    let text_response = TransportResponse::new(200, "plain text");
    assert_eq!(render_body(&text_response), "plain text");
}

#[test]
fn test_format_helpers() {
    assert_eq!(format_size(512), "512 bytes");
    assert_eq!(format_size(1_048_576), "1.00 MB");
    assert_eq!(format_duration(42), "42s");
    assert_eq!(format_duration(125), "2m 5s");
    assert_eq!(truncate("123456789", 8), "12345678...");
}

#[tokio::test]
async fn test_fetch_many_shares_one_call() {
    let transport = Arc::new(
        MockTransport::ok_json(json!({"ok": true})).with_latency(Duration::from_millis(50)),
    );
    let client = client(transport.clone());

    let params = Some(json!({"page": "1"}));
    let responses = fetch_many(&client, "/items", params, RequestOptions::new(), 4)
        .await
        .expect("requests succeed");

    assert_eq!(responses.len(), 4);
    assert_eq!(transport.call_count(), 1);
    assert!(transport.calls()[0].url.contains("page=1"));
}

#[tokio::test]
async fn test_repeated_params_send_repeated_query_keys() {
    let transport = Arc::new(MockTransport::ok_json(json!({})));
    let client = client(transport.clone());

    let params = parse_params(strings(&["tag=a", "page=2", "tag=b"]).iter()).expect("params");
    fetch_many(&client, "/items", params, RequestOptions::new(), 1)
        .await
        .expect("request succeeds");

    assert_eq!(
        transport.calls()[0].url,
        "https://api.test/items?page=2&tag=a&tag=b"
    );
}

#[tokio::test]
async fn test_fetch_many_reports_failure() {
    let transport = Arc::new(MockTransport::new(|_| {
        MockReply::Response(TransportResponse::json(404, &json!({"message": "missing"})))
    }));
    let client = client(transport);

    let err = fetch_many(&client, "/gone", None, RequestOptions::new(), 1)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("GET /gone failed"));
}

fn upload_server() -> Arc<MockTransport> {
    Arc::new(MockTransport::new(|request| {
        if request.url.ends_with("/upload/check") {
            MockReply::Response(TransportResponse::json(200, &json!({"uploadedChunks": []})))
        } else {
            MockReply::Response(TransportResponse::json(200, &json!({"success": true})))
        }
    }))
}

#[tokio::test]
async fn test_run_upload_completes() {
    let transport = upload_server();
    let manager =
        UploadManager::new(client(transport.clone()), settings::upload_config(&Config::default()));

    let file = UploadFile::from_bytes("notes.txt", vec![3u8; 300 * 1024]);
    let options = AddTaskOptions {
        chunk_size: Some(128 * 1024),
        concurrent_chunks: Some(2),
    };

    let snapshot = run_upload(&manager, file, options).await.expect("upload");
    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.total_chunks, 3);
    assert_eq!(transport.calls_to("/upload/chunk").len(), 3);
    assert_eq!(transport.calls_to("/upload/merge").len(), 1);
    assert!(report_upload(&snapshot, 1).is_ok());
}

#[tokio::test]
async fn test_failed_upload_is_reported() {
    let transport = Arc::new(MockTransport::new(|request| {
        if request.url.ends_with("/upload/merge") {
            MockReply::Response(TransportResponse::json(400, &json!({"message": "hash mismatch"})))
        } else if request.url.ends_with("/upload/check") {
            MockReply::Response(TransportResponse::json(200, &json!({"uploadedChunks": []})))
        } else {
            MockReply::Response(TransportResponse::json(200, &json!({"success": true})))
        }
    }));
    let manager =
        UploadManager::new(client(transport), settings::upload_config(&Config::default()));

    let file = UploadFile::from_bytes("a.bin", vec![1u8; 1024]);
    let snapshot = run_upload(&manager, file, AddTaskOptions::default())
        .await
        .expect("task settles");

    assert_eq!(snapshot.status, TaskStatus::Failed);
    let err = report_upload(&snapshot, 0).unwrap_err();
    assert!(err.to_string().contains("hash mismatch"));
}

#[test]
fn test_config_commands() {
    let dir = tempfile::tempdir().expect("temp dir");
    let manager = ConfigManager::with_directory(dir.path().to_path_buf()).expect("manager");

    config_init(&manager).expect("init");
    assert!(manager.config_path().exists());
    config_validate(&manager).expect("default config is valid");

    std::fs::write(manager.config_path(), "[request]\nmax_concurrent = 0\n").expect("write");
    assert!(config_validate(&manager).is_err());

    config_reset(&manager).expect("reset");
    config_validate(&manager).expect("valid after reset");
    config_show(&Config::default()).expect("show");
}
