// crates/network/examples/resumable_upload.rs
//! Chunked upload against an in-memory server that already holds part of
//! the file

use courier_network::mock::{MockReply, MockTransport};
use courier_network::{
    AddTaskOptions, ClientConfig, HttpClient, RequestBody, TransportResponse, UploadConfig,
    UploadEvent, UploadFile, UploadManager,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("📤 Resumable Upload Example\n");

    // The server pretends chunks 0 and 1 arrived in an earlier session
    let transport = Arc::new(
        MockTransport::new(|request| {
            if request.url.ends_with("/upload/check") {
                if let RequestBody::Json(body) = &request.body {
                    println!("  🔎 check for {}", body["fileName"]);
                }
                let body = json!({"uploadedChunks": [0, 1]});
                MockReply::Response(TransportResponse::json(200, &body))
            } else {
                MockReply::Response(TransportResponse::json(200, &json!({"success": true})))
            }
        })
        .with_latency(Duration::from_millis(50)),
    );

    let client = HttpClient::with_transport(
        ClientConfig {
            base_url: Some("https://files.example.com".to_string()),
            ..ClientConfig::default()
        },
        transport.clone(),
    );
    let manager = UploadManager::new(client, UploadConfig::default());
    let mut events = manager.subscribe();

    let file = UploadFile::from_bytes("video.mp4", vec![0u8; 10 * 1024 * 1024]);
    let id = manager.add_task(
        file,
        AddTaskOptions {
            chunk_size: Some(2 * 1024 * 1024),
            concurrent_chunks: Some(2),
        },
    )?;
    println!("Task {} queued\n", id);

    while let Ok(event) = events.recv().await {
        match event {
            UploadEvent::StatusChanged { status, .. } => println!("  ➡️  {}", status),
            UploadEvent::ChunkUploaded { index, progress, .. } => {
                println!("  📦 chunk {} uploaded ({:.0}%)", index, progress)
            }
            UploadEvent::Completed { .. } => {
                println!("\n✅ Upload complete");
                break;
            }
            UploadEvent::Failed { error, .. } => {
                eprintln!("\n❌ Upload failed: {}", error);
                break;
            }
        }
    }

    println!("Transport calls: {}", transport.call_count());
    Ok(())
}
