// crates/network/examples/cached_get.rs
//! Deduplication and caching of GET requests

use courier_network::mock::MockTransport;
use courier_network::{ClientConfig, HttpClient, RequestOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    println!("🗂️  Cached GET Example\n");

    let transport = Arc::new(
        MockTransport::ok_json(json!({"items": ["a", "b", "c"]}))
            .with_latency(Duration::from_millis(100)),
    );
    let client = HttpClient::with_transport(
        ClientConfig {
            base_url: Some("https://api.example.com".to_string()),
            ..ClientConfig::default()
        },
        transport.clone(),
    );

    // Five simultaneous identical requests collapse into one call
    let burst = (0..5)
        .map(|_| client.get("/items", Some(json!({"page": 1})), RequestOptions::new()));
    futures::future::join_all(burst).await;
    println!("After burst: {} transport call(s)", transport.call_count());

    // Served from the cache
    client.get("/items", Some(json!({"page": 1})), RequestOptions::new()).await?;
    println!("After cached read: {} transport call(s)", transport.call_count());

    // Different query, different cache entry
    client.get("/items", Some(json!({"page": 2})), RequestOptions::new()).await?;
    println!("After page 2: {} transport call(s)\n", transport.call_count());

    println!("Cache:    {}", serde_json::to_string_pretty(&client.get_cache_stats())?);
    println!("Requests: {}", serde_json::to_string_pretty(&client.get_request_stats())?);
    Ok(())
}
