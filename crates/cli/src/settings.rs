// crates/cli/src/settings.rs
//! Maps the file configuration onto the network crate's runtime types

use courier_config::Config;
use courier_network::{CacheConfig, ClientConfig, RetryPolicy, UploadConfig};
use std::time::Duration;

pub fn client_config(config: &Config) -> ClientConfig {
    let request = &config.request;
    let retry_policy = RetryPolicy::new(request.retries)
        .with_retry_delay(Duration::from_millis(request.retry_delay_ms))
        .with_max_delay(Duration::from_millis(request.max_retry_delay_ms));

    ClientConfig {
        base_url: request.base_url.clone(),
        timeout: Duration::from_millis(request.timeout_ms),
        user_agent: request.user_agent.clone(),
        max_concurrent: request.max_concurrent,
        retry_policy,
        deduplicate: request.deduplicate,
        cache: CacheConfig {
            enabled: config.cache.enabled,
            max_size: config.cache.max_size,
            default_ttl: Duration::from_millis(config.cache.default_ttl_ms),
        },
        ..ClientConfig::default()
    }
}

pub fn upload_config(config: &Config) -> UploadConfig {
    let upload = &config.upload;
    UploadConfig {
        chunk_size: upload.chunk_size,
        concurrent_chunks: upload.concurrent_chunks,
        fingerprint_prefix_bytes: upload.fingerprint_prefix_bytes,
        check_path: upload.check_path.clone(),
        chunk_path: upload.chunk_path.clone(),
        merge_path: upload.merge_path.clone(),
        ..UploadConfig::default()
    }
}
