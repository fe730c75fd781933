// crates/cli/src/commands.rs

use crate::settings;
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use console::style;
use courier_config::{Config, ConfigManager};
use courier_network::{
    AddTaskOptions, HttpClient, RequestOptions, TaskId, TaskSnapshot, TaskStatus,
    TransportResponse, UploadEvent, UploadFile, UploadManager,
};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;

/// Send a GET request and print the response
pub async fn get_url(config: &Config, matches: &ArgMatches) -> Result<()> {
    let url = matches
        .get_one::<String>("url")
        .ok_or_else(|| anyhow::anyhow!("URL is required"))?;

    let params = parse_params(matches.get_many::<String>("param").into_iter().flatten())?;

    let mut options = RequestOptions::new();
    for header in matches.get_many::<String>("header").into_iter().flatten() {
        let (name, value) = parse_header(header)?;
        options = options.header(name, value);
    }
    if matches.get_flag("no-cache") {
        options = options.enable_cache(false);
    }
    let repeat = matches.get_one::<usize>("repeat").copied().unwrap_or(1).max(1);

    let client = HttpClient::new(settings::client_config(config))
        .context("Failed to build HTTP client")?;

    let started = Instant::now();
    let responses = fetch_many(&client, url, params, options, repeat).await?;
    let elapsed = started.elapsed();

    if let Some(response) = responses.first() {
        print_response(response);
    }
    if repeat > 1 {
        println!(
            "\n{} {} identical requests answered in {} ms",
            style("✓").green().bold(),
            responses.len(),
            elapsed.as_millis()
        );
    }
    if matches.get_flag("stats") {
        print_stats(&client);
    }

    Ok(())
}

/// Issues `repeat` identical GETs at once; identical requests share one execution
pub(crate) async fn fetch_many(
    client: &HttpClient,
    url: &str,
    params: Option<Value>,
    options: RequestOptions,
    repeat: usize,
) -> Result<Vec<TransportResponse>> {
    let requests = (0..repeat).map(|_| client.get(url, params.clone(), options.clone()));
    futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|result| result.with_context(|| format!("GET {} failed", url)))
        .collect()
}

/// Upload a file in resumable chunks
pub async fn upload_file(config: &Config, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("file")
        .ok_or_else(|| anyhow::anyhow!("File path is required"))?;

    let file = UploadFile::from_path(Path::new(path))
        .await
        .with_context(|| format!("Cannot read {}", path))?;

    let options = AddTaskOptions {
        chunk_size: matches.get_one::<u64>("chunk-size").copied(),
        concurrent_chunks: matches.get_one::<usize>("concurrency").copied(),
    };

    let client = HttpClient::new(settings::client_config(config))
        .context("Failed to build HTTP client")?;
    let manager = UploadManager::new(client, settings::upload_config(config));

    println!(
        "{} {} ({})",
        style("Uploading").bold().cyan(),
        file.name(),
        format_size(file.size())
    );

    let started = Instant::now();
    let snapshot = tokio::select! {
        result = run_upload(&manager, file, options) => result?,
        _ = tokio::signal::ctrl_c() => {
            for task in manager.get_all_tasks() {
                if task.status.can_pause() {
                    manager.pause_task(task.id).ok();
                }
            }
            bail!("Upload interrupted; run the same command again to resume");
        }
    };

    report_upload(&snapshot, started.elapsed().as_secs())
}

/// Adds the task and prints its events until it settles
pub(crate) async fn run_upload(
    manager: &UploadManager,
    file: UploadFile,
    options: AddTaskOptions,
) -> Result<TaskSnapshot> {
    let mut events = manager.subscribe();
    let id = manager
        .add_task(file, options)
        .context("Failed to queue upload")?;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.task_id() == id => print_event(&event),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let snapshot = manager.wait_for_terminal(id).await;
    printer.abort();
    snapshot.context("Upload task disappeared")
}

fn print_event(event: &UploadEvent) {
    match event {
        UploadEvent::ChunkUploaded {
            index, progress, ..
        } => println!("  chunk {:>4} done  {:>5.1}%", index, progress),
        UploadEvent::StatusChanged { status, .. } => {
            println!("  {}", style(status).dim())
        }
        UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => {}
    }
}

fn report_upload(snapshot: &TaskSnapshot, elapsed_secs: u64) -> Result<()> {
    match snapshot.status {
        TaskStatus::Completed => {
            println!(
                "{} Uploaded {} in {} ({} chunks)",
                style("✓").green().bold(),
                snapshot.file_name,
                format_duration(elapsed_secs),
                snapshot.total_chunks
            );
            println!("  Task: {}", short_id(snapshot.id));
            if let Some(fingerprint) = &snapshot.fingerprint {
                println!("  Fingerprint: {}", truncate(fingerprint, 16));
            }
            Ok(())
        }
        TaskStatus::Cancelled => bail!("Upload of {} was cancelled", snapshot.file_name),
        _ => bail!(
            "Upload of {} failed after {}/{} chunks: {}",
            snapshot.file_name,
            snapshot.uploaded_chunks.len(),
            snapshot.total_chunks,
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Write a default config file
pub fn config_init(manager: &ConfigManager) -> Result<()> {
    let created = manager
        .initialize()
        .context("Failed to write default config")?;

    if created {
        println!(
            "{} Created {}",
            style("✓").green().bold(),
            manager.config_path().display()
        );
    } else {
        println!("Config already exists at {}", manager.config_path().display());
    }
    Ok(())
}

/// Print the effective configuration as TOML
pub fn config_show(config: &Config) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", text);
    Ok(())
}

pub fn config_validate(manager: &ConfigManager) -> Result<()> {
    let errors = manager
        .validate()
        .context("Failed to read configuration")?;

    if errors.is_empty() {
        println!("{} Configuration is valid", style("✓").green().bold());
        return Ok(());
    }

    for error in &errors {
        println!("{} {}", style("✗").red().bold(), error);
    }
    bail!("{} invalid value(s) in {}", errors.len(), manager.config_path().display())
}

pub fn config_reset(manager: &ConfigManager) -> Result<()> {
    manager.reset().context("Failed to reset configuration")?;
    println!(
        "{} Reset {} to defaults",
        style("✓").green().bold(),
        manager.config_path().display()
    );
    Ok(())
}

/// Builds a query object from `key=value` pairs; repeated keys become arrays
pub(crate) fn parse_params<'a, I>(pairs: I) -> Result<Option<Value>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut params = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid parameter '{}', expected KEY=VALUE", pair);
        };
        if key.is_empty() {
            bail!("Invalid parameter '{}', key is empty", pair);
        }

        let value = Value::String(value.to_string());
        match params.get_mut(key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key.to_string(), value);
            }
        }
    }

    Ok((!params.is_empty()).then_some(Value::Object(params)))
}

pub(crate) fn parse_header(header: &str) -> Result<(String, String)> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header '{}', expected NAME:VALUE", header),
    }
}

fn print_response(response: &TransportResponse) {
    let status = if response.is_success() {
        style(response.status).green().bold()
    } else {
        style(response.status).red().bold()
    };
    println!("HTTP {}", status);

    if let Some(content_type) = response.header("content-type") {
        println!("{}", style(format!("content-type: {}", content_type)).dim());
    }
    println!();
    println!("{}", render_body(response));
}

/// Pretty-prints JSON bodies; anything else is shown as text
pub(crate) fn render_body(response: &TransportResponse) -> String {
    match response.json_body::<Value>() {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text()),
        Err(_) => response.text(),
    }
}

fn print_stats(client: &HttpClient) {
    let cache = client.get_cache_stats();
    let requests = client.get_request_stats();

    println!("\n{}", style("Client Statistics").bold().cyan());
    println!("{}", "=".repeat(40));
    println!("Cache entries: {}/{}", cache.size, cache.max_size);
    println!("Cache hit rate: {:.1}%", cache.hit_rate * 100.0);
    println!("In-flight requests: {}", requests.pending_requests);
    println!("Queued: {}", requests.queue_length);
    println!(
        "Running: {}/{}",
        requests.running_count, requests.max_concurrent
    );
}

fn short_id(id: TaskId) -> String {
    truncate(&id.to_string(), 8)
}

fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

#[cfg(test)]
mod tests;
