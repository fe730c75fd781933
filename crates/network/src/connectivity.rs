// crates/network/src/connectivity.rs
//! Network reachability signal

use crate::transport::{RequestBody, Transport, TransportRequest, Verb};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Holds the current online/offline state
///
/// The state is normally pushed in from outside with [`set_online`]. While
/// offline, the request coordinator fails every attempt fast with a
/// retryable `Network` error instead of touching the transport.
///
/// [`set_online`]: ConnectivityMonitor::set_online
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    check_urls: Vec<String>,
    probe_timeout: Duration,
}

impl ConnectivityMonitor {
    /// Creates a monitor that starts online, with default probe URLs
    pub fn new() -> Self {
        Self::with_urls(vec![
            "https://www.google.com".to_string(),
            "https://www.cloudflare.com".to_string(),
            "https://www.rust-lang.org".to_string(),
        ])
    }

    /// Creates a monitor with custom probe URLs
    pub fn with_urls(urls: Vec<String>) -> Self {
        let (state, _) = watch::channel(true);
        Self {
            state: Arc::new(state),
            check_urls: urls,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Records an externally observed reachability change
    pub fn set_online(&self, online: bool) {
        let previous = self.state.send_replace(online);
        if previous != online {
            log::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    /// Receives every state change
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Probes the check URLs and records the result
    ///
    /// Any response, whatever its status, counts as reachable.
    pub async fn probe(&self, transport: &dyn Transport) -> bool {
        let mut online = false;
        for url in &self.check_urls {
            let request = TransportRequest {
                verb: Verb::Head,
                url: url.clone(),
                headers: BTreeMap::new(),
                body: RequestBody::Empty,
                timeout: self.probe_timeout,
            };
            if transport.send(request).await.is_ok() {
                online = true;
                break;
            }
        }
        self.set_online(online);
        online
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
