//! Loopback server for end-to-end tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stream_gateway::{EventBuses, GatewayConfig, GatewayService};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A gateway serving on `127.0.0.1:<ephemeral>`; shut down on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub buses: EventBuses,
    pub service: Arc<GatewayService>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(config: GatewayConfig, buses: EventBuses) -> Self {
        let service = Arc::new(
            GatewayService::with_config_token(config, buses.clone()).expect("valid config"),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let _ = service.serve(listener).await;
            })
        };

        Self {
            addr,
            buses,
            service,
            handle,
        }
    }

    /// Default config, all six buses.
    pub async fn spawn_default() -> Self {
        Self::spawn(GatewayConfig::default(), EventBuses::with_capacity(256)).await
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Sum of subscribers over every bus.
    pub fn total_subscribers(&self) -> usize {
        self.buses.stats().iter().map(|s| s.subscribers).sum()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.service.shutdown();
        self.handle.abort();
    }
}

/// Poll `condition` every 10 ms for up to 2 s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// `None` if `future` does not finish within `ms` milliseconds.
pub async fn within<F: Future>(ms: u64, future: F) -> Option<F::Output> {
    tokio::time::timeout(Duration::from_millis(ms), future).await.ok()
}
