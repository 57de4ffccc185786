//! Best-effort "please shut down" requests to a previous instance.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Path a cooperating instance serves to accept a handoff request.
pub const SHUTDOWN_PATH: &str = "/admin/shutdown";

/// Asks whatever listens on a port to release it.
///
/// Delivery is fire-and-forget: implementations swallow every failure, since
/// the occupant may not be a cooperating instance at all.
#[async_trait]
pub trait ShutdownNotifier: Send + Sync {
    async fn notify(&self, port: u16);
}

/// Sends `POST http://<host>:<port>/admin/shutdown`.
#[derive(Debug, Clone)]
pub struct HttpShutdownNotifier {
    client: reqwest::Client,
    host: String,
}

impl HttpShutdownNotifier {
    /// Notifier for instances on the loopback interface.
    pub fn new(timeout: Duration) -> Self {
        Self::with_host("127.0.0.1", timeout)
    }

    pub fn with_host(host: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                debug!("Falling back to default HTTP client for shutdown notifier: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            host: host.into(),
        }
    }

    pub fn url(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, SHUTDOWN_PATH)
    }
}

#[async_trait]
impl ShutdownNotifier for HttpShutdownNotifier {
    async fn notify(&self, port: u16) {
        let url = self.url(port);
        match self.client.post(&url).send().await {
            Ok(resp) => debug!(%url, status = %resp.status(), "Shutdown notification delivered"),
            Err(e) => debug!(%url, "Shutdown notification not delivered: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn builds_loopback_url() {
        let notifier = HttpShutdownNotifier::new(Duration::from_millis(100));
        assert_eq!(notifier.url(8080), "http://127.0.0.1:8080/admin/shutdown");
    }

    #[tokio::test]
    async fn unreachable_port_is_swallowed() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let notifier = HttpShutdownNotifier::new(Duration::from_millis(100));

        // Nothing listens here; the call must simply return.
        notifier.notify(port).await;
    }
}
