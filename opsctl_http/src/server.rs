//! HTTP server hosting the admin surface

use crate::admin::{ADMIN_PREFIX, admin_router};
use crate::error::{Result, ServerError};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use opsctl_core::level::LevelOverrides;
use opsctl_core::port_claim::{SHUTDOWN_PATH, StartupMode};
use std::net::SocketAddr;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the admin HTTP server.
///
/// # Example
///
/// ```rust
/// use opsctl_http::ServerConfig;
/// use opsctl_core::StartupMode;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     mode: StartupMode::Production,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub bind_addr: SocketAddr,

    /// In development the server accepts `POST /admin/shutdown` so a newer
    /// instance can take over its port. Production servers do not.
    pub mode: StartupMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            mode: StartupMode::Development,
        }
    }
}

#[derive(Clone)]
struct ServerState {
    shutdown: CancellationToken,
}

/// Build the full application router.
pub fn build_router(
    mode: StartupMode,
    overrides: LevelOverrides,
    shutdown: CancellationToken,
) -> Router {
    let mut routes = Router::new().route("/health", get(health_check));
    if mode == StartupMode::Development {
        routes = routes.route(SHUTDOWN_PATH, post(handle_shutdown));
    }
    routes
        .with_state(ServerState { shutdown })
        .nest(ADMIN_PREFIX, admin_router(overrides))
        .layer(TraceLayer::new_for_http())
}

/// A bound but not yet running server.
pub struct Server {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the listen socket. The bound port is printed to stderr as
    /// `OPSCTL_BOUND_PORT=<port>` for scripts and tests.
    pub async fn bind(config: ServerConfig, overrides: LevelOverrides) -> Result<Self> {
        if !config.bind_addr.ip().is_loopback() {
            warn!(
                "Admin server bound to non-loopback address {}. \
                 The admin endpoints are unauthenticated; restrict access via firewall.",
                config.bind_addr
            );
        }

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::HttpServer(format!("Failed to bind: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::HttpServer(format!("Failed to get local addr: {}", e)))?;

        let shutdown = CancellationToken::new();
        let app = build_router(config.mode, overrides, shutdown.clone());

        info!("Admin server listening on http://{}", local_addr);
        info!("Log level endpoints: http://{}{}", local_addr, ADMIN_PREFIX);
        eprintln!("OPSCTL_BOUND_PORT={}", local_addr.port());

        Ok(Self {
            listener,
            app,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::HttpServer(format!("Server error: {}", e)))?;
        info!("Admin server on {} stopped", self.local_addr);
        Ok(())
    }

    /// Run on a background task.
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());
        ServerHandle {
            local_addr,
            shutdown,
            task,
        }
    }
}

/// Handle to a server running on a background task.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait for the server task to finish.
    pub async fn stopped(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| ServerError::HttpServer(format!("Server task failed: {}", e)))?
    }
}

/// Bind, then serve until Ctrl-C or a handoff request.
///
/// # Example
///
/// ```rust,no_run
/// use opsctl_core::level::{LevelOverrides, Severity, TargetRegistry, TokioScheduler};
/// use opsctl_http::{ServerConfig, start_server};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let registry = Arc::new(TargetRegistry::new(Severity::Info));
///     let overrides = LevelOverrides::new(registry, Arc::new(TokioScheduler::current()));
///     start_server(ServerConfig::default(), overrides).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig, overrides: LevelOverrides) -> Result<()> {
    info!("Starting admin server on {} ({:?})", config.bind_addr, config.mode);
    let server = Server::bind(config, overrides).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });

    server.run().await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Accept a handoff request from a newer instance and begin shutting down.
async fn handle_shutdown(State(state): State<ServerState>) -> impl IntoResponse {
    warn!("Shutdown requested by a newer instance, releasing the port");
    state.shutdown.cancel();
    (StatusCode::ACCEPTED, "shutting down")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use opsctl_core::level::{Severity, TargetRegistry, TokioScheduler};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn overrides() -> LevelOverrides {
        LevelOverrides::new(
            Arc::new(TargetRegistry::new(Severity::Info)),
            Arc::new(TokioScheduler::current()),
        )
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn default_config_is_loopback_development() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.mode, StartupMode::Development);
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let app = build_router(StartupMode::Development, overrides(), CancellationToken::new());
        let response = app.oneshot(request(Method::GET, "/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn shutdown_request_cancels_token_in_development() {
        let token = CancellationToken::new();
        let app = build_router(StartupMode::Development, overrides(), token.clone());

        let response = app
            .oneshot(request(Method::POST, SHUTDOWN_PATH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_route_absent_in_production() {
        let token = CancellationToken::new();
        let app = build_router(StartupMode::Production, overrides(), token.clone());

        let response = app
            .oneshot(request(Method::POST, SHUTDOWN_PATH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn admin_routes_are_nested() {
        let app = build_router(StartupMode::Production, overrides(), CancellationToken::new());
        let response = app
            .oneshot(request(Method::GET, "/admin/logging/level?logger=root"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn spawned_server_reports_bound_port_and_stops() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            mode: StartupMode::Development,
        };
        let handle = Server::bind(config, overrides()).await.unwrap().spawn();
        assert_ne!(handle.local_addr().port(), 0);

        handle.shutdown();
        assert!(handle.is_shutting_down());
        handle.stopped().await.unwrap();
    }
}
