//! # opsctl HTTP surface
//!
//! Serves the log-level admin endpoints of [`opsctl_core`] over HTTP and
//! takes part in the port handoff between development instances.
//!
//! *   **Admin routes** ([`admin`]): query, override and reset logger levels
//!     under `/admin/logging`.
//! *   **Server** ([`server`]): binds the listener, prints the bound port as
//!     `OPSCTL_BOUND_PORT=<port>` on stderr, serves `/health`, and in
//!     development accepts `POST /admin/shutdown` from a newer instance.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opsctl_core::level::{LevelOverrides, Severity, TargetRegistry, TokioScheduler};
//! use opsctl_http::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(TargetRegistry::new(Severity::Info));
//!     let overrides = LevelOverrides::new(registry, Arc::new(TokioScheduler::current()));
//!
//!     let handle = Server::bind(ServerConfig::default(), overrides).await?.spawn();
//!     println!("admin surface on http://{}", handle.local_addr());
//!     handle.stopped().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod error;
pub mod server;

pub use admin::{ADMIN_PREFIX, admin_router};
pub use error::{ApiError, Result, ServerError};
pub use server::{Server, ServerConfig, ServerHandle, build_router, start_server};
