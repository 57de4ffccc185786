//! # opsctl core
//!
//! The in-process control plane behind the `opsctl` admin surface.
//!
//! ## Subsystems
//!
//! *   **Log-level overrides** ([`level`]): an operator switches a named logger
//!     to another threshold for 1 to 600 seconds. The override reverts on its
//!     own when the time is up, and can be reset early. Repeated overrides of
//!     the same logger always revert to the level it had before the first one.
//! *   **Port claim** ([`port_claim`]): during startup, make sure the process
//!     owns its listen port. In development a previous instance is asked to hand
//!     the port over. In production a conflict is fatal.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opsctl_core::level::{LevelOverrides, Severity, TargetRegistry, TokioScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(TargetRegistry::new(Severity::Info));
//!     let overrides = LevelOverrides::new(registry, Arc::new(TokioScheduler::current()));
//!
//!     let record = overrides.set_level("root", "DEBUG", 60)?;
//!     println!("override {} expires at {}", record.modification_key, record.scheduled_expiry);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod level;
pub mod logging;
pub mod port_claim;

pub use config::{ConfigError, OpsctlConfig};
pub use error::{ErrorKind, OverrideError, RegistryError, Result};
pub use level::{LevelOverrides, LevelStatus, ResetOutcome};
pub use port_claim::{ClaimError, Claimed, PortClaim, StartupMode, claim_or_fail, claim_port};
