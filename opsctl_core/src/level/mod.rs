//! Temporary logger level overrides with timed reversion.
//!
//! - **`severity`**: threshold enum and the inherited-level sentinel
//! - **`registry`**: named logger lookup backed by a reloadable `tracing` filter
//! - **`ledger`**: concurrent map of active overrides
//! - **`scheduler`**: one-shot reversion timers with cancellation handles
//! - **`engine`**: set/reset/query orchestration

pub mod engine;
pub mod ledger;
pub mod registry;
pub mod scheduler;
pub mod severity;

pub use engine::{
    LevelOverrides, LevelStatus, MAX_OVERRIDE_SECS, MIN_OVERRIDE_SECS, OverrideStats, ResetOutcome,
};
pub use ledger::{ModificationView, OverrideRecord, RestoredRecord};
pub use registry::{LoggerInfo, LoggerRegistry, ROOT_LOGGER, TargetRegistry};
pub use scheduler::{ReversionHandle, ReversionScheduler, ReversionTask, TokioScheduler};
pub use severity::{LevelSetting, OVERRIDE_LEVELS, ParseSeverityError, Severity};
