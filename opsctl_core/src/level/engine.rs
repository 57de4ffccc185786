//! # Log-Level Override Engine
//!
//! [`LevelOverrides`] temporarily switches a named logger to another threshold
//! and reverts it automatically once the requested duration elapses.
//!
//! ## Per-logger state machine
//!
//! ```text
//!             set_level                    set_level (re-pivot)
//!  BASELINE ─────────────▶ OVERRIDDEN ◀──────────────┐
//!     ▲                        │  └──────────────────┘
//!     └────────────────────────┘
//!       reset_level / reset_all / expiry
//! ```
//!
//! A repeated `set_level` on an overridden logger keeps the original baseline,
//! issues a new modification key and restarts the duration from now.
//!
//! ## Concurrency
//!
//! Every mutation of one logger runs while holding that logger's ledger entry,
//! so set, reset and expiry on the same logger are linearized. Different
//! loggers only contend when they hash to the same ledger shard. A reversion
//! that fires after its override was reset or replaced finds a missing entry or
//! a different modification key and does nothing.

use super::{
    ledger::{Ledger, LedgerEntry, ModificationView, OverrideRecord, RestoredRecord},
    registry::LoggerRegistry,
    scheduler::{ReversionHandle, ReversionScheduler},
    severity::{LevelSetting, Severity},
};
use crate::error::{OverrideError, Result};
use chrono::{TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shortest override an operator may request, in seconds.
pub const MIN_OVERRIDE_SECS: u64 = 1;
/// Longest override an operator may request, in seconds.
pub const MAX_OVERRIDE_SECS: u64 = 600;

// Delay before a reversion that failed to reach the registry runs again.
const EXPIRY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Result of [`LevelOverrides::query_level`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum LevelStatus {
    Original {
        logger: String,
        level: Severity,
    },
    Modified {
        logger: String,
        level: Severity,
        original: LevelSetting,
        modification_key: Uuid,
    },
    NonExisting {
        logger: String,
    },
}

/// Result of [`LevelOverrides::reset_level`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Restored(RestoredRecord),
    NotModified,
}

/// Point-in-time copy of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideStats {
    pub applied: u64,
    pub reset_manually: u64,
    pub expired: u64,
    pub rejected: u64,
    pub active: u64,
}

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    reset_manually: AtomicU64,
    expired: AtomicU64,
    rejected: AtomicU64,
}

struct Inner {
    ledger: Ledger,
    registry: Arc<dyn LoggerRegistry>,
    scheduler: Arc<dyn ReversionScheduler>,
    counters: Counters,
}

/// Temporary, self-reverting logger level overrides.
///
/// Cheap to clone; clones share the same ledger.
#[derive(Clone)]
pub struct LevelOverrides {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LevelOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelOverrides")
            .field("ledger", &self.inner.ledger)
            .field("counters", &self.inner.counters)
            .finish_non_exhaustive()
    }
}

fn validate_duration(seconds: i64) -> Result<Duration> {
    match u64::try_from(seconds) {
        Ok(secs) if (MIN_OVERRIDE_SECS..=MAX_OVERRIDE_SECS).contains(&secs) => {
            Ok(Duration::from_secs(secs))
        }
        _ => Err(OverrideError::InvalidDuration {
            seconds,
            min: MIN_OVERRIDE_SECS,
            max: MAX_OVERRIDE_SECS,
        }),
    }
}

impl LevelOverrides {
    pub fn new(registry: Arc<dyn LoggerRegistry>, scheduler: Arc<dyn ReversionScheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: Ledger::new(),
                registry,
                scheduler,
                counters: Counters::default(),
            }),
        }
    }

    /// The registry overrides are applied to.
    pub fn registry(&self) -> &Arc<dyn LoggerRegistry> {
        &self.inner.registry
    }

    /// Switch `logger` to `level` for `seconds` seconds.
    ///
    /// All validation happens before anything changes. A logger that is
    /// already overridden keeps its original baseline and gets a fresh
    /// modification key and a timer restarted from now.
    pub fn set_level(&self, logger: &str, level: &str, seconds: i64) -> Result<OverrideRecord> {
        let result = self.apply_override(logger, level, seconds);
        if let Err(e) = &result {
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(logger = %logger, level = %level, seconds, "Override rejected: {}", e);
        }
        result
    }

    fn apply_override(&self, logger: &str, level: &str, seconds: i64) -> Result<OverrideRecord> {
        let duration = validate_duration(seconds)?;
        let target = Severity::parse_override(level)
            .map_err(|_| OverrideError::UnknownLevel(level.to_string()))?;
        let registry = &self.inner.registry;
        if !registry.contains(logger) {
            return Err(OverrideError::LoggerNotFound(logger.to_string()));
        }

        let mut entry = self.inner.ledger.entry(logger);
        let (original_level, baseline) = match &entry {
            Entry::Occupied(active) => {
                let record = &active.get().record;
                // An inheriting logger reverts to whatever its parents say now,
                // which may have changed since it was first overridden.
                let baseline = match record.original_level {
                    LevelSetting::Explicit(level) => level,
                    LevelSetting::Inherited => registry
                        .inherited_level(logger)
                        .unwrap_or(record.baseline),
                };
                (record.original_level, baseline)
            }
            Entry::Vacant(_) => {
                let setting = registry
                    .level(logger)
                    .ok_or_else(|| OverrideError::LoggerNotFound(logger.to_string()))?;
                let effective = registry
                    .effective_level(logger)
                    .ok_or_else(|| OverrideError::LoggerNotFound(logger.to_string()))?;
                (setting, effective)
            }
        };
        if target == baseline {
            return Err(OverrideError::BaselineNoOp {
                logger: logger.to_string(),
                level: baseline,
            });
        }

        if let Entry::Occupied(active) = &entry {
            active.get().reversion.cancel();
        }
        if let Err(e) = registry.set_level(logger, LevelSetting::Explicit(target)) {
            if let Entry::Occupied(active) = &mut entry {
                let previous = active.get_mut();
                previous.reversion = self.inner.schedule_reversion(
                    logger,
                    previous.record.modification_key,
                    remaining(&previous.record),
                );
            }
            return Err(e.into());
        }

        let now = Utc::now();
        let modification_key = Uuid::new_v4();
        let record = OverrideRecord {
            logger: logger.to_string(),
            original_level,
            baseline,
            current_level: target,
            scheduled_expiry: now + TimeDelta::seconds(seconds),
            modification_key,
            created_at: now,
        };
        let reversion = self
            .inner
            .schedule_reversion(logger, modification_key, duration);
        entry.insert(LedgerEntry {
            record: record.clone(),
            reversion,
        });

        self.inner.counters.applied.fetch_add(1, Ordering::Relaxed);
        info!(
            logger = %logger,
            level = %target,
            original = %original_level,
            seconds,
            modification_key = %modification_key,
            "Logger level overridden"
        );
        Ok(record)
    }

    /// Restore `logger` to its baseline and drop its override.
    pub fn reset_level(&self, logger: &str) -> Result<ResetOutcome> {
        let Entry::Occupied(active) = self.inner.ledger.entry(logger) else {
            debug!(logger = %logger, "Reset requested but logger is not overridden");
            return Ok(ResetOutcome::NotModified);
        };

        let record = active.get().record.clone();
        self.inner
            .registry
            .set_level(logger, record.original_level)?;
        active.get().reversion.cancel();
        active.remove();

        self.inner
            .counters
            .reset_manually
            .fetch_add(1, Ordering::Relaxed);
        let restored = self.inner.restored(&record);
        info!(
            logger = %logger,
            restored = %record.original_level,
            modification_key = %record.modification_key,
            "Logger level reset"
        );
        Ok(ResetOutcome::Restored(restored))
    }

    /// Reset every active override. Loggers whose restoration fails keep their
    /// override and are left out of the result.
    pub fn reset_all(&self) -> Vec<RestoredRecord> {
        self.inner
            .ledger
            .loggers()
            .into_iter()
            .filter_map(|logger| match self.reset_level(&logger) {
                Ok(ResetOutcome::Restored(restored)) => Some(restored),
                Ok(ResetOutcome::NotModified) => None,
                Err(e) => {
                    warn!(logger = %logger, "Failed to reset logger: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Whether `logger` exists and whether it carries an override. No side
    /// effects.
    pub fn query_level(&self, logger: &str) -> LevelStatus {
        if let Some(record) = self.inner.ledger.get(logger) {
            return LevelStatus::Modified {
                logger: record.logger,
                level: record.current_level,
                original: record.original_level,
                modification_key: record.modification_key,
            };
        }
        match self.inner.registry.effective_level(logger) {
            Some(level) => LevelStatus::Original {
                logger: logger.to_string(),
                level,
            },
            None => LevelStatus::NonExisting {
                logger: logger.to_string(),
            },
        }
    }

    /// Every active override with the time left until it reverts.
    pub fn query_modifications(&self) -> Vec<ModificationView> {
        let now = Utc::now();
        self.inner
            .ledger
            .snapshot()
            .into_iter()
            .map(|record| ModificationView {
                remaining_ms: record.remaining_ms(now),
                record,
            })
            .collect()
    }

    pub fn stats(&self) -> OverrideStats {
        let counters = &self.inner.counters;
        OverrideStats {
            applied: counters.applied.load(Ordering::Relaxed),
            reset_manually: counters.reset_manually.load(Ordering::Relaxed),
            expired: counters.expired.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            active: self.inner.ledger.len() as u64,
        }
    }
}

fn remaining(record: &OverrideRecord) -> Duration {
    record
        .remaining_ms(Utc::now())
        .try_into()
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

impl Inner {
    fn restored(&self, record: &OverrideRecord) -> RestoredRecord {
        RestoredRecord {
            logger: record.logger.clone(),
            restored_level: record.original_level,
            effective_level: self
                .registry
                .effective_level(&record.logger)
                .unwrap_or(record.baseline),
            modification_key: record.modification_key,
        }
    }

    fn schedule_reversion(
        self: &Arc<Self>,
        logger: &str,
        key: Uuid,
        delay: Duration,
    ) -> ReversionHandle {
        let engine: Weak<Inner> = Arc::downgrade(self);
        let logger = logger.to_string();
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = engine.upgrade() {
                    inner.expire(&logger, key);
                }
            }),
        )
    }

    fn expire(self: &Arc<Self>, logger: &str, key: Uuid) {
        let Entry::Occupied(mut active) = self.ledger.entry(logger) else {
            debug!(logger = %logger, modification_key = %key, "Reversion skipped: override already gone");
            return;
        };
        if active.get().record.modification_key != key {
            debug!(logger = %logger, modification_key = %key, "Reversion skipped: override was replaced");
            return;
        }

        let record = active.get().record.clone();
        if let Err(e) = self.registry.set_level(logger, record.original_level) {
            error!(
                logger = %logger,
                modification_key = %key,
                retry_in = ?EXPIRY_RETRY_DELAY,
                "Failed to revert logger level, override stays active: {}",
                e
            );
            active.get_mut().reversion = self.schedule_reversion(logger, key, EXPIRY_RETRY_DELAY);
            return;
        }
        active.remove();

        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        info!(
            logger = %logger,
            restored = %record.original_level,
            modification_key = %key,
            "Logger level override expired"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_are_inclusive() {
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(-5).is_err());
        assert!(validate_duration(601).is_err());
        assert_eq!(validate_duration(1).unwrap(), Duration::from_secs(1));
        assert_eq!(validate_duration(600).unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn level_status_serializes_with_status_tag() {
        let status = LevelStatus::NonExisting {
            logger: "ghost".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "non-existing");
        assert_eq!(json["logger"], "ghost");

        let status = LevelStatus::Modified {
            logger: "app".into(),
            level: Severity::Debug,
            original: LevelSetting::Inherited,
            modification_key: Uuid::nil(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "modified");
        assert_eq!(json["level"], "DEBUG");
        assert!(json["modificationKey"].is_string());
    }
}
