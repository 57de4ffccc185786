//! # Logger Registry
//!
//! Loggers are `tracing` targets such as `app`, `app::db` and `app::db::pool`.
//! A logger either carries an explicit threshold or inherits one. Inheritance
//! follows the rule [`Targets`] uses to match events: the longest explicitly
//! configured name that is a plain string prefix of the logger wins, so `app`
//! governs `apple` as well as `app::db`. With no such name the logger
//! inherits from `root`.
//!
//! [`TargetRegistry`] keeps the set of known loggers and, after every change,
//! rebuilds a [`Targets`] filter and hands it to an optional filter sink. In a
//! running service the sink is a `tracing_subscriber::reload` handle, so a
//! level change takes effect on the live subscriber immediately.

use super::severity::{LevelSetting, Severity};
use crate::error::RegistryError;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};
use tracing_subscriber::filter::{LevelFilter, Targets};

/// Name of the logger every other logger ultimately inherits from.
pub const ROOT_LOGGER: &str = "root";

/// A known logger and its levels, as reported by `GET loggers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerInfo {
    pub name: String,
    pub configured_level: LevelSetting,
    pub effective_level: Severity,
}

/// Lookup and mutation of named loggers.
///
/// Implementations must be safe to call from request handlers and from the
/// reversion scheduler concurrently.
pub trait LoggerRegistry: Send + Sync {
    /// The logger's configured setting, or `None` if no such logger exists.
    fn level(&self, logger: &str) -> Option<LevelSetting>;

    /// The threshold actually in force for `logger`, after inheritance.
    fn effective_level(&self, logger: &str) -> Option<Severity>;

    /// The threshold `logger` would have if it inherited, ignoring its own
    /// setting. `None` if no such logger exists.
    fn inherited_level(&self, logger: &str) -> Option<Severity>;

    fn set_level(&self, logger: &str, level: LevelSetting) -> Result<(), RegistryError>;

    fn loggers(&self) -> Vec<LoggerInfo>;

    fn contains(&self, logger: &str) -> bool {
        self.level(logger).is_some()
    }
}

type FilterSink = Box<dyn Fn(Targets) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone)]
struct RegistryState {
    root: Severity,
    levels: BTreeMap<String, LevelSetting>,
}

impl RegistryState {
    fn setting(&self, logger: &str) -> Option<LevelSetting> {
        if logger == ROOT_LOGGER {
            return Some(LevelSetting::Explicit(self.root));
        }
        self.levels.get(logger).copied()
    }

    fn effective(&self, logger: &str) -> Severity {
        match self.setting(logger) {
            Some(LevelSetting::Explicit(level)) => level,
            _ => self.inherited(logger),
        }
    }

    // Same matching as `Targets`: longest explicit string prefix, then root.
    fn inherited(&self, logger: &str) -> Severity {
        if logger == ROOT_LOGGER {
            return self.root;
        }
        self.levels
            .iter()
            .filter(|(name, _)| name.as_str() != logger && logger.starts_with(name.as_str()))
            .filter_map(|(name, setting)| setting.explicit().map(|level| (name.len(), level)))
            .max_by_key(|(len, _)| *len)
            .map_or(self.root, |(_, level)| level)
    }

    fn targets(&self) -> Targets {
        self.levels
            .iter()
            .filter_map(|(name, setting)| setting.explicit().map(|level| (name, level)))
            .fold(
                Targets::new().with_default(LevelFilter::from(self.root)),
                |targets, (name, level)| targets.with_target(name.clone(), LevelFilter::from(level)),
            )
    }
}

/// Registry of `tracing` targets backed by a reloadable [`Targets`] filter.
pub struct TargetRegistry {
    state: RwLock<RegistryState>,
    sink: Option<FilterSink>,
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("state", &self.state)
            .field("reloadable", &self.sink.is_some())
            .finish()
    }
}

impl TargetRegistry {
    /// Create a registry whose only logger is `root` at `root_level`.
    pub fn new(root_level: Severity) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                root: root_level,
                levels: BTreeMap::new(),
            }),
            sink: None,
        }
    }

    /// Seed a registry from a parsed filter such as `info,app::db=debug`.
    ///
    /// Every target named in the filter becomes a known logger with an
    /// explicit level.
    pub fn from_targets(targets: &Targets) -> Self {
        let root = targets
            .default_level()
            .map(Severity::from)
            .unwrap_or(Severity::Off);
        let levels = targets
            .iter()
            .map(|(name, filter)| (name.to_string(), LevelSetting::Explicit(filter.into())))
            .collect();
        Self {
            state: RwLock::new(RegistryState { root, levels }),
            sink: None,
        }
    }

    /// Push every future filter change through `sink`.
    pub fn with_filter_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(Targets) -> Result<(), String> + Send + Sync + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Make `logger` known to the registry. An already known logger keeps its
    /// current setting.
    pub fn declare(&self, logger: &str, level: LevelSetting) -> Result<(), RegistryError> {
        if logger == ROOT_LOGGER {
            return Ok(());
        }
        self.update(|state| {
            state.levels.entry(logger.to_string()).or_insert(level);
            Ok(())
        })
    }

    /// The filter matching the registry's current state.
    pub fn targets(&self) -> Targets {
        self.read().targets()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    // Applies `change` to a copy, reloads the filter, then commits. The write
    // lock is held throughout so filter and registry never diverge.
    fn update(
        &self,
        change: impl FnOnce(&mut RegistryState) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        change(&mut next)?;
        if let Some(sink) = &self.sink {
            sink(next.targets()).map_err(RegistryError::Reload)?;
        }
        *guard = next;
        Ok(())
    }
}

impl LoggerRegistry for TargetRegistry {
    fn level(&self, logger: &str) -> Option<LevelSetting> {
        self.read().setting(logger)
    }

    fn effective_level(&self, logger: &str) -> Option<Severity> {
        let state = self.read();
        state.setting(logger).map(|_| state.effective(logger))
    }

    fn inherited_level(&self, logger: &str) -> Option<Severity> {
        let state = self.read();
        state.setting(logger).map(|_| state.inherited(logger))
    }

    fn set_level(&self, logger: &str, level: LevelSetting) -> Result<(), RegistryError> {
        self.update(|state| {
            if logger == ROOT_LOGGER {
                match level {
                    LevelSetting::Explicit(severity) => state.root = severity,
                    LevelSetting::Inherited => return Err(RegistryError::RootCannotInherit),
                }
                return Ok(());
            }
            match state.levels.get_mut(logger) {
                Some(slot) => {
                    *slot = level;
                    Ok(())
                }
                None => Err(RegistryError::UnknownLogger(logger.to_string())),
            }
        })
    }

    fn loggers(&self) -> Vec<LoggerInfo> {
        let state = self.read();
        std::iter::once(ROOT_LOGGER)
            .chain(state.levels.keys().map(String::as_str))
            .filter_map(|name| {
                state.setting(name).map(|configured_level| LoggerInfo {
                    name: name.to_string(),
                    configured_level,
                    effective_level: state.effective(name),
                })
            })
            .collect()
    }
}
