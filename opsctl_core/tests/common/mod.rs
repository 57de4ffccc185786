//! Shared fixtures for opsctl_core integration tests.

#![allow(dead_code)]

use opsctl_core::error::RegistryError;
use opsctl_core::level::{
    LevelOverrides, LevelSetting, LoggerInfo, LoggerRegistry, ReversionHandle, ReversionScheduler,
    ReversionTask, Severity, TargetRegistry, TokioScheduler,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Registry with `root=INFO`, `app=WARN`, `app::db=DEBUG` and an inheriting
/// `app::http`.
pub fn sample_registry() -> TargetRegistry {
    let targets = "info,app=warn,app::db=debug".parse().unwrap();
    let registry = TargetRegistry::from_targets(&targets);
    registry.declare("app::http", LevelSetting::Inherited).unwrap();
    registry
        .declare("service", LevelSetting::Explicit(Severity::Info))
        .unwrap();
    registry
}

pub fn tokio_engine() -> (LevelOverrides, Arc<TargetRegistry>) {
    let registry = Arc::new(sample_registry());
    let engine = LevelOverrides::new(registry.clone(), Arc::new(TokioScheduler::current()));
    (engine, registry)
}

pub fn manual_engine() -> (LevelOverrides, Arc<TargetRegistry>, Arc<ManualScheduler>) {
    let registry = Arc::new(sample_registry());
    let scheduler = Arc::new(ManualScheduler::default());
    let engine = LevelOverrides::new(registry.clone(), scheduler.clone());
    (engine, registry, scheduler)
}

struct Scheduled {
    delay: Duration,
    token: CancellationToken,
    task: Option<ReversionTask>,
}

/// Records scheduled reversions and runs them only when told to.
#[derive(Default)]
pub struct ManualScheduler {
    scheduled: Mutex<Vec<Scheduled>>,
}

impl ManualScheduler {
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }

    /// Tasks that were neither cancelled nor run.
    pub fn pending(&self) -> usize {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.task.is_some() && !s.token.is_cancelled())
            .count()
    }

    pub fn delay(&self, index: usize) -> Duration {
        self.scheduled.lock().unwrap()[index].delay
    }

    pub fn is_cancelled(&self, index: usize) -> bool {
        self.scheduled.lock().unwrap()[index].token.is_cancelled()
    }

    /// Run task `index` the way a timer would: only if not cancelled.
    pub fn fire(&self, index: usize) -> bool {
        let task = {
            let mut scheduled = self.scheduled.lock().unwrap();
            let entry = &mut scheduled[index];
            if entry.token.is_cancelled() {
                return false;
            }
            entry.task.take()
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run task `index` even if it was cancelled, as if the timer had already
    /// started when the cancellation arrived.
    pub fn fire_in_flight(&self, index: usize) {
        let task = self.scheduled.lock().unwrap()[index].task.take();
        if let Some(task) = task {
            task();
        }
    }
}

impl ReversionScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ReversionTask) -> ReversionHandle {
        let token = CancellationToken::new();
        self.scheduled.lock().unwrap().push(Scheduled {
            delay,
            token: token.clone(),
            task: Some(task),
        });
        ReversionHandle::new(token)
    }
}

/// Wraps a registry and fails every write while `failing` is set.
pub struct FlakyRegistry {
    pub inner: TargetRegistry,
    pub failing: AtomicBool,
}

impl FlakyRegistry {
    pub fn new(inner: TargetRegistry) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl LoggerRegistry for FlakyRegistry {
    fn level(&self, logger: &str) -> Option<LevelSetting> {
        self.inner.level(logger)
    }

    fn effective_level(&self, logger: &str) -> Option<Severity> {
        self.inner.effective_level(logger)
    }

    fn inherited_level(&self, logger: &str) -> Option<Severity> {
        self.inner.inherited_level(logger)
    }

    fn set_level(&self, logger: &str, level: LevelSetting) -> Result<(), RegistryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Reload("subscriber unavailable".into()));
        }
        self.inner.set_level(logger, level)
    }

    fn loggers(&self) -> Vec<LoggerInfo> {
        self.inner.loggers()
    }
}
