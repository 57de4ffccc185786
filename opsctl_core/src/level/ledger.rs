//! Active overrides, keyed by logger name.

use super::{
    scheduler::ReversionHandle,
    severity::{LevelSetting, Severity},
};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use uuid::Uuid;

/// One active override of a logger's threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub logger: String,
    /// The logger's setting before the first override in the current chain.
    pub original_level: LevelSetting,
    /// Effective level that `original_level` resolved to when the chain began.
    pub baseline: Severity,
    pub current_level: Severity,
    pub scheduled_expiry: DateTime<Utc>,
    pub modification_key: Uuid,
    pub created_at: DateTime<Utc>,
}

impl OverrideRecord {
    /// Milliseconds until expiry at `now`. Negative while an expiry is racing.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.scheduled_expiry - now).num_milliseconds()
    }
}

/// An override together with its computed remaining time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationView {
    #[serde(flatten)]
    pub record: OverrideRecord,
    pub remaining_ms: i64,
}

/// Describes a completed restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredRecord {
    pub logger: String,
    pub restored_level: LevelSetting,
    pub effective_level: Severity,
    pub modification_key: Uuid,
}

/// A ledger slot: the record plus the handle that cancels its reversion.
#[derive(Debug)]
pub struct LedgerEntry {
    pub record: OverrideRecord,
    pub reversion: ReversionHandle,
}

/// Concurrent map of active overrides.
///
/// Backed by a sharded `DashMap`, so operations on different loggers rarely
/// share a lock. [`Ledger::entry`] holds the shard lock for one logger, which
/// is how the engine linearizes set/reset/expiry on that logger. Callers must
/// never touch a second key while holding an entry.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: DashMap<String, LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, logger: &str) -> Entry<'_, String, LedgerEntry> {
        self.entries.entry(logger.to_string())
    }

    pub fn get(&self, logger: &str) -> Option<OverrideRecord> {
        self.entries.get(logger).map(|entry| entry.record.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Logger names with an active override, sorted.
    pub fn loggers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Copy of every active record, sorted by logger name.
    pub fn snapshot(&self) -> Vec<OverrideRecord> {
        let mut records: Vec<OverrideRecord> =
            self.entries.iter().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.logger.cmp(&b.logger));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_util::sync::CancellationToken;

    fn record(logger: &str, now: DateTime<Utc>) -> OverrideRecord {
        OverrideRecord {
            logger: logger.to_string(),
            original_level: LevelSetting::Inherited,
            baseline: Severity::Info,
            current_level: Severity::Debug,
            scheduled_expiry: now + Duration::seconds(30),
            modification_key: Uuid::new_v4(),
            created_at: now,
        }
    }

    fn insert(ledger: &Ledger, record: OverrideRecord) {
        let logger = record.logger.clone();
        ledger.entry(&logger).insert(LedgerEntry {
            record,
            reversion: ReversionHandle::new(CancellationToken::new()),
        });
    }

    #[test]
    fn snapshot_is_sorted_by_logger() {
        let ledger = Ledger::new();
        let now = Utc::now();
        insert(&ledger, record("zeta", now));
        insert(&ledger, record("alpha", now));

        let names: Vec<_> = ledger.snapshot().into_iter().map(|r| r.logger).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(ledger.loggers(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn insert_replaces_whole_entry() {
        let ledger = Ledger::new();
        let now = Utc::now();
        let first = record("app", now);
        let second = record("app", now);
        insert(&ledger, first);
        insert(&ledger, second.clone());

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("app"), Some(second));
    }

    #[test]
    fn remaining_time_goes_negative_after_expiry() {
        let now = Utc::now();
        let record = record("app", now);
        assert_eq!(record.remaining_ms(now), 30_000);
        assert!(record.remaining_ms(now + Duration::seconds(31)) < 0);
    }

    #[test]
    fn view_flattens_record_fields() {
        let now = Utc::now();
        let view = ModificationView {
            record: record("app", now),
            remaining_ms: 1234,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["logger"], "app");
        assert_eq!(json["remainingMs"], 1234);
        assert_eq!(json["originalLevel"], "INHERITED");
        assert!(json["modificationKey"].is_string());
    }
}
