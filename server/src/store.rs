use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use telemetry_shared::TelemetryRecord;

/// Latest telemetry record per device key.
///
/// Writes replace the whole record under the write lock, so a concurrent
/// reader sees either the old record or the new one and never a mix.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    records: RwLock<HashMap<String, TelemetryRecord>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, key: impl Into<String>, record: TelemetryRecord) {
        // a poisoned map still only holds complete records
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(key.into(), record);
    }

    pub fn lookup(&self, key: &str) -> Option<TelemetryRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
