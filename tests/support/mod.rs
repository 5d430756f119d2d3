#![allow(dead_code)]

use serde_json::Value;
use undo_ledger::{DataStore, EntityKind, MemoryStore, Record, StoreError};

pub fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

/// Memory store that rejects every write touching one of `fail_ids`.
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_ids: Vec<&'static str>,
}

impl FailingStore {
    fn check(&self, id: &str) -> Result<(), StoreError> {
        if self.fail_ids.iter().any(|f| *f == id) {
            return Err(StoreError::Rejected(format!("{} is read-only", id)));
        }
        Ok(())
    }
}

impl DataStore for FailingStore {
    fn create(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        self.check(id)?;
        self.inner.create(kind, scope, id, data)
    }

    fn update(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        self.check(id)?;
        self.inner.update(kind, scope, id, data)
    }

    fn delete(&self, kind: EntityKind, scope: Option<&str>, id: &str) -> Result<(), StoreError> {
        self.check(id)?;
        self.inner.delete(kind, scope, id)
    }
}
