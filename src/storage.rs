use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

pub use crate::error::StoreError;

/// Full field map of a stored record (a snapshot).
pub type Record = Map<String, Value>;

/// Shared handle commands use to reach the data store.
pub type StoreHandle = Arc<dyn DataStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Transaction,
    Account,
    Category,
    Budget,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Transaction,
        EntityKind::Account,
        EntityKind::Category,
        EntityKind::Budget,
    ];

    /// Name used inside command tags (`CreateTransaction`, ...).
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Transaction => "Transaction",
            EntityKind::Account => "Account",
            EntityKind::Category => "Category",
            EntityKind::Budget => "Budget",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Transaction => "transaction",
            EntityKind::Account => "account",
            EntityKind::Category => "category",
            EntityKind::Budget => "budget",
        }
    }

    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Transaction => "transactions",
            EntityKind::Account => "accounts",
            EntityKind::Category => "categories",
            EntityKind::Budget => "budgets",
        }
    }

    /// Transactions and budgets live under a project and need its id to be addressed.
    pub fn is_scoped(self) -> bool {
        matches!(self, EntityKind::Transaction | EntityKind::Budget)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| lower == kind.label() || lower == kind.collection())
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// Backend that durably holds the records commands mutate.
///
/// `create` is an upsert. `update` replaces the whole record and fails when it is
/// absent. `delete` of an absent record succeeds: the record is gone either way.
/// Commands always carry full snapshots, so replacement keeps undo exact.
pub trait DataStore: Send + Sync {
    fn create(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError>;

    fn update(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError>;

    fn delete(&self, kind: EntityKind, scope: Option<&str>, id: &str) -> Result<(), StoreError>;
}

/// Address of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: EntityKind,
    pub scope: Option<String>,
    pub id: String,
}

impl RecordKey {
    /// Scope is required for scoped kinds and dropped for global ones.
    pub fn new(kind: EntityKind, scope: Option<&str>, id: &str) -> Result<Self, StoreError> {
        let scope = if kind.is_scoped() {
            Some(scope.ok_or(StoreError::MissingScope(kind))?.to_string())
        } else {
            None
        };
        Ok(Self {
            kind,
            scope,
            id: id.to_string(),
        })
    }

    /// Collection path, e.g. `accounts` or `projects/P1/transactions`.
    pub fn collection_path(&self) -> String {
        match &self.scope {
            Some(scope) => format!("projects/{}/{}", scope, self.kind.collection()),
            None => self.kind.collection().to_string(),
        }
    }
}

/// In-memory data store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
    ) -> Result<Option<Record>, StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(records.get(&key).cloned())
    }

    pub fn contains(&self, kind: EntityKind, scope: Option<&str>, id: &str) -> bool {
        matches!(self.get(kind, scope, id), Ok(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record, ordered by key. Used to compare whole-store state.
    pub fn snapshot(&self) -> Result<BTreeMap<RecordKey, Record>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned("snapshot"))?;
        Ok(records.clone())
    }
}

impl DataStore for MemoryStore {
    fn create(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned("create"))?;
        records.insert(key, data.clone());
        Ok(())
    }

    fn update(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned("update"))?;
        match records.get_mut(&key) {
            Some(existing) => {
                *existing = data.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            }),
        }
    }

    fn delete(&self, kind: EntityKind, scope: Option<&str>, id: &str) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned("delete"))?;
        records.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("account".parse::<EntityKind>().unwrap(), EntityKind::Account);
        assert_eq!("Budgets".parse::<EntityKind>().unwrap(), EntityKind::Budget);
        assert_eq!(
            " transaction ".parse::<EntityKind>().unwrap(),
            EntityKind::Transaction
        );
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_record_key_scope_rules() {
        let key = RecordKey::new(EntityKind::Account, Some("P1"), "A1").unwrap();
        assert_eq!(key.scope, None);
        assert_eq!(key.collection_path(), "accounts");

        let key = RecordKey::new(EntityKind::Transaction, Some("P1"), "T1").unwrap();
        assert_eq!(key.collection_path(), "projects/P1/transactions");

        assert!(matches!(
            RecordKey::new(EntityKind::Budget, None, "B1"),
            Err(StoreError::MissingScope(EntityKind::Budget))
        ));
    }

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryStore::new();
        let data = record(json!({"nombre": "Caja"}));

        store.create(EntityKind::Account, None, "A1", &data).unwrap();
        assert!(store.contains(EntityKind::Account, None, "A1"));

        let renamed = record(json!({"nombre": "Banco"}));
        store.update(EntityKind::Account, None, "A1", &renamed).unwrap();
        assert_eq!(
            store.get(EntityKind::Account, None, "A1").unwrap(),
            Some(renamed)
        );

        store.delete(EntityKind::Account, None, "A1").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_missing_records() {
        let store = MemoryStore::new();
        let data = record(json!({"nombre": "Caja"}));

        assert!(matches!(
            store.update(EntityKind::Category, None, "C1", &data),
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.delete(EntityKind::Category, None, "C1").is_ok());
        assert!(store.is_empty());
        assert!(matches!(
            store.create(EntityKind::Transaction, None, "T1", &data),
            Err(StoreError::MissingScope(EntityKind::Transaction))
        ));
    }

    #[test]
    fn test_scopes_are_isolated() {
        let store = MemoryStore::new();
        let data = record(json!({"monto": 10}));
        store
            .create(EntityKind::Transaction, Some("P1"), "T1", &data)
            .unwrap();

        assert!(store.contains(EntityKind::Transaction, Some("P1"), "T1"));
        assert!(!store.contains(EntityKind::Transaction, Some("P2"), "T1"));
    }
}
