use crate::storage::{DataStore, EntityKind, Record, RecordKey, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreDocument {
    // collection path -> record id -> record
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, Record>>,
}

/// Data store kept in a single JSON file, rewritten after every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreDocument>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreDocument::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            StoreDocument::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
    ) -> Result<Option<Record>, StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state
            .collections
            .get(&key.collection_path())
            .and_then(|records| records.get(&key.id))
            .cloned())
    }

    /// All records of one collection, ordered by id.
    pub fn list(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        let key = RecordKey::new(kind, scope, "")?;
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("list"))?;
        Ok(state
            .collections
            .get(&key.collection_path())
            .map(|records| {
                records
                    .iter()
                    .map(|(id, record)| (id.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    // Applies `f` to a copy and only swaps it in once the file write succeeded,
    // so memory and disk never disagree. `f` returns whether anything changed.
    fn mutate<F>(&self, op: &'static str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<bool, StoreError>,
    {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned(op))?;
        let mut next = state.clone();
        if !f(&mut next)? {
            debug!(op, path = %self.path.display(), "nothing to write");
            return Ok(());
        }
        self.persist(&next)?;
        *state = next;
        debug!(op, path = %self.path.display(), "store file rewritten");
        Ok(())
    }

    fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.path, &content)?;
        Ok(())
    }
}

/// Replace `path` with `contents` through a temp file in the same directory, so
/// readers see either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

impl DataStore for JsonFileStore {
    fn create(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        self.mutate("create", |doc| {
            doc.collections
                .entry(key.collection_path())
                .or_default()
                .insert(key.id.clone(), data.clone());
            Ok(true)
        })
    }

    fn update(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        id: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        self.mutate("update", |doc| {
            match doc
                .collections
                .get_mut(&key.collection_path())
                .and_then(|records| records.get_mut(&key.id))
            {
                Some(existing) => {
                    *existing = data.clone();
                    Ok(true)
                }
                None => Err(StoreError::NotFound {
                    kind,
                    id: key.id.clone(),
                }),
            }
        })
    }

    fn delete(&self, kind: EntityKind, scope: Option<&str>, id: &str) -> Result<(), StoreError> {
        let key = RecordKey::new(kind, scope, id)?;
        self.mutate("delete", |doc| {
            let path = key.collection_path();
            let removed = doc
                .collections
                .get_mut(&path)
                .and_then(|records| records.remove(&key.id));
            if removed.is_none() {
                return Ok(false);
            }
            if doc.collections.get(&path).is_some_and(|r| r.is_empty()) {
                doc.collections.remove(&path);
            }
            Ok(true)
        })
    }
}
