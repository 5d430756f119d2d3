//! Reversible commands over ledger records.
//!
//! Every command captures the full snapshots it needs, so `undo` never has to
//! look anything up. Store failures stop at this boundary: they are logged and
//! turned into `false`.

use crate::error::{DecodeError, StoreError};
use crate::storage::{EntityKind, Record, StoreHandle};
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use tracing::{error, info};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest free-text label kept in a description before it is cut.
pub const LABEL_LIMIT: usize = 30;

pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A reversible operation that can live on the history stacks.
pub trait Command: Send + Sync {
    /// Tag identifying the concrete variant (`CreateAccount`, `Batch`, ...).
    fn tag(&self) -> String;

    fn timestamp(&self) -> &str;

    fn is_batch(&self) -> bool {
        false
    }

    fn execute(&self) -> bool;

    fn undo(&self) -> bool;

    fn redo(&self) -> bool {
        self.execute()
    }

    fn describe(&self) -> String;

    fn serialize(&self) -> SerializedCommand;

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("tag", &self.tag())
            .field("timestamp", &self.timestamp())
            .field("description", &self.describe())
            .finish()
    }
}

/// Persisted form of a command: the tag, the timestamp, then variant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCommand {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default = "now_timestamp")]
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SerializedCommand {
    pub fn new(tag: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            timestamp: timestamp.into(),
            fields: Map::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(self.tag.clone()));
        object.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.clone()),
        );
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::malformed("<untyped>", "missing \"type\""))?;
        serde_json::from_value(value.clone()).map_err(|e| DecodeError::malformed(tag, e))
    }

    /// Decode the variant fields into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| DecodeError::malformed(&self.tag, e))
    }

    fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        if let Ok(Value::Object(fields)) = serde_json::to_value(payload) {
            self.fields = fields;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Create, Action::Update, Action::Delete];

    pub fn verb(self) -> &'static str {
        match self {
            Action::Create => "Create",
            Action::Update => "Update",
            Action::Delete => "Delete",
        }
    }
}

pub fn entity_tag(action: Action, kind: EntityKind) -> String {
    format!("{}{}", action.verb(), kind.name())
}

/// Split a tag such as `UpdateBudget` into its action and entity kind.
pub fn parse_entity_tag(tag: &str) -> Option<(Action, EntityKind)> {
    Action::ALL.into_iter().find_map(|action| {
        let rest = tag.strip_prefix(action.verb())?;
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.name() == rest)
            .map(|kind| (action, kind))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityOp {
    Create { data: Record },
    Update { old_data: Record, new_data: Record },
    Delete { snapshot: Record },
}

impl EntityOp {
    pub fn action(&self) -> Action {
        match self {
            EntityOp::Create { .. } => Action::Create,
            EntityOp::Update { .. } => Action::Update,
            EntityOp::Delete { .. } => Action::Delete,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CreateFields {
    entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope_id: Option<String>,
    data: Record,
}

#[derive(Serialize, Deserialize)]
struct UpdateFields {
    entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope_id: Option<String>,
    old_data: Record,
    new_data: Record,
}

#[derive(Serialize, Deserialize)]
struct DeleteFields {
    entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope_id: Option<String>,
    snapshot: Record,
}

/// Create, update or delete of one record of one entity kind.
pub struct EntityCommand {
    kind: EntityKind,
    entity_id: String,
    scope_id: Option<String>,
    op: EntityOp,
    timestamp: String,
    store: StoreHandle,
}

impl EntityCommand {
    pub fn create(
        store: StoreHandle,
        kind: EntityKind,
        scope_id: Option<&str>,
        entity_id: impl Into<String>,
        data: Record,
    ) -> Self {
        Self::new(store, kind, scope_id, entity_id, EntityOp::Create { data })
    }

    pub fn update(
        store: StoreHandle,
        kind: EntityKind,
        scope_id: Option<&str>,
        entity_id: impl Into<String>,
        old_data: Record,
        new_data: Record,
    ) -> Self {
        Self::new(
            store,
            kind,
            scope_id,
            entity_id,
            EntityOp::Update { old_data, new_data },
        )
    }

    pub fn delete(
        store: StoreHandle,
        kind: EntityKind,
        scope_id: Option<&str>,
        entity_id: impl Into<String>,
        snapshot: Record,
    ) -> Self {
        Self::new(store, kind, scope_id, entity_id, EntityOp::Delete { snapshot })
    }

    fn new(
        store: StoreHandle,
        kind: EntityKind,
        scope_id: Option<&str>,
        entity_id: impl Into<String>,
        op: EntityOp,
    ) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            scope_id: scope_id.map(str::to_string),
            op,
            timestamp: now_timestamp(),
            store,
        }
    }

    /// Rebuild a command from its persisted form, keeping the stored timestamp.
    pub fn decode(
        action: Action,
        kind: EntityKind,
        entry: &SerializedCommand,
        store: StoreHandle,
    ) -> Result<Self, DecodeError> {
        let (entity_id, scope_id, op) = match action {
            Action::Create => {
                let f: CreateFields = entry.payload()?;
                (f.entity_id, f.scope_id, EntityOp::Create { data: f.data })
            }
            Action::Update => {
                let f: UpdateFields = entry.payload()?;
                (
                    f.entity_id,
                    f.scope_id,
                    EntityOp::Update {
                        old_data: f.old_data,
                        new_data: f.new_data,
                    },
                )
            }
            Action::Delete => {
                let f: DeleteFields = entry.payload()?;
                (f.entity_id, f.scope_id, EntityOp::Delete { snapshot: f.snapshot })
            }
        };

        if kind.is_scoped() && scope_id.is_none() {
            return Err(DecodeError::malformed(&entry.tag, "missing \"scope_id\""));
        }

        Ok(Self {
            kind,
            entity_id,
            scope_id,
            op,
            timestamp: entry.timestamp.clone(),
            store,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn action(&self) -> Action {
        self.op.action()
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn op(&self) -> &EntityOp {
        &self.op
    }

    fn scope(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    fn apply_forward(&self) -> Result<(), StoreError> {
        let store = &self.store;
        match &self.op {
            EntityOp::Create { data } => store.create(self.kind, self.scope(), &self.entity_id, data),
            EntityOp::Update { new_data, .. } => {
                store.update(self.kind, self.scope(), &self.entity_id, new_data)
            }
            EntityOp::Delete { .. } => store.delete(self.kind, self.scope(), &self.entity_id),
        }
    }

    fn apply_inverse(&self) -> Result<(), StoreError> {
        let store = &self.store;
        match &self.op {
            EntityOp::Create { .. } => store.delete(self.kind, self.scope(), &self.entity_id),
            EntityOp::Update { old_data, .. } => {
                store.update(self.kind, self.scope(), &self.entity_id, old_data)
            }
            EntityOp::Delete { snapshot } => {
                store.create(self.kind, self.scope(), &self.entity_id, snapshot)
            }
        }
    }

    // Record the description is derived from: the snapshot that identifies the
    // record before the change.
    fn label_source(&self) -> &Record {
        match &self.op {
            EntityOp::Create { data } => data,
            EntityOp::Update { old_data, .. } => old_data,
            EntityOp::Delete { snapshot } => snapshot,
        }
    }
}

impl Command for EntityCommand {
    fn tag(&self) -> String {
        entity_tag(self.action(), self.kind)
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn execute(&self) -> bool {
        match self.apply_forward() {
            Ok(()) => {
                info!(tag = %self.tag(), entity_id = %self.entity_id, "applied");
                true
            }
            Err(e) => {
                error!(tag = %self.tag(), entity_id = %self.entity_id, error = %e, "apply failed");
                false
            }
        }
    }

    fn undo(&self) -> bool {
        match self.apply_inverse() {
            Ok(()) => {
                info!(tag = %self.tag(), entity_id = %self.entity_id, "reverted");
                true
            }
            Err(e) => {
                error!(tag = %self.tag(), entity_id = %self.entity_id, error = %e, "revert failed");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} {}: {}",
            self.action().verb(),
            self.kind.label(),
            record_label(self.kind, self.label_source())
        )
    }

    fn serialize(&self) -> SerializedCommand {
        let entry = SerializedCommand::new(self.tag(), self.timestamp.clone());
        let entity_id = self.entity_id.clone();
        let scope_id = self.scope_id.clone();
        match &self.op {
            EntityOp::Create { data } => entry.with_payload(&CreateFields {
                entity_id,
                scope_id,
                data: data.clone(),
            }),
            EntityOp::Update { old_data, new_data } => entry.with_payload(&UpdateFields {
                entity_id,
                scope_id,
                old_data: old_data.clone(),
                new_data: new_data.clone(),
            }),
            EntityOp::Delete { snapshot } => entry.with_payload(&DeleteFields {
                entity_id,
                scope_id,
                snapshot: snapshot.clone(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Human label of a record, read from the first field present for its kind.
pub fn record_label(kind: EntityKind, record: &Record) -> String {
    let keys: &[&str] = match kind {
        EntityKind::Transaction => &["descripcion", "concepto", "description"],
        EntityKind::Account | EntityKind::Category => &["nombre", "name"],
        EntityKind::Budget => &["categoria_nombre", "categoria_id", "category"],
    };
    let text = keys
        .iter()
        .find_map(|key| record.get(*key).and_then(value_text))
        .unwrap_or_default();

    // transaction descriptions are free text
    if kind == EntityKind::Transaction {
        truncate_label(&text, LABEL_LIMIT)
    } else {
        text
    }
}

pub fn truncate_label(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DataStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn memory() -> (MemoryStore, StoreHandle) {
        let store = MemoryStore::new();
        let handle: StoreHandle = Arc::new(store.clone());
        (store, handle)
    }

    #[test]
    fn test_tags() {
        assert_eq!(entity_tag(Action::Create, EntityKind::Transaction), "CreateTransaction");
        assert_eq!(entity_tag(Action::Delete, EntityKind::Budget), "DeleteBudget");
        assert_eq!(
            parse_entity_tag("UpdateCategory"),
            Some((Action::Update, EntityKind::Category))
        );
        assert_eq!(parse_entity_tag("CreateWidgetXYZ"), None);
        assert_eq!(parse_entity_tag("Batch"), None);
    }

    #[test]
    fn test_create_inverse_and_redo() {
        let (store, handle) = memory();
        let cmd = EntityCommand::create(
            handle,
            EntityKind::Account,
            None,
            "A1",
            record(json!({"nombre": "Caja"})),
        );

        assert!(cmd.execute());
        assert!(store.contains(EntityKind::Account, None, "A1"));
        assert!(cmd.undo());
        assert!(store.is_empty());
        assert!(cmd.redo());
        assert!(store.contains(EntityKind::Account, None, "A1"));
    }

    #[test]
    fn test_update_restores_old_snapshot() {
        let (store, handle) = memory();
        let old = record(json!({"nombre": "Comida", "tipo": "gasto"}));
        let new = record(json!({"nombre": "Alimentos", "tipo": "gasto"}));
        store.create(EntityKind::Category, None, "C1", &old).unwrap();
        let before = store.snapshot().unwrap();

        let cmd = EntityCommand::update(handle, EntityKind::Category, None, "C1", old, new.clone());
        assert!(cmd.execute());
        assert_eq!(store.get(EntityKind::Category, None, "C1").unwrap(), Some(new));
        assert!(cmd.undo());
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_delete_resurrects_snapshot() {
        let (store, handle) = memory();
        let snapshot = record(json!({"categoria_id": "C1", "monto": 500}));
        store
            .create(EntityKind::Budget, Some("P1"), "B1", &snapshot)
            .unwrap();
        let before = store.snapshot().unwrap();

        let cmd = EntityCommand::delete(handle, EntityKind::Budget, Some("P1"), "B1", snapshot);
        assert!(cmd.execute());
        assert!(!store.contains(EntityKind::Budget, Some("P1"), "B1"));
        assert!(cmd.undo());
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_undo_create_of_removed_record() {
        let (store, handle) = memory();
        let cmd = EntityCommand::create(
            handle,
            EntityKind::Category,
            None,
            "C1",
            record(json!({"nombre": "Comida"})),
        );
        assert!(cmd.execute());
        store.delete(EntityKind::Category, None, "C1").unwrap();
        assert!(cmd.undo());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_failure_returns_false() {
        let (_store, handle) = memory();
        let cmd = EntityCommand::update(
            handle.clone(),
            EntityKind::Category,
            None,
            "missing",
            record(json!({"nombre": "x"})),
            record(json!({"nombre": "y"})),
        );
        assert!(!cmd.execute());

        // scoped kind without a scope never reaches the records
        let cmd = EntityCommand::create(
            handle,
            EntityKind::Transaction,
            None,
            "T1",
            record(json!({"descripcion": "x"})),
        );
        assert!(!cmd.execute());
    }

    #[test]
    fn test_describe_labels() {
        let (_store, handle) = memory();
        let cmd = EntityCommand::create(
            handle.clone(),
            EntityKind::Account,
            None,
            "A1",
            record(json!({"nombre": "Caja"})),
        );
        assert_eq!(cmd.describe(), "Create account: Caja");

        let cmd = EntityCommand::update(
            handle.clone(),
            EntityKind::Budget,
            Some("P1"),
            "B1",
            record(json!({"categoria_id": "C9"})),
            record(json!({"categoria_nombre": "Viajes"})),
        );
        assert_eq!(cmd.describe(), "Update budget: C9");

        let cmd = EntityCommand::delete(
            handle,
            EntityKind::Transaction,
            Some("P1"),
            "T1",
            record(json!({"concepto": "Pago de nómina correspondiente a marzo 2024"})),
        );
        assert_eq!(
            cmd.describe(),
            "Delete transaction: Pago de nómina correspondiente..."
        );
    }

    #[test]
    fn test_truncate_label_counts_chars() {
        assert_eq!(truncate_label("ñandú", 3), "ñan...");
        assert_eq!(truncate_label("short", 30), "short");
        assert_eq!(truncate_label(&"x".repeat(30), 30), "x".repeat(30));
    }

    #[test]
    fn test_serialize_shape() {
        let (_store, handle) = memory();
        let cmd = EntityCommand::update(
            handle,
            EntityKind::Transaction,
            Some("P1"),
            "T1",
            record(json!({"monto": 1})),
            record(json!({"monto": 2})),
        );
        let value = cmd.serialize().to_value();

        assert_eq!(value["type"], "UpdateTransaction");
        assert_eq!(value["timestamp"], cmd.timestamp());
        assert_eq!(value["entity_id"], "T1");
        assert_eq!(value["scope_id"], "P1");
        assert_eq!(value["old_data"], json!({"monto": 1}));
        assert_eq!(value["new_data"], json!({"monto": 2}));
    }

    #[test]
    fn test_unscoped_entries_omit_scope() {
        let (_store, handle) = memory();
        let cmd = EntityCommand::create(handle, EntityKind::Account, None, "A1", Record::new());
        let value = cmd.serialize().to_value();
        assert!(value.get("scope_id").is_none());
    }

    #[test]
    fn test_decode_keeps_timestamp() {
        let (_store, handle) = memory();
        let entry = SerializedCommand::from_value(&json!({
            "type": "DeleteAccount",
            "timestamp": "2024-01-02 03:04:05",
            "entity_id": "A1",
            "snapshot": {"nombre": "Caja"}
        }))
        .unwrap();

        let cmd = EntityCommand::decode(Action::Delete, EntityKind::Account, &entry, handle).unwrap();
        assert_eq!(cmd.timestamp(), "2024-01-02 03:04:05");
        assert_eq!(cmd.entity_id(), "A1");
        assert_eq!(cmd.describe(), "Delete account: Caja");
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let (_store, handle) = memory();
        let entry = SerializedCommand::from_value(&json!({
            "type": "UpdateAccount",
            "timestamp": "2024-01-02 03:04:05",
            "entity_id": "A1",
            "old_data": {}
        }))
        .unwrap();
        assert!(matches!(
            EntityCommand::decode(Action::Update, EntityKind::Account, &entry, handle.clone()),
            Err(DecodeError::Malformed { .. })
        ));

        let entry = SerializedCommand::from_value(&json!({
            "type": "CreateTransaction",
            "timestamp": "2024-01-02 03:04:05",
            "entity_id": "T1",
            "data": {}
        }))
        .unwrap();
        assert!(matches!(
            EntityCommand::decode(Action::Create, EntityKind::Transaction, &entry, handle),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
