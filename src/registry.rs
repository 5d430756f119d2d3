use crate::batch::{BatchCommand, BATCH_TAG};
use crate::command::{entity_tag, Action, Command, EntityCommand, SerializedCommand};
use crate::error::DecodeError;
use crate::storage::{EntityKind, StoreHandle};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Rebuilds one command from its persisted entry. Gets the registry so composite
/// commands can decode their children.
pub type CommandFactory = Box<
    dyn Fn(&SerializedCommand, &CommandRegistry, &StoreHandle) -> Result<Box<dyn Command>, DecodeError>
        + Send
        + Sync,
>;

/// Tag -> factory lookup used when history is read back from disk.
#[derive(Default)]
pub struct CommandRegistry {
    factories: HashMap<String, CommandFactory>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing every entity command plus `Batch`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in EntityKind::ALL {
            for action in Action::ALL {
                registry.register(entity_tag(action, kind), move |entry, _, store| {
                    let cmd = EntityCommand::decode(action, kind, entry, store.clone())?;
                    Ok(Box::new(cmd) as Box<dyn Command>)
                });
            }
        }
        registry.register(BATCH_TAG, decode_batch);
        registry
    }

    /// Add a factory, replacing any previous one for the same tag.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&SerializedCommand, &CommandRegistry, &StoreHandle) -> Result<Box<dyn Command>, DecodeError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(tag.into(), Box::new(factory));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn decode(&self, value: &Value, store: &StoreHandle) -> Result<Box<dyn Command>, DecodeError> {
        let entry = SerializedCommand::from_value(value)?;
        self.decode_entry(&entry, store)
    }

    pub fn decode_entry(
        &self,
        entry: &SerializedCommand,
        store: &StoreHandle,
    ) -> Result<Box<dyn Command>, DecodeError> {
        let factory = self
            .factories
            .get(&entry.tag)
            .ok_or_else(|| DecodeError::UnknownTag(entry.tag.clone()))?;
        factory(entry, self, store)
    }

    /// Decode a list of entries, dropping the ones that cannot be rebuilt.
    pub fn decode_all(&self, values: &[Value], store: &StoreHandle) -> Vec<Box<dyn Command>> {
        values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| match self.decode(value, store) {
                Ok(cmd) => Some(cmd),
                Err(e) => {
                    warn!(index, error = %e, "skipping history entry");
                    None
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct BatchFields {
    #[serde(default = "default_batch_description")]
    batch_description: String,
    #[serde(default)]
    commands: Vec<Value>,
}

fn default_batch_description() -> String {
    BATCH_TAG.to_string()
}

fn decode_batch(
    entry: &SerializedCommand,
    registry: &CommandRegistry,
    store: &StoreHandle,
) -> Result<Box<dyn Command>, DecodeError> {
    let fields: BatchFields = entry.payload()?;
    let commands = registry.decode_all(&fields.commands, store);
    let batch = BatchCommand::new(commands, fields.batch_description)
        .with_timestamp(entry.timestamp.clone());
    Ok(Box::new(batch))
}
