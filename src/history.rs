//! Bounded undo/redo stacks with whole-document JSON persistence.
//!
//! ```text
//! execute(c4)      undo: [c1 c2 c3 c4]  redo: []
//! undo() x2        undo: [c1 c2]        redo: [c4 c3]
//! execute(c5)      undo: [c1 c2 c5]     redo: []      <- divergent action drops redo
//! ```
//!
//! Every successful mutation rewrites the history document. Store mutation and
//! document write are separate steps; a crash between them leaves the file one
//! step behind the store.

use crate::command::Command;
use crate::error::HistoryError;
use crate::registry::CommandRegistry;
use crate::storage::StoreHandle;
use crate::store_manager::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, info_span, Span};

pub const MIN_STACK_SIZE: usize = 10;
pub const MAX_STACK_SIZE: usize = 100;
pub const DEFAULT_STACK_SIZE: usize = 25;

pub fn clamp_stack_size(size: usize) -> usize {
    size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE)
}

/// Asked before a batch is undone or redone; `false` cancels.
pub type ConfirmHook<'a> = &'a mut dyn FnMut(&str) -> bool;

/// Where the history document lives. Reads and writes are always whole documents.
pub trait HistoryPersistence: Send {
    /// `None` when no document has been written yet.
    fn read(&self) -> Result<Option<String>, HistoryError>;

    fn write(&self, document: &str) -> Result<(), HistoryError>;
}

/// History document on disk, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryPersistence for JsonFilePersistence {
    fn read(&self) -> Result<Option<String>, HistoryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn write(&self, document: &str) -> Result<(), HistoryError> {
        write_atomic(&self.path, document.as_bytes())?;
        Ok(())
    }
}

/// In-memory document buffer. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    buffer: Arc<Mutex<Option<String>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Some(document.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.buffer.lock().ok().and_then(|b| b.clone())
    }
}

impl HistoryPersistence for MemoryPersistence {
    fn read(&self) -> Result<Option<String>, HistoryError> {
        let buffer = self.buffer.lock().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(buffer.clone())
    }

    fn write(&self, document: &str) -> Result<(), HistoryError> {
        let mut buffer = self.buffer.lock().map_err(|_| HistoryError::LockPoisoned)?;
        *buffer = Some(document.to_string());
        Ok(())
    }
}

/// Persisted form of both stacks, oldest entry first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack_size: Option<usize>,
    #[serde(default)]
    pub undo_stack: Vec<Value>,
    #[serde(default)]
    pub redo_stack: Vec<Value>,
}

/// Read-only view of one history entry for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub description: String,
    pub timestamp: String,
    pub is_batch: bool,
    pub kind: String,
}

impl HistoryEntry {
    fn from_command(cmd: &dyn Command) -> Self {
        Self {
            description: cmd.describe(),
            timestamp: cmd.timestamp().to_string(),
            is_batch: cmd.is_batch(),
            kind: cmd.tag(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Direction::Undo => "undo",
            Direction::Redo => "redo",
        }
    }
}

/// Owns the undo and redo stacks and keeps the history document in sync.
///
/// Single writer: every mutating method takes `&mut self`. Wrap the manager in a
/// `Mutex` to share it between threads.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_stack_size: usize,
    persistence: Box<dyn HistoryPersistence>,
    registry: CommandRegistry,
    store: StoreHandle,
    span: Span,
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("max_stack_size", &self.max_stack_size)
            .finish()
    }
}

impl HistoryManager {
    /// Empty manager; nothing is read until [`HistoryManager::load`].
    pub fn new<P>(store: StoreHandle, persistence: P, max_stack_size: usize) -> Self
    where
        P: HistoryPersistence + 'static,
    {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_stack_size: max_stack_size.max(1),
            persistence: Box::new(persistence),
            registry: CommandRegistry::with_defaults(),
            store,
            span: info_span!("undo_history"),
        }
    }

    /// Manager restored from whatever the persistence holds.
    pub fn open<P>(store: StoreHandle, persistence: P, max_stack_size: usize) -> Self
    where
        P: HistoryPersistence + 'static,
    {
        let mut manager = Self::new(store, persistence, max_stack_size);
        manager.load();
        manager
    }

    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Span every operation is logged under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Run `cmd` and record it. Failed commands leave the history untouched.
    pub fn execute(&mut self, cmd: Box<dyn Command>) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();

        if !cmd.execute() {
            error!(description = %cmd.describe(), "command failed");
            return false;
        }

        info!(description = %cmd.describe(), "command executed");
        self.undo_stack.push_back(cmd);
        self.redo_stack.clear();
        self.trim_undo();
        self.save();
        true
    }

    pub fn undo(&mut self, confirm: Option<ConfirmHook<'_>>) -> bool {
        self.step(Direction::Undo, confirm)
    }

    pub fn redo(&mut self, confirm: Option<ConfirmHook<'_>>) -> bool {
        self.step(Direction::Redo, confirm)
    }

    fn step(&mut self, direction: Direction, confirm: Option<ConfirmHook<'_>>) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();
        let op = direction.name();

        let Some(cmd) = self.origin(direction).pop_back() else {
            debug!(op, "nothing to do");
            return false;
        };
        let description = cmd.describe();

        if cmd.is_batch() {
            if let Some(confirm) = confirm {
                if !confirm(&description) {
                    info!(op, %description, "batch declined");
                    self.origin(direction).push_back(cmd);
                    return false;
                }
            }
        }

        let applied = match direction {
            Direction::Undo => cmd.undo(),
            Direction::Redo => cmd.redo(),
        };
        if !applied {
            error!(op, %description, "command failed, kept in place");
            self.origin(direction).push_back(cmd);
            return false;
        }

        match direction {
            Direction::Undo => self.redo_stack.push_back(cmd),
            Direction::Redo => {
                self.undo_stack.push_back(cmd);
                self.trim_undo();
            }
        }
        info!(op, %description, "done");
        self.save();
        true
    }

    fn origin(&mut self, direction: Direction) -> &mut VecDeque<Box<dyn Command>> {
        match direction {
            Direction::Undo => &mut self.undo_stack,
            Direction::Redo => &mut self.redo_stack,
        }
    }

    fn trim_undo(&mut self) {
        while self.undo_stack.len() > self.max_stack_size {
            if let Some(evicted) = self.undo_stack.pop_front() {
                debug!(description = %evicted.describe(), "evicted oldest entry");
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn peek_undo_description(&self) -> String {
        self.undo_stack
            .back()
            .map(|cmd| cmd.describe())
            .unwrap_or_default()
    }

    pub fn peek_redo_description(&self) -> String {
        self.redo_stack
            .back()
            .map(|cmd| cmd.describe())
            .unwrap_or_default()
    }

    /// Undo stack, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.undo_stack
            .iter()
            .rev()
            .map(|cmd| HistoryEntry::from_command(cmd.as_ref()))
            .collect()
    }

    /// Redo stack, next to be redone first.
    pub fn redo_history(&self) -> Vec<HistoryEntry> {
        self.redo_stack
            .iter()
            .rev()
            .map(|cmd| HistoryEntry::from_command(cmd.as_ref()))
            .collect()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_stack_size(&self) -> usize {
        self.max_stack_size
    }

    /// Drop all history, e.g. when switching to another project.
    pub fn clear(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        self.undo_stack.clear();
        self.redo_stack.clear();
        self.save();
        info!("history cleared");
    }

    /// Clamp to [10, 100] and keep only the most recent entries that fit.
    pub fn set_max_stack_size(&mut self, size: usize) {
        let span = self.span.clone();
        let _enter = span.enter();

        self.max_stack_size = clamp_stack_size(size);
        self.trim_undo();
        self.save();
        info!(max_stack_size = self.max_stack_size, "stack size updated");
    }

    pub fn to_document(&self) -> HistoryDocument {
        HistoryDocument {
            max_stack_size: Some(self.max_stack_size),
            undo_stack: self
                .undo_stack
                .iter()
                .map(|cmd| cmd.serialize().to_value())
                .collect(),
            redo_stack: self
                .redo_stack
                .iter()
                .map(|cmd| cmd.serialize().to_value())
                .collect(),
        }
    }

    /// Rewrite the whole document. Failures are logged; the stacks in memory
    /// stay authoritative.
    pub fn save(&self) -> bool {
        match self.write_document() {
            Ok(()) => {
                debug!(
                    undo = self.undo_stack.len(),
                    redo = self.redo_stack.len(),
                    "history saved"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "could not save history");
                false
            }
        }
    }

    fn write_document(&self) -> Result<(), HistoryError> {
        let text = serde_json::to_string_pretty(&self.to_document())?;
        self.persistence.write(&text)
    }

    /// Replace the stacks with the persisted ones. A persisted stack size is kept
    /// within [1, 100].
    ///
    /// Nothing persisted yet is a no-op. An unreadable document empties both
    /// stacks and returns `false`. Entries with unknown tags or bad fields are
    /// skipped.
    pub fn load(&mut self) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();

        let document = match self.read_document() {
            Ok(Some(document)) => document,
            Ok(None) => {
                info!("no history to load");
                return true;
            }
            Err(e) => {
                error!(error = %e, "could not load history, starting empty");
                self.undo_stack.clear();
                self.redo_stack.clear();
                return false;
            }
        };

        if let Some(size) = document.max_stack_size {
            self.max_stack_size = size.clamp(1, MAX_STACK_SIZE);
        }
        self.undo_stack = self
            .registry
            .decode_all(&document.undo_stack, &self.store)
            .into();
        self.redo_stack = self
            .registry
            .decode_all(&document.redo_stack, &self.store)
            .into();
        self.trim_undo();

        info!(
            undo = self.undo_stack.len(),
            redo = self.redo_stack.len(),
            "history loaded"
        );
        true
    }

    fn read_document(&self) -> Result<Option<HistoryDocument>, HistoryError> {
        let Some(text) = self.persistence.read()? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }
}
