//! Persistent undo/redo for ledger records.
//!
//! Every change to the data store is a [`Command`] that knows how to apply and
//! revert itself from full record snapshots. The [`HistoryManager`] keeps bounded
//! undo/redo stacks of them and rewrites a JSON history document after every
//! change, so history survives restarts. [`BatchCommand`] groups changes that are
//! undone together; [`CommandRegistry`] turns persisted entries back into commands.

pub mod batch;
pub mod command;
pub mod config;
pub mod error;
pub mod fuzzy_matcher;
pub mod history;
pub mod i18n;
pub mod registry;
pub mod storage;
pub mod store_manager;

pub use batch::BatchCommand;
pub use command::{Action, Command, EntityCommand, EntityOp, SerializedCommand};
pub use error::{DecodeError, HistoryError, StoreError};
pub use history::{
    ConfirmHook, HistoryDocument, HistoryEntry, HistoryManager, HistoryPersistence,
    JsonFilePersistence, MemoryPersistence,
};
pub use registry::CommandRegistry;
pub use storage::{DataStore, EntityKind, MemoryStore, Record, StoreHandle};
pub use store_manager::JsonFileStore;
