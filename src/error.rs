use crate::storage::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{0} records need a scope id")]
    MissingScope(EntityKind),
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("store rejected the operation: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a persisted command entry could not be turned back into a command.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown command type: {0}")]
    UnknownTag(String),
    #[error("malformed {tag} entry: {reason}")]
    Malformed { tag: String, reason: String },
}

impl DecodeError {
    pub fn malformed(tag: impl Into<String>, reason: impl ToString) -> Self {
        DecodeError::Malformed {
            tag: tag.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("history buffer lock poisoned")]
    LockPoisoned,
}
