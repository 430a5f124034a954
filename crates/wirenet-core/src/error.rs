//! Errors for the fallible edges of the engine: save files, definitions and
//! network messages. Wiring operations themselves report failure through
//! `bool`/`Option` returns.

use crate::components::ItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Unknown item {0}")]
    UnknownItem(ItemId),
}

pub type Result<T> = std::result::Result<T, WiringError>;
