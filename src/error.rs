use crate::{
    position::{BytecodePosition, TextPosition},
    projection::Projection,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Archive entry '{filename}' does not exist")]
    Missing { filename: String },

    #[error("Archive entry '{filename}' is corrupt: {reason}")]
    Corrupt { filename: String, reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Could not (de)serialize stored data")]
    Serde(#[from] serde_json::Error),
}

/// Bad source text. `position` points at the offending text.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message} (at {position})")]
pub struct CompileError {
    pub message: String,
    pub position: TextPosition,
}
impl CompileError {
    pub fn new(message: impl Into<String>, position: TextPosition) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SourceMapError {
    #[error("{position} is mapped more than once")]
    DuplicatePosition { position: BytecodePosition },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("The {projection} projection of '{filename}' is not editable")]
    ProjectionNotEditable {
        filename: String,
        projection: Projection,
    },

    #[error("Debugging is disabled for '{filename}' until it is reloaded")]
    FileNotBreakable { filename: String },

    #[error("'{filename}' is not open in this editor")]
    FileNotOpen { filename: String },

    #[error("'{filename}' was not saved with a reload ready to be triggered")]
    InvalidReloadRequest { filename: String },
}
impl SyncError {
    /// Errors that are expected during normal use and only need to be shown
    /// to the user. Everything else is a broken caller contract or an I/O
    /// failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SyncError::Compile(_) | SyncError::FileNotBreakable { .. }
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
