//! Keeps breakpoints of scripts in sync while their text is edited in two
//! syntaxes, compiled to bytecode and executed by an engine that can't be
//! patched while it holds a file.

pub mod archive;
pub mod breakpoints;
pub mod compiler;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod marks;
pub mod position;
pub mod projection;
pub mod registry;
pub mod source_map;
#[cfg(test)]
mod testing;
pub mod unit;

pub use crate::{
    editor::{EditorContext, ScriptEditor},
    error::{SyncError, SyncResult},
    registry::{EngineNotifier, FileRegistry, ReloadReadiness},
};
