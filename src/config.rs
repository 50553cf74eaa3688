use crate::{
    archive::DirectoryArchive, breakpoints::BreakpointManager, error::StorageError, logging,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the compiled units, one file per script.
    pub archive_dir: PathBuf,
    /// Breakpoints are only kept in memory if this is unset.
    pub breakpoints_file: Option<PathBuf>,
    pub log_to_stdout: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("archive"),
            breakpoints_file: None,
            log_to_stdout: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let config = Self::from_json(&tokio::fs::read(path).await?)?;
        info!("Loaded config from {}.", path.display());
        Ok(config)
    }

    /// Install the console logger on the stream the config asks for. Call
    /// once per process.
    pub fn init_logging(&self) {
        logging::init_logger(self.log_to_stdout);
    }

    pub fn open_archive(&self) -> DirectoryArchive {
        DirectoryArchive::new(self.archive_dir.clone())
    }

    pub async fn open_breakpoints(&self) -> Result<BreakpointManager, StorageError> {
        match &self.breakpoints_file {
            Some(path) => BreakpointManager::load(path).await,
            None => Ok(BreakpointManager::in_memory()),
        }
    }
}
