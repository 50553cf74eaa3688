use crate::{error::StorageError, position::BytecodePosition};
use async_trait::async_trait;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::{collections::BTreeSet, io::ErrorKind, path::PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Persists armed breakpoints per file, keyed by bytecode position only. The
/// store knows nothing about lines or marks.
#[async_trait]
pub trait BreakpointStore: Send + Sync {
    async fn add(&self, filename: &str, position: BytecodePosition) -> Result<(), StorageError>;
    async fn remove(&self, filename: &str, position: BytecodePosition)
        -> Result<(), StorageError>;
    /// Atomically replace all breakpoints of `filename`.
    async fn resync(
        &self,
        filename: &str,
        positions: Vec<BytecodePosition>,
    ) -> Result<(), StorageError>;
    async fn list(&self, filename: &str) -> Result<Vec<BytecodePosition>, StorageError>;
}

/// A [`BreakpointStore`] kept in memory and optionally mirrored to a JSON file
/// after every change.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    breakpoints: RwLock<FxHashMap<String, BTreeSet<BytecodePosition>>>,
    persist_to: Option<PathBuf>,
}

impl BreakpointManager {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the breakpoints saved at `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let breakpoints = match tokio::fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content)?,
            Err(error) if error.kind() == ErrorKind::NotFound => FxHashMap::default(),
            Err(error) => return Err(error.into()),
        };
        info!("Loaded breakpoints from {}.", path.display());
        Ok(Self {
            breakpoints: RwLock::new(breakpoints),
            persist_to: Some(path),
        })
    }

    async fn persist(
        &self,
        breakpoints: &FxHashMap<String, BTreeSet<BytecodePosition>>,
    ) -> Result<(), StorageError> {
        let Some(path) = &self.persist_to else {
            return Ok(());
        };
        let content = serde_json::to_vec_pretty(breakpoints)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `change` to a copy of all breakpoints. The copy replaces the
    /// current state only once it is persisted. Returns whether `change`
    /// reported a modification.
    async fn update(
        &self,
        change: impl FnOnce(&mut FxHashMap<String, BTreeSet<BytecodePosition>>) -> bool + Send,
    ) -> Result<bool, StorageError> {
        let mut breakpoints = self.breakpoints.write().await;
        let mut updated = breakpoints.clone();
        if !change(&mut updated) {
            return Ok(false);
        }
        self.persist(&updated).await?;
        *breakpoints = updated;
        Ok(true)
    }
}

#[async_trait]
impl BreakpointStore for BreakpointManager {
    async fn add(&self, filename: &str, position: BytecodePosition) -> Result<(), StorageError> {
        let added = self
            .update(|breakpoints| {
                breakpoints
                    .entry(filename.to_string())
                    .or_default()
                    .insert(position)
            })
            .await?;
        if added {
            debug!("{filename}: Breakpoint added at {position}.");
        }
        Ok(())
    }

    async fn remove(
        &self,
        filename: &str,
        position: BytecodePosition,
    ) -> Result<(), StorageError> {
        let removed = self
            .update(|breakpoints| {
                let Some(positions) = breakpoints.get_mut(filename) else {
                    return false;
                };
                let removed = positions.remove(&position);
                if positions.is_empty() {
                    breakpoints.remove(filename);
                }
                removed
            })
            .await?;
        if removed {
            debug!("{filename}: Breakpoint removed at {position}.");
        }
        Ok(())
    }

    async fn resync(
        &self,
        filename: &str,
        positions: Vec<BytecodePosition>,
    ) -> Result<(), StorageError> {
        let positions: BTreeSet<_> = positions.into_iter().collect();
        let summary = positions.iter().join(", ");
        self.update(|breakpoints| {
            if positions.is_empty() {
                breakpoints.remove(filename);
            } else {
                breakpoints.insert(filename.to_string(), positions);
            }
            true
        })
        .await?;
        debug!("{filename}: Breakpoints resynced to [{summary}].");
        Ok(())
    }

    async fn list(&self, filename: &str) -> Result<Vec<BytecodePosition>, StorageError> {
        Ok(self
            .breakpoints
            .read()
            .await
            .get(filename)
            .map(|it| it.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(routine: usize, opcode: usize) -> BytecodePosition {
        BytecodePosition::new(routine, opcode)
    }

    #[tokio::test]
    async fn resync_replaces_only_the_given_file() {
        let store = BreakpointManager::in_memory();
        store.add("a.ssb", at(0, 1)).await.unwrap();
        store.add("a.ssb", at(0, 2)).await.unwrap();
        store.add("b.ssb", at(3, 0)).await.unwrap();

        store.resync("a.ssb", vec![at(1, 0), at(0, 2)]).await.unwrap();

        assert_eq!(store.list("a.ssb").await.unwrap(), vec![at(0, 2), at(1, 0)]);
        assert_eq!(store.list("b.ssb").await.unwrap(), vec![at(3, 0)]);
    }

    #[tokio::test]
    async fn removing_unknown_breakpoints_is_fine() {
        let store = BreakpointManager::in_memory();
        store.remove("a.ssb", at(0, 0)).await.unwrap();
        store.add("a.ssb", at(0, 0)).await.unwrap();
        store.add("a.ssb", at(0, 0)).await.unwrap();
        assert_eq!(store.list("a.ssb").await.unwrap(), vec![at(0, 0)]);
        store.remove("a.ssb", at(0, 0)).await.unwrap();
        assert!(store.list("a.ssb").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persisted_breakpoints_survive_a_reload() {
        let path = std::env::temp_dir().join(format!(
            "script_sync_breakpoints_{}.json",
            std::process::id(),
        ));
        {
            let store = BreakpointManager::load(&path).await.unwrap();
            store.add("a.ssb", at(2, 5)).await.unwrap();
            store.resync("b.ssb", vec![at(1, 1)]).await.unwrap();
        }
        let store = BreakpointManager::load(&path).await.unwrap();
        assert_eq!(store.list("a.ssb").await.unwrap(), vec![at(2, 5)]);
        assert_eq!(store.list("b.ssb").await.unwrap(), vec![at(1, 1)]);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn failed_writes_keep_the_previous_breakpoints() {
        let path = std::env::temp_dir()
            .join(format!("script_sync_missing_{}", std::process::id()))
            .join("breakpoints.json");
        let store = BreakpointManager::load(&path).await.unwrap();

        assert!(matches!(
            store.add("a.ssb", at(1, 1)).await,
            Err(StorageError::Io(_)),
        ));
        assert!(store.resync("a.ssb", vec![at(2, 2)]).await.is_err());
        assert!(store.list("a.ssb").await.unwrap().is_empty());
    }
}
