//! The container persisted units are stored in. Its on-disk format is not our
//! concern: it is an opaque blob store keyed by filename.

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn read(&self, filename: &str) -> Result<Bytes, StorageError>;
    async fn write(&self, filename: &str, bytes: Bytes) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: RwLock<FxHashMap<String, Bytes>>,
}
impl MemoryArchive {
    pub fn with_entries<N: Into<String>, B: Into<Bytes>>(
        entries: impl IntoIterator<Item = (N, B)>,
    ) -> Self {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(name, bytes)| (name.into(), bytes.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn read(&self, filename: &str) -> Result<Bytes, StorageError> {
        self.entries
            .read()
            .await
            .get(filename)
            .cloned()
            .ok_or_else(|| StorageError::Missing {
                filename: filename.to_string(),
            })
    }

    async fn write(&self, filename: &str, bytes: Bytes) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(filename.to_string(), bytes);
        Ok(())
    }
}

/// Stores every entry as a file below `root`, using the filename as relative
/// path.
#[derive(Debug)]
pub struct DirectoryArchive {
    root: PathBuf,
}
impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(filename);
        let escapes_root = relative
            .components()
            .any(|it| !matches!(it, Component::Normal(_)));
        if filename.is_empty() || escapes_root {
            return Err(StorageError::Corrupt {
                filename: filename.to_string(),
                reason: "not a relative path inside the archive".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArchiveStore for DirectoryArchive {
    async fn read(&self, filename: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes.into()),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(StorageError::Missing {
                filename: filename.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    async fn write(&self, filename: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {}.", bytes.len(), path.display());
        tokio::fs::write(&path, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_archive_reports_missing_entries() {
        let archive = MemoryArchive::with_entries([("a.ssb", b"abc".to_vec())]);
        assert_eq!(archive.read("a.ssb").await.unwrap(), Bytes::from_static(b"abc"));
        assert!(matches!(
            archive.read("b.ssb").await,
            Err(StorageError::Missing { filename }) if filename == "b.ssb",
        ));

        archive.write("b.ssb", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(archive.read("b.ssb").await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn directory_archive_round_trips_nested_entries() {
        let root = std::env::temp_dir().join(format!("script_sync_archive_{}", std::process::id()));
        let archive = DirectoryArchive::new(&root);

        archive
            .write("scripts/m01/enter.ssb", Bytes::from_static(b"bytecode"))
            .await
            .unwrap();
        assert_eq!(
            archive.read("scripts/m01/enter.ssb").await.unwrap(),
            Bytes::from_static(b"bytecode"),
        );
        assert!(matches!(
            archive.read("scripts/none.ssb").await,
            Err(StorageError::Missing { .. }),
        ));
        assert!(matches!(
            archive.read("../outside.ssb").await,
            Err(StorageError::Corrupt { .. }),
        ));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
