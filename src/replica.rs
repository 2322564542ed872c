//! One root directory together with its persistent index.

use crate::index_file::{Index, IndexFileError, index_file_name};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("Cannot open root {}: {source}", .root.display())]
    Io {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Root is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Cannot load index of {}: {source}", .root.display())]
    Load {
        root: PathBuf,
        #[source]
        source: IndexFileError,
    },
    #[error("Cannot save index of {}: {source}", .root.display())]
    Save {
        root: PathBuf,
        #[source]
        source: IndexFileError,
    },
}

#[derive(Debug)]
pub struct Replica {
    root: PathBuf,
    device: u64,
    inum: u64,
    index_path: PathBuf,
    pub index: Index,
}

impl Replica {
    /// Stat `root` and load its index. A missing index file means a root that
    /// was never scanned; an unreadable or corrupt one is an error.
    pub fn open(root: &Path) -> Result<Self, ReplicaError> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ReplicaError::PermissionDenied(root.to_path_buf())
            } else {
                ReplicaError::Io {
                    root: root.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if !metadata.is_dir() {
            return Err(ReplicaError::NotADirectory(root.to_path_buf()));
        }

        let index_path = root.join(index_file_name(metadata.ino()));
        let index = Index::load_or_empty(&index_path).map_err(|source| ReplicaError::Load {
            root: root.to_path_buf(),
            source,
        })?;

        debug!(
            "Opened {} with {} inodes, {} path records and {} current paths",
            root.display(),
            index.files().count(),
            index.paths().len(),
            index.current_paths().len()
        );

        Ok(Replica {
            root: root.to_path_buf(),
            device: metadata.dev(),
            inum: metadata.ino(),
            index_path,
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Whether both replicas are the same directory on disk.
    pub fn same_directory(&self, other: &Replica) -> bool {
        self.device == other.device && self.inum == other.inum
    }

    /// Persist the index if the last scan changed it. Returns whether a save
    /// happened.
    pub fn save_if_dirty(&mut self) -> Result<bool, ReplicaError> {
        if !self.index.is_dirty() {
            return Ok(false);
        }

        self.index
            .save(&self.index_path)
            .map_err(|source| ReplicaError::Save {
                root: self.root.clone(),
                source,
            })?;

        debug!("Saved {}", self.index_path().display());
        Ok(true)
    }
}
