//! Non-recursive directory listing.
//!
//! Lists the immediate children of one directory with the inode number and
//! kind of each, without following symlinks. Index files are left out. A child
//! that cannot be inspected does not fail the listing; it is reported next to
//! the entries that could be.

use crate::index_file::INDEX_PREFIX;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File name is not valid UTF-8: {0}")]
    NonUtf8Name(PathBuf),
}

impl DirListError {
    pub(crate) fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(path.to_path_buf())
        } else {
            DirListError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Sockets, FIFOs, device nodes.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub inode: u64,
    pub kind: EntryKind,
}

#[derive(Debug, Default)]
pub struct DirListing {
    /// Sorted by name.
    pub entries: Vec<FsEntry>,
    pub failures: Vec<DirListError>,
}

pub fn is_index_file_name(name: &str) -> bool {
    name.starts_with(INDEX_PREFIX)
}

pub fn list_directory(dir: &Path) -> Result<DirListing, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| DirListError::from_io(dir, e))?;

    let mut listing = DirListing::default();

    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                listing.failures.push(DirListError::from_io(dir, e));
                continue;
            }
        };
        let path = entry.path();

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            listing.failures.push(DirListError::NonUtf8Name(path));
            continue;
        };

        if is_index_file_name(&name) {
            continue;
        }

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                listing.failures.push(DirListError::from_io(&path, e));
                continue;
            }
        };

        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        listing.entries.push(FsEntry {
            name,
            inode: metadata.ino(),
            kind,
        });
    }

    listing.entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(listing)
}
