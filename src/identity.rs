//! Deterministic identifier synthesis for entries no source could identify.
//!
//! An identifier is the hex SHA-256 of the scan timestamp, the relative path
//! and, for regular files, the full file content. Fields are length-prefixed
//! so that no choice of path bytes can shift content across a field boundary.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("IO error hashing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

impl IdentityError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            IdentityError::PermissionDenied(path.to_path_buf())
        } else {
            IdentityError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

/// What to feed the hasher beyond timestamp and path.
#[derive(Debug, Clone, Copy)]
pub enum IdentityInput<'a> {
    /// Regular file; its content at this absolute path is hashed.
    FileContent(&'a Path),
    /// Directories, symlinks and anything else: timestamp and path only.
    PathOnly,
}

/// Synthesizes the identifier of an entry observed at `relative_path` during
/// the scan that started at `scan_time`.
///
/// The same `(scan_time, relative_path, content)` triple always yields the same
/// identifier; any difference in path or content yields a different one with
/// overwhelming probability.
pub fn generate_identity(
    scan_time: u64,
    relative_path: &str,
    input: IdentityInput<'_>,
) -> Result<String, IdentityError> {
    let mut hasher = Sha256::new();
    hash_u64_field(&mut hasher, scan_time);
    hash_field(&mut hasher, relative_path.as_bytes());

    if let IdentityInput::FileContent(path) = input {
        let mut file = File::open(path).map_err(|e| IdentityError::from_io(path, e))?;
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|e| IdentityError::from_io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
    }

    let identity = format!("{:x}", hasher.finalize());
    debug!("Generated identity {} for {}", identity, relative_path);

    Ok(identity)
}

/// Hashes a byte field with an explicit length prefix.
fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_be_bytes());
    hasher.update(bytes);
}

fn hash_u64_field(hasher: &mut Sha256, value: u64) {
    hasher.update(value.to_be_bytes());
}
