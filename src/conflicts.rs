//! Paths that hold different identities in the two roots.

use crate::index_file::CurrentPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    pub path: String,
    pub uuid_a: String,
    pub uuid_b: String,
}

/// Every path present in both snapshots whose identities differ, in path
/// order. A path present on one side only is not a conflict.
pub fn detect_path_conflicts(a: &CurrentPaths, b: &CurrentPaths) -> Vec<PathConflict> {
    a.iter()
        .filter_map(|(path, uuid_a)| {
            let uuid_b = b.get(path)?;
            (uuid_a != uuid_b).then(|| PathConflict {
                path: path.to_string(),
                uuid_a: uuid_a.to_string(),
                uuid_b: uuid_b.to_string(),
            })
        })
        .collect()
}
