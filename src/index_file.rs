use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Every file the tool writes into a root starts with this, so scans can
/// recognize and skip them (including temporaries left behind by a crash).
pub const INDEX_PREFIX: &str = ".renametree-";

/// Bumped together with any incompatible change to [`IndexDocument`]. There is
/// no migration: a new tag simply means a new, empty index.
const SCHEMA_TAG: &str = "v0";

#[derive(Debug, thiserror::Error)]
pub enum IndexFileError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Corrupt index {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Index serialization error: {0}")]
    Serialize(serde_json::Error),
}

impl IndexFileError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            IndexFileError::PermissionDenied(path.to_path_buf())
        } else {
            IndexFileError::Io(e)
        }
    }
}

/// Name of the index file for the root whose own inode number is `root_inum`.
pub fn index_file_name(root_inum: u64) -> String {
    format!("{INDEX_PREFIX}{root_inum}.{SCHEMA_TAG}.idx")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FileIdentity {
    pub inum: u64,
    pub uuid: String,
}

/// "Identity `uuid` occupied `path` as of `time`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PathRecord {
    pub uuid: String,
    /// Scan timestamp, seconds since the Unix epoch.
    pub time: u64,
    pub path: String,
}

/// On-disk shape of an index.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct IndexDocument {
    #[serde(default, deserialize_with = "null_as_empty")]
    files: Vec<FileIdentity>,
    #[serde(default, deserialize_with = "null_as_empty")]
    paths: Vec<PathRecord>,
}

/// Older writers emit `null` rather than `[]` for an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity index of one root: inode to identity, plus the append-only path
/// history of every identity.
///
/// The current path of an identity is never stored on disk. It is the record
/// with the greatest `time`, the later appended one winning ties. `latest`
/// caches that answer per identity and is maintained on every append.
#[derive(Debug, Clone, Default)]
pub struct Index {
    files: BTreeMap<u64, String>,
    paths: Vec<PathRecord>,
    latest: HashMap<String, usize>,
    dirty: bool,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(path: &Path, content: &str) -> Result<Self, IndexFileError> {
        let document: IndexDocument =
            serde_json::from_str(content).map_err(|source| IndexFileError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let mut index = Index::new();
        // Duplicate inode entries may exist in files written by older tools;
        // the last one wins, matching the insert-or-update rule of `assign_inode`.
        for file in document.files {
            index.files.insert(file.inum, file.uuid);
        }
        for record in document.paths {
            index.push_record(record);
        }

        Ok(index)
    }

    pub fn to_json(&self) -> Result<String, IndexFileError> {
        let document = IndexDocument {
            files: self
                .files
                .iter()
                .map(|(inum, uuid)| FileIdentity {
                    inum: *inum,
                    uuid: uuid.clone(),
                })
                .collect(),
            paths: self.paths.clone(),
        };

        let mut content =
            serde_json::to_string_pretty(&document).map_err(IndexFileError::Serialize)?;
        content.push('\n');
        Ok(content)
    }

    /// Load an index, treating a missing file as an empty index.
    pub fn load_or_empty(path: &Path) -> Result<Self, IndexFileError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index::new()),
            Err(e) => Err(IndexFileError::from_io(path, e)),
        }
    }

    /// Save the index atomically and mark it clean.
    pub fn save(&mut self, path: &Path) -> Result<(), IndexFileError> {
        self.stage(path)?.commit()?;
        self.dirty = false;
        Ok(())
    }

    /// Write the serialized index to a synced temporary file next to `path`.
    ///
    /// Nothing at `path` changes until [`StagedIndex::commit`]. Dropping the
    /// staged index removes the temporary file.
    pub fn stage(&self, path: &Path) -> Result<StagedIndex, IndexFileError> {
        let content = self.to_json()?;

        let parent = path.parent().unwrap_or(Path::new("."));

        let mut temp_file = tempfile::Builder::new()
            .prefix(INDEX_PREFIX)
            .suffix(".saving")
            .tempfile_in(parent)
            .map_err(|e| IndexFileError::from_io(parent, e))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| IndexFileError::from_io(path, e))?;

        temp_file.as_file().sync_all().map_err(IndexFileError::Io)?;

        Ok(StagedIndex {
            temp_file,
            target: path.to_path_buf(),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn identity_for_inode(&self, inum: u64) -> Option<&str> {
        self.files.get(&inum).map(String::as_str)
    }

    /// Bind `inum` to `uuid`, replacing any previous binding of that inode.
    pub fn assign_inode(&mut self, inum: u64, uuid: &str) {
        if self.files.get(&inum).map(String::as_str) != Some(uuid) {
            self.files.insert(inum, uuid.to_string());
            self.dirty = true;
        }
    }

    pub fn files(&self) -> impl Iterator<Item = (u64, &str)> {
        self.files.iter().map(|(inum, uuid)| (*inum, uuid.as_str()))
    }

    pub fn paths(&self) -> &[PathRecord] {
        &self.paths
    }

    pub fn append_path(&mut self, uuid: &str, path: &str, time: u64) {
        self.push_record(PathRecord {
            uuid: uuid.to_string(),
            time,
            path: path.to_string(),
        });
        self.dirty = true;
    }

    fn push_record(&mut self, record: PathRecord) {
        let position = self.paths.len();
        let superseded = self
            .latest
            .get(&record.uuid)
            .is_none_or(|&current| self.paths[current].time <= record.time);
        if superseded {
            self.latest.insert(record.uuid.clone(), position);
        }
        self.paths.push(record);
    }

    pub fn current_record(&self, uuid: &str) -> Option<&PathRecord> {
        self.latest.get(uuid).map(|&position| &self.paths[position])
    }

    pub fn current_path(&self, uuid: &str) -> Option<&str> {
        self.current_record(uuid).map(|record| record.path.as_str())
    }

    /// Every record of `uuid`, in append order.
    pub fn history(&self, uuid: &str) -> Vec<&PathRecord> {
        self.paths.iter().filter(|record| record.uuid == uuid).collect()
    }

    /// Map of current path to identity.
    ///
    /// When several identities currently claim the same path (for example a
    /// deleted file whose record lingers and a newer file at that path), the one
    /// with the later record wins.
    pub fn current_paths(&self) -> CurrentPaths {
        let mut claims: BTreeMap<&str, (u64, usize, &str)> = BTreeMap::new();
        for (uuid, &position) in &self.latest {
            let record = &self.paths[position];
            let candidate = (record.time, position, uuid.as_str());
            let wins = claims
                .get(record.path.as_str())
                .is_none_or(|existing| (existing.0, existing.1) < (candidate.0, candidate.1));
            if wins {
                claims.insert(record.path.as_str(), candidate);
            }
        }

        CurrentPaths(
            claims
                .into_iter()
                .map(|(path, (_, _, uuid))| (path.to_string(), uuid.to_string()))
                .collect(),
        )
    }
}

/// A serialized index waiting to replace the committed one.
pub struct StagedIndex {
    temp_file: tempfile::NamedTempFile,
    target: PathBuf,
}

impl StagedIndex {
    /// Atomically rename the staged file over the target.
    pub fn commit(self) -> Result<(), IndexFileError> {
        let target = self.target;
        self.temp_file
            .persist(&target)
            .map_err(|e| IndexFileError::from_io(&target, e.error))?;
        Ok(())
    }
}

/// Snapshot of "current path -> identity" for one index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentPaths(BTreeMap<String, String>);

impl CurrentPaths {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(path, uuid)| (path.as_str(), uuid.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reflect a rename of `from` to `to`, carrying along everything below `from`.
    pub fn apply_rename(&mut self, from: &str, to: &str) {
        let moved: Vec<String> = self
            .0
            .keys()
            .filter(|path| is_same_or_below(path, from))
            .cloned()
            .collect();

        let mut relocated = Vec::with_capacity(moved.len());
        for path in moved {
            if let Some(uuid) = self.0.remove(&path) {
                let new_path = format!("{}{}", to, &path[from.len()..]);
                relocated.push((new_path, uuid));
            }
        }
        self.0.extend(relocated);
    }
}

#[cfg(test)]
impl FromIterator<(String, String)> for CurrentPaths {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        CurrentPaths(iter.into_iter().collect())
    }
}

/// True when `path` is `ancestor` itself or lies beneath it.
pub fn is_same_or_below(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn index_path(temp: &TempDir) -> PathBuf {
        temp.path().join(index_file_name(1234))
    }

    #[test]
    fn test_index_file_name() {
        assert_eq!(index_file_name(1234), ".renametree-1234.v0.idx");
        assert!(index_file_name(7).starts_with(INDEX_PREFIX));
    }

    #[test]
    fn test_parse_valid_document() {
        let content = r#"{
            "Files": [{"Inum": 11, "Uuid": "u1"}],
            "Paths": [
                {"Uuid": "u1", "Time": 100, "Path": "a.txt"},
                {"Uuid": "u1", "Time": 200, "Path": "b.txt"}
            ]
        }"#;

        let index = Index::from_json(Path::new("idx"), content).unwrap();

        assert_eq!(index.identity_for_inode(11), Some("u1"));
        assert_eq!(index.paths().len(), 2);
        assert_eq!(index.current_path("u1"), Some("b.txt"));
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_parse_null_lists() {
        let index = Index::from_json(Path::new("idx"), r#"{"Files":null,"Paths":null}"#).unwrap();

        assert_eq!(index.files().count(), 0);
        assert!(index.paths().is_empty());
    }

    #[test]
    fn test_parse_duplicate_inode_last_wins() {
        let content = r#"{
            "Files": [{"Inum": 5, "Uuid": "old"}, {"Inum": 5, "Uuid": "new"}],
            "Paths": []
        }"#;

        let index = Index::from_json(Path::new("idx"), content).unwrap();

        assert_eq!(index.files().count(), 1);
        assert_eq!(index.identity_for_inode(5), Some("new"));
    }

    #[test]
    fn test_corrupt_document() {
        let result = Index::from_json(Path::new("some.idx"), "{\"Files\": [");

        match result {
            Err(IndexFileError::Corrupt { path, .. }) => {
                assert_eq!(path, PathBuf::from("some.idx"));
            }
            other => panic!("Expected Corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = r#"{"Files": [], "Paths": [], "Extra": 1}"#;

        assert!(matches!(
            Index::from_json(Path::new("idx"), content),
            Err(IndexFileError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let temp = TempDir::new().unwrap();

        let index = Index::load_or_empty(&index_path(&temp)).unwrap();

        assert_eq!(index.files().count(), 0);
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = index_path(&temp);

        let mut index = Index::new();
        index.assign_inode(10, "u1");
        index.append_path("u1", "dir/file.txt", 100);
        assert!(index.is_dirty());

        index.save(&path).unwrap();
        assert!(!index.is_dirty());

        let loaded = Index::load_or_empty(&path).unwrap();
        assert_eq!(loaded.identity_for_inode(10), Some("u1"));
        assert_eq!(loaded.paths(), index.paths());

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "only the index itself should remain");
    }

    #[test]
    fn test_saved_document_uses_pascal_case_keys() {
        let mut index = Index::new();
        index.assign_inode(3, "u");
        index.append_path("u", "p", 9);

        let json = index.to_json().unwrap();

        assert!(json.contains("\"Files\""));
        assert!(json.contains("\"Inum\": 3"));
        assert!(json.contains("\"Paths\""));
        assert!(json.contains("\"Time\": 9"));
        assert!(!json.contains("Dirty"));
    }

    /// An interruption between writing the temporary file and renaming it
    /// must leave the committed index byte-for-byte intact.
    #[test]
    fn test_interrupted_save_keeps_committed_index() {
        let temp = TempDir::new().unwrap();
        let path = index_path(&temp);

        let mut index = Index::new();
        index.assign_inode(1, "u1");
        index.append_path("u1", "a", 100);
        index.save(&path).unwrap();
        let committed = std::fs::read(&path).unwrap();

        index.append_path("u1", "b", 200);
        let staged = index.stage(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), committed);
        drop(staged);

        assert_eq!(std::fs::read(&path).unwrap(), committed);
        assert!(index.is_dirty());
    }

    #[test]
    fn test_staged_temp_file_carries_index_prefix() {
        let temp = TempDir::new().unwrap();
        let path = index_path(&temp);

        let staged = Index::new().stage(&path).unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(INDEX_PREFIX));

        staged.commit().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_current_path_tie_goes_to_last_appended() {
        let mut index = Index::new();
        index.append_path("u", "first", 100);
        index.append_path("u", "second", 100);

        assert_eq!(index.current_path("u"), Some("second"));
    }

    #[test]
    fn test_current_path_ignores_older_late_append() {
        let mut index = Index::new();
        index.append_path("u", "newer", 200);
        index.append_path("u", "older", 100);

        assert_eq!(index.current_path("u"), Some("newer"));
        assert_eq!(index.history("u").len(), 2);
    }

    #[test]
    fn test_assign_inode_is_insert_or_update() {
        let mut index = Index::new();
        index.assign_inode(9, "a");
        index.assign_inode(9, "b");

        assert_eq!(index.files().collect::<Vec<_>>(), vec![(9, "b")]);
    }

    #[test]
    fn test_assign_same_binding_does_not_dirty() {
        let mut index = Index::from_json(
            Path::new("idx"),
            r#"{"Files": [{"Inum": 9, "Uuid": "a"}], "Paths": []}"#,
        )
        .unwrap();

        index.assign_inode(9, "a");

        assert!(!index.is_dirty());
    }

    #[test]
    fn test_current_paths_later_record_wins_shared_path() {
        let mut index = Index::new();
        index.append_path("gone", "x", 100);
        index.append_path("fresh", "x", 200);
        index.append_path("other", "y", 150);

        let current = index.current_paths();

        assert_eq!(current.len(), 2);
        assert_eq!(current.get("x"), Some("fresh"));
        assert_eq!(current.get("y"), Some("other"));
    }

    #[test]
    fn test_apply_rename_moves_subtree() {
        let mut current: CurrentPaths = [
            ("d".to_string(), "dir".to_string()),
            ("d/f".to_string(), "file".to_string()),
            ("dd".to_string(), "sibling".to_string()),
        ]
        .into_iter()
        .collect();

        current.apply_rename("d", "e/d2");

        assert_eq!(current.get("e/d2"), Some("dir"));
        assert_eq!(current.get("e/d2/f"), Some("file"));
        assert_eq!(current.get("dd"), Some("sibling"));
        assert_eq!(current.get("d"), None);
    }

    #[test]
    fn test_is_same_or_below() {
        assert!(is_same_or_below("a", "a"));
        assert!(is_same_or_below("a/b", "a"));
        assert!(!is_same_or_below("ab", "a"));
        assert!(!is_same_or_below("a", "a/b"));
    }
}
