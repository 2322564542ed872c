use crate::dir_list::{DirListError, EntryKind, list_directory};
use crate::identity::{IdentityError, IdentityInput, generate_identity};
use crate::identity_source::IdentitySource;
use crate::index_file::{CurrentPaths, Index};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ScanEntryError {
    #[error("{0}")]
    Listing(#[from] DirListError),
    #[error("{0}")]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Give a new inode found at a tracked path the identity previously
    /// recorded there, treating the file as replaced in place.
    pub associate_changed_inodes: bool,

    /// Synthesize an identity for entries nothing else could identify. When
    /// disabled, such entries stay untracked.
    pub always_generate_uuid: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            associate_changed_inodes: false,
            always_generate_uuid: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries_seen: usize,
    /// Identities taken over from the other root for a path it already tracks.
    pub identities_adopted: usize,
    /// Identities given to a new inode found at a previously tracked path.
    pub identities_associated: usize,
    pub identities_generated: usize,
    pub entries_untracked: usize,
    pub records_appended: usize,
    pub errors: Vec<ScanEntryError>,
}

/// One entry found by [`walk_tree`], in the order it was visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedEntry {
    /// `/`-separated path relative to the walked root.
    pub relative_path: String,
    pub inode: u64,
    pub kind: EntryKind,
}

#[derive(Debug, Default)]
pub struct Walk {
    pub entries: Vec<WalkedEntry>,
    pub failures: Vec<DirListError>,
}

/// Depth-first walk below `root`, each entry visited before its children.
///
/// Siblings come in name order. Symlinks are reported but not followed. A
/// subdirectory that cannot be listed is recorded as a failure and the walk
/// carries on; only failing to list `root` itself is an error.
pub fn walk_tree(root: &Path) -> Result<Walk, DirListError> {
    let mut walk = Walk::default();
    let mut pending: Vec<WalkedEntry> = Vec::new();

    let listing = list_directory(root)?;
    walk.failures.extend(listing.failures);
    push_children(&mut pending, "", listing.entries);

    while let Some(entry) = pending.pop() {
        if entry.kind == EntryKind::Dir {
            match list_directory(&root.join(&entry.relative_path)) {
                Ok(listing) => {
                    walk.failures.extend(listing.failures);
                    push_children(&mut pending, &entry.relative_path, listing.entries);
                }
                Err(e) => walk.failures.push(e),
            }
        }
        walk.entries.push(entry);
    }

    Ok(walk)
}

fn push_children(
    pending: &mut Vec<WalkedEntry>,
    parent: &str,
    children: Vec<crate::dir_list::FsEntry>,
) {
    // Reversed so that popping yields name order.
    for child in children.into_iter().rev() {
        let relative_path = if parent.is_empty() {
            child.name
        } else {
            format!("{}/{}", parent, child.name)
        };
        pending.push(WalkedEntry {
            relative_path,
            inode: child.inode,
            kind: child.kind,
        });
    }
}

/// Assign or confirm an identity for every entry below `root` and record
/// path changes in `index`.
///
/// Identity resolution, first match wins:
///
/// 1. the identity already bound to the entry's inode;
/// 2. the identity `other_root` knows at the same relative path;
/// 3. with `associate_changed_inodes`, the identity this index recorded at the
///    same path before the scan, if no live inode still carries it;
/// 4. with `always_generate_uuid`, a content-derived identity (see
///    [`generate_identity`]).
///
/// Otherwise the entry stays untracked for this pass. Steps 2 and 3 never hand
/// out an identity that another live inode of this root already carries, and
/// an identity is placed at most once per pass, so hard links after the first
/// are left untracked.
///
/// When the resolved identity's current path differs from the entry's path, a
/// record stamped `scan_time` is appended. Per-entry failures are collected in
/// the report.
pub fn scan_tree(
    index: &mut Index,
    root: &Path,
    other_root: &dyn IdentitySource,
    options: &ScanOptions,
    scan_time: u64,
) -> Result<ScanReport, DirListError> {
    let walk = walk_tree(root)?;

    let mut report = ScanReport::default();
    for failure in walk.failures {
        warn!("{}", failure);
        report.errors.push(failure.into());
    }

    let mut assigner =
        IdentityAssigner::new(index, other_root, options, scan_time, &walk.entries);

    for entry in &walk.entries {
        report.entries_seen += 1;
        let absolute = root.join(&entry.relative_path);
        if let Err(e) = assigner.assign(entry, &absolute, &mut report) {
            warn!("{}", e);
            report.errors.push(e.into());
        }
    }

    info!(
        "Scanned {}: {} entries, {} new path records, {} errors",
        root.display(),
        report.entries_seen,
        report.records_appended,
        report.errors.len()
    );
    debug!(
        "Identities for {}: {} adopted, {} associated, {} generated, {} entries untracked",
        root.display(),
        report.identities_adopted,
        report.identities_associated,
        report.identities_generated,
        report.entries_untracked
    );

    Ok(report)
}

struct IdentityAssigner<'a> {
    index: &'a mut Index,
    other_root: &'a dyn IdentitySource,
    options: &'a ScanOptions,
    scan_time: u64,
    /// Current paths as they were before this pass.
    prior_paths: CurrentPaths,
    /// Identity to every inode bound to it before this pass.
    bound_inodes: HashMap<String, Vec<u64>>,
    live_inodes: HashSet<u64>,
    /// Identities placed at some path during this pass.
    placed: HashSet<String>,
}

enum Resolution {
    Known(String),
    Adopted(String),
    Associated(String),
    Generated(String),
    Untracked,
}

impl<'a> IdentityAssigner<'a> {
    fn new(
        index: &'a mut Index,
        other_root: &'a dyn IdentitySource,
        options: &'a ScanOptions,
        scan_time: u64,
        entries: &[WalkedEntry],
    ) -> Self {
        let prior_paths = if options.associate_changed_inodes {
            index.current_paths()
        } else {
            CurrentPaths::default()
        };

        let mut bound_inodes: HashMap<String, Vec<u64>> = HashMap::new();
        for (inum, uuid) in index.files() {
            bound_inodes.entry(uuid.to_string()).or_default().push(inum);
        }

        IdentityAssigner {
            index,
            other_root,
            options,
            scan_time,
            prior_paths,
            bound_inodes,
            live_inodes: entries.iter().map(|entry| entry.inode).collect(),
            placed: HashSet::new(),
        }
    }

    /// Whether `uuid` can be given to a new inode without ending up on two
    /// live inodes of this root.
    fn is_unclaimed(&self, uuid: &str) -> bool {
        if self.placed.contains(uuid) {
            return false;
        }
        self.bound_inodes
            .get(uuid)
            .is_none_or(|inodes| inodes.iter().all(|inum| !self.live_inodes.contains(inum)))
    }

    fn resolve(&self, entry: &WalkedEntry, absolute: &Path) -> Result<Resolution, IdentityError> {
        if let Some(uuid) = self.index.identity_for_inode(entry.inode) {
            return Ok(Resolution::Known(uuid.to_string()));
        }

        if let Some(uuid) = self.other_root.identity_for_path(&entry.relative_path)
            && self.is_unclaimed(&uuid)
        {
            return Ok(Resolution::Adopted(uuid));
        }

        if self.options.associate_changed_inodes
            && let Some(uuid) = self.prior_paths.get(&entry.relative_path)
            && self.is_unclaimed(uuid)
        {
            return Ok(Resolution::Associated(uuid.to_string()));
        }

        if self.options.always_generate_uuid {
            let input = match entry.kind {
                EntryKind::File => IdentityInput::FileContent(absolute),
                _ => IdentityInput::PathOnly,
            };
            let uuid = generate_identity(self.scan_time, &entry.relative_path, input)?;
            return Ok(Resolution::Generated(uuid));
        }

        Ok(Resolution::Untracked)
    }

    fn assign(
        &mut self,
        entry: &WalkedEntry,
        absolute: &Path,
        report: &mut ScanReport,
    ) -> Result<(), IdentityError> {
        let uuid = match self.resolve(entry, absolute)? {
            Resolution::Known(uuid) => uuid,
            Resolution::Adopted(uuid) => {
                debug!("Adopted identity {} for {}", uuid, entry.relative_path);
                report.identities_adopted += 1;
                uuid
            }
            Resolution::Associated(uuid) => {
                debug!(
                    "Associated new inode {} at {} with identity {}",
                    entry.inode, entry.relative_path, uuid
                );
                report.identities_associated += 1;
                uuid
            }
            Resolution::Generated(uuid) => {
                report.identities_generated += 1;
                uuid
            }
            Resolution::Untracked => {
                report.entries_untracked += 1;
                return Ok(());
            }
        };

        if !self.placed.insert(uuid.clone()) {
            debug!(
                "Identity {} already placed this pass, leaving {} untracked",
                uuid, entry.relative_path
            );
            report.entries_untracked += 1;
            return Ok(());
        }

        self.index.assign_inode(entry.inode, &uuid);

        if self.index.current_path(&uuid) != Some(entry.relative_path.as_str()) {
            debug!("Recording {} at {}", uuid, entry.relative_path);
            self.index.append_path(&uuid, &entry.relative_path, self.scan_time);
            report.records_appended += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
