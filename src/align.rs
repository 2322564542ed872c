//! One full run over a pair of roots: scan both, persist both indices,
//! reconcile their histories, replay missed renames and look for paths the
//! two roots disagree about.

use crate::conflicts::{PathConflict, detect_path_conflicts};
use crate::dir_list::DirListError;
use crate::identity_source::{CompositeSource, IdentitySource, NullSource};
use crate::index_file::CurrentPaths;
use crate::reconcile::{
    HistoryConflict, RenameError, RenameProposal, Side, execute_renames, plan_reconciliation,
};
use crate::replica::{Replica, ReplicaError};
use crate::scan::{ScanOptions, ScanReport, scan_tree};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct AlignOptions {
    pub scan: ScanOptions,
    /// Let each root's scan take identities the other root already tracks at
    /// the same path.
    pub bootstrap: bool,
    pub dry_run: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        AlignOptions {
            scan: ScanOptions::default(),
            bootstrap: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    #[error(transparent)]
    Replica(#[from] ReplicaError),
    #[error("Both roots are the same directory: {}", .0.display())]
    SameRoot(PathBuf),
    #[error("Cannot scan {}: {source}", .root.display())]
    Scan {
        root: PathBuf,
        #[source]
        source: DirListError,
    },
    #[error("{}", describe_save_failures(.0))]
    Save(Vec<ReplicaError>),
}

fn describe_save_failures(failures: &[ReplicaError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug)]
pub struct AlignResult {
    pub root_a: PathBuf,
    pub root_b: PathBuf,
    pub scan_a: ScanReport,
    pub scan_b: ScanReport,
    /// Renames carried out, or planned in a dry run.
    pub renames: Vec<RenameProposal>,
    pub rename_errors: Vec<RenameError>,
    pub history_conflicts: Vec<HistoryConflict>,
    pub path_conflicts: Vec<PathConflict>,
    pub dry_run: bool,
}

impl AlignResult {
    pub fn root(&self, side: Side) -> &Path {
        match side {
            Side::A => &self.root_a,
            Side::B => &self.root_b,
        }
    }

    pub fn conflict_count(&self) -> usize {
        self.history_conflicts.len() + self.path_conflicts.len()
    }

    /// Entry errors from both scans plus failed renames.
    pub fn error_count(&self) -> usize {
        self.scan_a.errors.len() + self.scan_b.errors.len() + self.rename_errors.len()
    }
}

/// Align `root_a` and `root_b`, stamping any new path records with
/// `scan_time`.
///
/// Root A is scanned first, consulting what B's index knew after the previous
/// run. B is then scanned consulting A's freshly updated state. Both indices
/// are saved before anything is renamed; if either save fails the run stops
/// there.
pub fn align_roots(
    root_a: &Path,
    root_b: &Path,
    options: &AlignOptions,
    scan_time: u64,
) -> Result<AlignResult, AlignError> {
    let mut replica_a = Replica::open(root_a)?;
    let mut replica_b = Replica::open(root_b)?;

    if replica_a.same_directory(&replica_b) {
        return Err(AlignError::SameRoot(root_a.to_path_buf()));
    }

    let scan_a = scan_replica(&mut replica_a, &replica_b, options, scan_time)?;
    let scan_b = scan_replica(&mut replica_b, &replica_a, options, scan_time)?;

    let save_failures: Vec<ReplicaError> = [replica_a.save_if_dirty(), replica_b.save_if_dirty()]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if !save_failures.is_empty() {
        for failure in &save_failures {
            error!("{}", failure);
        }
        return Err(AlignError::Save(save_failures));
    }

    let plan = plan_reconciliation(&replica_a.index, &replica_b.index);
    let outcome = execute_renames(&plan.renames, root_a, root_b, options.dry_run);
    let mut rename_errors = outcome.errors;
    let mut renames = Vec::with_capacity(outcome.applied.len());

    let mut current_a = replica_a.index.current_paths();
    let mut current_b = replica_b.index.current_paths();
    for rename in outcome.applied {
        let (stale, root): (&mut CurrentPaths, &Path) = match rename.side {
            Side::A => (&mut current_a, root_a),
            Side::B => (&mut current_b, root_b),
        };
        // Nothing touched the disk in a dry run, so an occupied target is
        // only visible in the stale side's map.
        if options.dry_run && stale.get(&rename.to).is_some() {
            rename_errors.push(RenameError::TargetExists {
                root: root.to_path_buf(),
                from: rename.from,
                to: rename.to,
            });
            continue;
        }
        stale.apply_rename(&rename.from, &rename.to);
        renames.push(rename);
    }
    for e in &rename_errors {
        error!("{}", e);
    }
    let path_conflicts = detect_path_conflicts(&current_a, &current_b);

    info!(
        "{} renames{}, {} implied by a parent, {} failed, {} history conflicts, {} path conflicts",
        renames.len(),
        if options.dry_run { " planned" } else { "" },
        plan.implied,
        rename_errors.len(),
        plan.conflicts.len(),
        path_conflicts.len()
    );

    Ok(AlignResult {
        root_a: root_a.to_path_buf(),
        root_b: root_b.to_path_buf(),
        scan_a,
        scan_b,
        renames,
        rename_errors,
        history_conflicts: plan.conflicts,
        path_conflicts,
        dry_run: options.dry_run,
    })
}

fn scan_replica(
    replica: &mut Replica,
    other: &Replica,
    options: &AlignOptions,
    scan_time: u64,
) -> Result<ScanReport, AlignError> {
    let other_paths = other.index.current_paths();
    let bootstrap = CompositeSource::new(vec![&other_paths as &dyn IdentitySource]);
    let source: &dyn IdentitySource = if options.bootstrap {
        &bootstrap
    } else {
        &NullSource
    };

    let root = replica.root().to_path_buf();
    scan_tree(&mut replica.index, &root, source, &options.scan, scan_time).map_err(|source| {
        AlignError::Scan { root, source }
    })
}
