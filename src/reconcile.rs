//! Cross-root comparison of path histories.
//!
//! For every identity both roots have recorded, the two histories are aligned
//! on the last observation they share. Whatever one side recorded after that
//! point is a move the other side has not seen yet. If only one side moved,
//! the other is stale and gets the same rename replayed; if both moved, the
//! identity is in conflict and is left alone.

use crate::index_file::{Index, PathRecord, is_same_or_below};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Both sides already have the identity at the same path.
    Agreed,
    /// This side missed a move the other side made.
    Stale(Side),
    /// Both sides moved the identity since they last agreed.
    Conflict,
}

/// Outcome of aligning one identity's two histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub verdict: Verdict,
    /// Time of the last observation both sides share, if any.
    pub agreed_at: Option<u64>,
}

/// Rename to replay inside the stale root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameProposal {
    pub side: Side,
    pub uuid: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConflict {
    pub uuid: String,
    pub path_a: String,
    pub path_b: String,
    pub agreed_at: Option<u64>,
}

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// In execution order.
    pub renames: Vec<RenameProposal>,
    pub conflicts: Vec<HistoryConflict>,
    /// Proposals already carried out by the rename of an ancestor directory.
    pub implied: usize,
}

/// Decide what to do about one identity given both sides' histories, each
/// sorted by time.
pub fn judge(a: &[&PathRecord], b: &[&PathRecord]) -> Judgement {
    let (mut a_private, mut b_private, agreed_at) = match last_agreement(a, b) {
        Some((i, j)) => (&a[i + 1..], &b[j + 1..], Some(a[i].time)),
        None => (a, b, None),
    };

    while let (Some(x), Some(y)) = (a_private.first(), b_private.first()) {
        if x.path != y.path {
            break;
        }
        a_private = &a_private[1..];
        b_private = &b_private[1..];
    }

    let current_a = a.last().map(|r| r.path.as_str());
    let current_b = b.last().map(|r| r.path.as_str());

    let verdict = if current_a == current_b {
        Verdict::Agreed
    } else if a_private.is_empty() && !b_private.is_empty() {
        Verdict::Stale(Side::A)
    } else if b_private.is_empty() && !a_private.is_empty() {
        Verdict::Stale(Side::B)
    } else {
        Verdict::Conflict
    };

    Judgement { verdict, agreed_at }
}

/// Positions of the latest record pair with equal time and path, searching
/// backward from the end of both histories.
fn last_agreement(a: &[&PathRecord], b: &[&PathRecord]) -> Option<(usize, usize)> {
    (0..a.len()).rev().find_map(|i| {
        (0..b.len())
            .rev()
            .find(|&j| a[i].time == b[j].time && a[i].path == b[j].path)
            .map(|j| (i, j))
    })
}

/// Histories of every identity recorded in both indices, each sorted by time
/// with append order breaking ties.
pub fn shared_histories<'a>(
    index_a: &'a Index,
    index_b: &'a Index,
) -> BTreeMap<&'a str, (Vec<&'a PathRecord>, Vec<&'a PathRecord>)> {
    let mut histories: BTreeMap<&str, (Vec<&PathRecord>, Vec<&PathRecord>)> = BTreeMap::new();
    for record in index_a.paths() {
        histories.entry(record.uuid.as_str()).or_default().0.push(record);
    }
    for record in index_b.paths() {
        histories.entry(record.uuid.as_str()).or_default().1.push(record);
    }

    histories.retain(|_, (a, b)| !a.is_empty() && !b.is_empty());
    for (a, b) in histories.values_mut() {
        a.sort_by_key(|record| record.time);
        b.sort_by_key(|record| record.time);
    }

    histories
}

pub fn plan_reconciliation(index_a: &Index, index_b: &Index) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut proposals = Vec::new();

    for (uuid, (a, b)) in shared_histories(index_a, index_b) {
        let (Some(last_a), Some(last_b)) = (a.last(), b.last()) else {
            continue;
        };
        let judgement = judge(&a, &b);
        debug!("Identity {}: {:?}", uuid, judgement.verdict);

        match judgement.verdict {
            Verdict::Agreed => {}
            Verdict::Stale(Side::A) => proposals.push(RenameProposal {
                side: Side::A,
                uuid: uuid.to_string(),
                from: last_a.path.clone(),
                to: last_b.path.clone(),
            }),
            Verdict::Stale(Side::B) => proposals.push(RenameProposal {
                side: Side::B,
                uuid: uuid.to_string(),
                from: last_b.path.clone(),
                to: last_a.path.clone(),
            }),
            Verdict::Conflict => {
                debug!(
                    "Identity {} diverged: A recorded {:?}, B recorded {:?}",
                    uuid,
                    paths_of(&index_a.history(uuid)),
                    paths_of(&index_b.history(uuid))
                );
                plan.conflicts.push(HistoryConflict {
                    uuid: uuid.to_string(),
                    path_a: last_a.path.clone(),
                    path_b: last_b.path.clone(),
                    agreed_at: judgement.agreed_at,
                });
            }
        }
    }

    proposals.sort_by(|x, y| (x.side, &x.from).cmp(&(y.side, &y.from)));
    let (renames, implied) = collapse_nested(proposals);
    plan.renames = order_for_execution(renames);
    plan.implied = implied;

    plan
}

fn paths_of<'a>(records: &[&'a PathRecord]) -> Vec<&'a str> {
    records.iter().map(|record| record.path.as_str()).collect()
}

/// Rewrite proposals whose source sits below an earlier proposal's source so
/// they start from where that earlier rename put them, dropping the ones that
/// are then already in place. Expects proposals sorted by side and source.
fn collapse_nested(proposals: Vec<RenameProposal>) -> (Vec<RenameProposal>, usize) {
    let mut kept: Vec<RenameProposal> = Vec::with_capacity(proposals.len());
    // (side, source as recorded, destination)
    let mut moves: Vec<(Side, String, String)> = Vec::new();
    let mut implied = 0;

    for mut proposal in proposals {
        let original_from = proposal.from.clone();

        let ancestor = moves
            .iter()
            .filter(|(side, from, _)| {
                *side == proposal.side
                    && from != &original_from
                    && is_same_or_below(&original_from, from)
            })
            .max_by_key(|(_, from, _)| from.len());

        if let Some((_, from, to)) = ancestor {
            let relocated = format!("{}{}", to, &original_from[from.len()..]);
            if relocated == proposal.to {
                debug!(
                    "Rename of {} to {} in {} follows from its parent",
                    original_from, proposal.to, proposal.side
                );
                implied += 1;
                moves.push((proposal.side, original_from, proposal.to));
                continue;
            }
            proposal.from = relocated;
        }

        moves.push((proposal.side, original_from, proposal.to.clone()));
        kept.push(proposal);
    }

    (kept, implied)
}

/// Whether `later` can only run once `earlier` has: `earlier` puts `later`'s
/// source in place, creates the directory `later` moves into, or vacates
/// `later`'s target.
fn must_follow(later: &RenameProposal, earlier: &RenameProposal) -> bool {
    later.side == earlier.side
        && (is_below(&later.from, &earlier.to)
            || is_below(&later.to, &earlier.to)
            || is_same_or_below(&later.to, &earlier.from))
}

fn is_below(path: &str, ancestor: &str) -> bool {
    path != ancestor && is_same_or_below(path, ancestor)
}

/// Reorder proposals so that each runs after every proposal it must follow,
/// otherwise keeping the given order. A cycle, such as two entries trading
/// places, is broken at its earliest member, whose rename will then fail on
/// the occupied target.
fn order_for_execution(renames: Vec<RenameProposal>) -> Vec<RenameProposal> {
    let n = renames.len();
    let mut waiting_on = vec![0usize; n];
    let mut unblocks: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, later) in renames.iter().enumerate() {
        for (j, earlier) in renames.iter().enumerate() {
            if i != j && must_follow(later, earlier) {
                waiting_on[i] += 1;
                unblocks[j].push(i);
            }
        }
    }

    let mut done = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let ready = (0..n).find(|&i| !done[i] && waiting_on[i] == 0);
        let Some(next) = ready.or_else(|| (0..n).find(|&i| !done[i])) else {
            break;
        };
        if ready.is_none() {
            debug!(
                "Renames in {} depend on each other, starting with {} -> {}",
                renames[next].side, renames[next].from, renames[next].to
            );
        }
        done[next] = true;
        order.push(next);
        for &k in &unblocks[next] {
            waiting_on[k] = waiting_on[k].saturating_sub(1);
        }
    }

    let mut slots: Vec<Option<RenameProposal>> = renames.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    #[error("Cannot rename {from} to {to} in {}: target already exists", .root.display())]
    TargetExists {
        root: PathBuf,
        from: String,
        to: String,
    },
    #[error("Cannot create parent directory of {to} in {}: {source}", .root.display())]
    CreateParent {
        root: PathBuf,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot rename {from} to {to} in {}: {source}", .root.display())]
    Rename {
        root: PathBuf,
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
pub struct RenameOutcome {
    /// Renames carried out, or that would have been in a dry run.
    pub applied: Vec<RenameProposal>,
    pub errors: Vec<RenameError>,
}

/// Carry out `renames` inside their stale roots.
///
/// Missing parent directories of the target are created. An existing target
/// is never replaced. A failure is recorded and the remaining renames are still
/// attempted. With `dry_run` nothing on disk changes and every proposal counts
/// as applied.
pub fn execute_renames(
    renames: &[RenameProposal],
    root_a: &Path,
    root_b: &Path,
    dry_run: bool,
) -> RenameOutcome {
    let mut outcome = RenameOutcome::default();

    for proposal in renames {
        let root = match proposal.side {
            Side::A => root_a,
            Side::B => root_b,
        };

        if dry_run {
            outcome.applied.push(proposal.clone());
            continue;
        }

        match rename_within(root, &proposal.from, &proposal.to) {
            Ok(()) => {
                info!(
                    "Renamed {} to {} in {}",
                    proposal.from,
                    proposal.to,
                    root.display()
                );
                outcome.applied.push(proposal.clone());
            }
            Err(e) => outcome.errors.push(e),
        }
    }

    outcome
}

fn rename_within(root: &Path, from: &str, to: &str) -> Result<(), RenameError> {
    let source = root.join(from);
    let target = root.join(to);

    if std::fs::symlink_metadata(&target).is_ok() {
        return Err(RenameError::TargetExists {
            root: root.to_path_buf(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RenameError::CreateParent {
            root: root.to_path_buf(),
            to: to.to_string(),
            source,
        })?;
    }

    std::fs::rename(&source, &target).map_err(|source| RenameError::Rename {
        root: root.to_path_buf(),
        from: from.to_string(),
        to: to.to_string(),
        source,
    })
}
